//! Engine configuration

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Most messages a single peek or lease may return
pub const MAX_BATCH_SIZE: usize = 32;

const SEVEN_DAYS_SECS: u64 = 7 * 24 * 60 * 60;

/// Limits and timings for a queue engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_seven_days")]
    pub default_message_ttl_secs: u64,

    #[serde(default = "default_seven_days")]
    pub max_message_ttl_secs: u64,

    #[serde(default = "default_visibility_timeout_secs")]
    pub default_visibility_timeout_secs: u64,

    #[serde(default = "default_seven_days")]
    pub max_visibility_timeout_secs: u64,

    /// Maximum content length in bytes
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            default_message_ttl_secs: default_seven_days(),
            max_message_ttl_secs: default_seven_days(),
            default_visibility_timeout_secs: default_visibility_timeout_secs(),
            max_visibility_timeout_secs: default_seven_days(),
            max_message_size: default_max_message_size(),
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    30
}

fn default_seven_days() -> u64 {
    SEVEN_DAYS_SECS
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

fn default_max_message_size() -> usize {
    64 * 1024
}

// Upper bound for any configured duration
const MAX_SETTING_SECS: i64 = 100 * 365 * 24 * 60 * 60;

fn secs(value: u64) -> Duration {
    Duration::seconds(i64::try_from(value).map_or(MAX_SETTING_SECS, |s| s.min(MAX_SETTING_SECS)))
}

impl EngineConfig {
    /// Sweep period, never shorter than one second
    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    pub fn default_message_ttl(&self) -> Duration {
        secs(self.default_message_ttl_secs)
    }

    pub fn max_message_ttl(&self) -> Duration {
        secs(self.max_message_ttl_secs)
    }

    pub fn default_visibility_timeout(&self) -> Duration {
        secs(self.default_visibility_timeout_secs)
    }

    pub fn max_visibility_timeout(&self) -> Duration {
        secs(self.max_visibility_timeout_secs)
    }
}

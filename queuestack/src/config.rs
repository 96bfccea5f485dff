//! Configuration management

use queuestack_queue::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub walkthrough: WalkthroughConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WalkthroughConfig {
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
}

impl Default for WalkthroughConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
        }
    }
}

fn default_queue_name() -> String {
    "my-sample-queue".to_string()
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Without an explicit path an optional `queuestack.toml` in the working
    /// directory is read. Environment variables such as
    /// `QUEUESTACK__ENGINE__SWEEP_INTERVAL_SECS` override file values.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name("queuestack").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("QUEUESTACK")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }

    pub fn to_toml(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_render_as_toml() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[engine]"));
        assert!(rendered.contains("sweep_interval_secs = 30"));
        assert!(rendered.contains(r#"queue_name = "my-sample-queue""#));
    }

    #[test]
    fn test_partial_toml() {
        let config: Config = toml::from_str(
            r#"
            [engine]
            default_visibility_timeout_secs = 45
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.default_visibility_timeout_secs, 45);
        assert_eq!(config.engine.sweep_interval_secs, 30);
        assert_eq!(config.walkthrough.queue_name, "my-sample-queue");
    }
}

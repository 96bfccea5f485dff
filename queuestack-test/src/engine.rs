//! Test engine management

use chrono::{DateTime, Duration, TimeZone, Utc};
use queuestack_queue::{EngineConfig, ManualClock, QueueEngine, QueueHandle};
use std::sync::{Arc, Once};
use tracing::debug;

static TRACING: Once = Once::new();

/// Install a test-friendly tracing subscriber once per process.
///
/// Honours `RUST_LOG`; silent otherwise.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("off"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A queue engine running on a manual clock
pub struct TestEngine {
    engine: Arc<QueueEngine>,
    clock: ManualClock,
}

impl TestEngine {
    /// Fixed starting instant so timestamps in failures are reproducible
    pub fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        init_tracing();

        let clock = ManualClock::new(Self::epoch());
        let engine = Arc::new(QueueEngine::new(config, Arc::new(clock.clone())));
        Self { engine, clock }
    }

    pub fn engine(&self) -> &Arc<QueueEngine> {
        &self.engine
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Create the queue if needed and return a handle to it
    pub fn queue(&self, name: &str) -> QueueHandle {
        self.engine
            .create_queue_if_not_exists(name)
            .and_then(|_| self.engine.get_queue(name))
            .unwrap_or_else(|e| panic!("failed to open queue {name}: {e}"))
    }

    pub fn advance(&self, delta: Duration) {
        debug!(?delta, "Advancing test clock");
        self.clock.advance(delta);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(Duration::seconds(secs));
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuestack_queue::Clock;

    #[test]
    fn test_clock_starts_at_epoch() {
        let harness = TestEngine::new();
        assert_eq!(harness.clock().now(), TestEngine::epoch());

        harness.advance_secs(10);
        assert_eq!(harness.clock().now(), TestEngine::epoch() + Duration::seconds(10));
    }

    #[test]
    fn test_queue_is_idempotent() {
        let harness = TestEngine::new();
        let a = harness.queue("orders");
        let b = harness.queue("orders");
        assert_eq!(a.name(), b.name());
        assert_eq!(harness.engine().list_queues(None).count(), 1);
    }
}

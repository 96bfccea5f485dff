//! Queue engine: registry plus lifecycle

use parking_lot::Mutex;
use queuestack_core::{Clock, SystemClock};
use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::QueueError;
use crate::queue::QueueHandle;
use crate::registry::{
    CreateOutcome, DeleteOutcome, QueueListing, QueueRegistry, QueueSegment, SweepReport,
};
use crate::sweep::{spawn_sweeper, SweeperHandle};

/// Process-scoped owner of all queues.
///
/// Create one at startup, share it behind an `Arc`, and call
/// [`QueueEngine::shutdown`] before exit.
#[derive(Debug)]
pub struct QueueEngine {
    registry: Arc<QueueRegistry>,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl QueueEngine {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            registry: Arc::new(QueueRegistry::new(config, clock)),
            sweeper: Mutex::new(None),
        }
    }

    /// Engine on the wall clock
    pub fn with_system_clock(config: EngineConfig) -> Self {
        Self::new(config, Arc::new(SystemClock))
    }

    pub fn registry(&self) -> &Arc<QueueRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        self.registry.config()
    }

    /// Start the periodic expiry sweep if it is not already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_sweeper(&self) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            let interval = self.config().sweep_interval();
            info!(interval_secs = interval.as_secs(), "Starting expiry sweeper");
            *sweeper = Some(spawn_sweeper(self.registry.clone(), interval));
        }
    }

    pub fn sweeper_running(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Run one sweep pass now
    pub fn sweep(&self) -> SweepReport {
        self.registry.sweep_expired(self.registry.clock().now())
    }

    /// Stop the sweeper and drop every queue
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }

        let queues = self.registry.len();
        self.registry.clear_all();
        info!(queues, "Queue engine shut down");
    }

    // Delegate methods to the registry
    pub fn create_queue_if_not_exists(&self, name: &str) -> Result<CreateOutcome, QueueError> {
        self.registry.create_if_not_exists(name)
    }

    pub fn create_queue(&self, name: &str) -> Result<QueueHandle, QueueError> {
        self.registry.create(name)
    }

    pub fn get_queue(&self, name: &str) -> Result<QueueHandle, QueueError> {
        self.registry.get(name)
    }

    pub fn delete_queue_if_exists(&self, name: &str) -> DeleteOutcome {
        self.registry.delete_if_exists(name)
    }

    pub fn list_queues(&self, prefix: Option<&str>) -> QueueListing {
        self.registry.list_with_prefix(prefix.unwrap_or(""))
    }

    pub fn list_queues_segmented(
        &self,
        prefix: Option<&str>,
        max_results: usize,
        marker: Option<&str>,
    ) -> Result<QueueSegment, QueueError> {
        self.registry.list_segment(prefix, max_results, marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::EnqueueOptions;
    use chrono::Duration;
    use queuestack_core::ManualClock;

    #[tokio::test]
    async fn test_lifecycle() {
        let engine = QueueEngine::new(EngineConfig::default(), Arc::new(ManualClock::default()));
        assert!(engine
            .create_queue_if_not_exists("my-sample-queue")
            .unwrap()
            .is_created());

        engine.start_sweeper();
        engine.start_sweeper();
        assert!(engine.sweeper_running());

        engine.shutdown().await;
        assert!(!engine.sweeper_running());
        assert_eq!(engine.list_queues(None).count(), 0);
    }

    #[test]
    fn test_manual_sweep() {
        let clock = ManualClock::default();
        let engine = QueueEngine::new(EngineConfig::default(), Arc::new(clock.clone()));
        let queue = engine.create_queue("orders").unwrap();
        queue
            .enqueue("x", EnqueueOptions::default().with_ttl(Duration::seconds(1)))
            .unwrap();

        assert_eq!(engine.sweep().messages_removed, 0);
        clock.advance(Duration::seconds(1));
        assert_eq!(engine.sweep().messages_removed, 1);
    }
}

//! Background expiry sweep

use queuestack_core::Clock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::registry::QueueRegistry;

/// Running sweeper task
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    passes: Arc<AtomicU64>,
    removed: Arc<AtomicU64>,
}

impl SweeperHandle {
    /// Completed sweep passes so far
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    /// Messages reclaimed over the sweeper's lifetime
    pub fn messages_removed(&self) -> u64 {
        self.removed.load(Ordering::Relaxed)
    }

    /// Signal the task to stop and wait for it
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Sweeper task ended abnormally");
        }
    }
}

/// Spawn a task that sweeps `registry` every `interval`.
///
/// The first pass runs one full interval after spawning. Must be called from
/// within a tokio runtime.
pub fn spawn_sweeper(registry: Arc<QueueRegistry>, interval: Duration) -> SweeperHandle {
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let passes = Arc::new(AtomicU64::new(0));
    let removed = Arc::new(AtomicU64::new(0));

    let task = {
        let passes = passes.clone();
        let removed = removed.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = registry.sweep_expired(registry.clock().now());
                        passes.fetch_add(1, Ordering::Relaxed);
                        removed.fetch_add(report.messages_removed as u64, Ordering::Relaxed);

                        if report.messages_removed > 0 {
                            info!(
                                queues = report.queues_scanned,
                                removed = report.messages_removed,
                                "Reclaimed expired messages"
                            );
                        } else {
                            debug!(queues = report.queues_scanned, "Sweep found nothing to reclaim");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("Sweeper stopping");
                            break;
                        }
                    }
                }
            }
        })
    };

    SweeperHandle {
        shutdown,
        task,
        passes,
        removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::message::EnqueueOptions;
    use queuestack_core::ManualClock;

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_reclaims_expired_messages() {
        let clock = ManualClock::default();
        let registry = Arc::new(QueueRegistry::new(
            EngineConfig::default(),
            Arc::new(clock.clone()),
        ));
        let queue = registry.create("orders").unwrap();
        queue
            .enqueue("short", EnqueueOptions::default().with_ttl(chrono::Duration::seconds(10)))
            .unwrap();
        queue.enqueue("long", EnqueueOptions::default()).unwrap();

        let sweeper = spawn_sweeper(registry.clone(), Duration::from_secs(30));

        clock.advance(chrono::Duration::seconds(11));
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert_eq!(sweeper.passes(), 1);
        assert_eq!(sweeper.messages_removed(), 1);
        assert_eq!(registry.sweep_expired(clock.now()).messages_removed, 0);

        sweeper.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_stops_on_signal() {
        let registry = Arc::new(QueueRegistry::new(
            EngineConfig::default(),
            Arc::new(ManualClock::default()),
        ));
        let sweeper = spawn_sweeper(registry, Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(sweeper.passes(), 3);

        sweeper.stop().await;
    }
}

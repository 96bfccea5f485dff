//! Concurrent producer/consumer soak run
//!
//! Exercises lease atomicity and redelivery: consumers skip acknowledging a
//! share of first deliveries, so those messages must come back once their
//! visibility timeout lapses.

use anyhow::{bail, Context};
use clap::Args;
use dashmap::DashMap;
use queuestack_queue::{EnqueueOptions, QueueEngine, QueueError, QueueHandle};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, info};

const SOAK_QUEUE: &str = "soak";
const LEASE_BATCH: usize = 8;

#[derive(Args, Debug, Clone)]
pub struct SoakArgs {
    /// Number of producer tasks
    #[arg(long, default_value = "2")]
    pub producers: usize,

    /// Number of consumer tasks
    #[arg(long, default_value = "4")]
    pub consumers: usize,

    /// Total messages to enqueue
    #[arg(long, default_value = "1000")]
    pub messages: usize,

    /// Lease visibility timeout in milliseconds
    #[arg(long, default_value = "200")]
    pub visibility_ms: u64,

    /// Skip acknowledging one in every N first deliveries (0 disables)
    #[arg(long, default_value = "10")]
    pub drop_every: u64,

    /// Give up after this many seconds
    #[arg(long, default_value = "60")]
    pub timeout_secs: u64,
}

#[derive(Debug, Default)]
pub struct SoakReport {
    pub produced: usize,
    pub delivered: usize,
    pub duplicates: u64,
    pub rejected_acks: u64,
    pub elapsed: Duration,
}

struct Shared {
    queue: QueueHandle,
    deliveries: DashMap<String, u32>,
    producers_done: AtomicBool,
    rejected_acks: AtomicU64,
}

pub async fn run(engine: Arc<QueueEngine>, args: SoakArgs) -> anyhow::Result<SoakReport> {
    if args.producers == 0 || args.consumers == 0 {
        bail!("need at least one producer and one consumer");
    }

    engine.create_queue_if_not_exists(SOAK_QUEUE)?;
    let shared = Arc::new(Shared {
        queue: engine.get_queue(SOAK_QUEUE)?,
        deliveries: DashMap::new(),
        producers_done: AtomicBool::new(false),
        rejected_acks: AtomicU64::new(0),
    });

    let started = Instant::now();
    let workers = Workers::spawn(&shared, &args)?;
    let abort_handles = workers.abort_handles();
    let outcome = tokio::time::timeout(
        Duration::from_secs(args.timeout_secs),
        workers.join(&shared, args.messages),
    )
    .await;
    let Ok(result) = outcome else {
        for handle in &abort_handles {
            handle.abort();
        }
        engine.delete_queue_if_exists(SOAK_QUEUE);
        bail!("soak run timed out after {}s", args.timeout_secs);
    };
    result?;

    let delivered = shared.deliveries.len();
    let total: u64 = shared.deliveries.iter().map(|d| u64::from(*d.value())).sum();
    let report = SoakReport {
        produced: args.messages,
        delivered,
        duplicates: total - delivered as u64,
        rejected_acks: shared.rejected_acks.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    };

    engine.delete_queue_if_exists(SOAK_QUEUE);
    if report.delivered != report.produced {
        bail!(
            "{} of {} messages were never delivered",
            report.produced - report.delivered,
            report.produced
        );
    }
    Ok(report)
}

struct Workers {
    producers: Vec<JoinHandle<anyhow::Result<()>>>,
    consumers: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl Workers {
    fn spawn(shared: &Arc<Shared>, args: &SoakArgs) -> anyhow::Result<Self> {
        let visibility = chrono::Duration::milliseconds(
            i64::try_from(args.visibility_ms).context("visibility timeout too large")?,
        );

        let per_producer = args.messages.div_ceil(args.producers);
        let producers = (0..args.producers)
            .map(|p| {
                let shared = shared.clone();
                let start = p * per_producer;
                let end = ((p + 1) * per_producer).min(args.messages);
                tokio::spawn(async move { produce(&shared, start..end).await })
            })
            .collect();

        let consumers = (0..args.consumers)
            .map(|c| {
                let shared = shared.clone();
                let drop_every = args.drop_every;
                tokio::spawn(async move { consume(&shared, c, visibility, drop_every).await })
            })
            .collect();

        Ok(Self {
            producers,
            consumers,
        })
    }

    fn abort_handles(&self) -> Vec<AbortHandle> {
        self.producers
            .iter()
            .chain(&self.consumers)
            .map(JoinHandle::abort_handle)
            .collect()
    }

    async fn join(self, shared: &Shared, messages: usize) -> anyhow::Result<()> {
        for result in futures::future::try_join_all(self.producers).await? {
            result?;
        }
        shared.producers_done.store(true, Ordering::Release);
        info!(messages, "Producers finished");

        for result in futures::future::try_join_all(self.consumers).await? {
            result?;
        }
        Ok(())
    }
}

async fn produce(shared: &Shared, range: std::ops::Range<usize>) -> anyhow::Result<()> {
    for i in range {
        shared
            .queue
            .enqueue(format!("soak-{i}"), EnqueueOptions::default())?;
        if i % 64 == 0 {
            tokio::task::yield_now().await;
        }
    }
    Ok(())
}

async fn consume(
    shared: &Shared,
    consumer: usize,
    visibility: chrono::Duration,
    drop_every: u64,
) -> anyhow::Result<()> {
    let mut first_deliveries = 0u64;

    loop {
        let batch = shared.queue.lease(LEASE_BATCH, visibility)?;
        if batch.is_empty() {
            if shared.producers_done.load(Ordering::Acquire)
                && shared.queue.refresh_approximate_count()? == 0
            {
                debug!(consumer, "Queue drained");
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            continue;
        }

        for message in batch {
            *shared.deliveries.entry(message.content.clone()).or_insert(0) += 1;

            if message.dequeue_count == 1 {
                first_deliveries += 1;
                if drop_every > 0 && first_deliveries % drop_every == 0 {
                    // left for redelivery
                    continue;
                }
            }

            let Some(receipt) = message.pop_receipt.as_ref() else {
                continue;
            };
            match shared.queue.delete(message.id, receipt) {
                Ok(()) => {}
                Err(QueueError::LeaseMismatch(_) | QueueError::MessageNotFound(_)) => {
                    shared.rejected_acks.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => return Err(e.into()),
            }
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queuestack_queue::EngineConfig;

    fn args(messages: usize) -> SoakArgs {
        SoakArgs {
            producers: 2,
            consumers: 3,
            messages,
            visibility_ms: 50,
            drop_every: 5,
            timeout_secs: 30,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_soak_delivers_everything() {
        let engine = Arc::new(QueueEngine::with_system_clock(EngineConfig::default()));

        let report = run(engine.clone(), args(200)).await.unwrap();
        assert_eq!(report.produced, 200);
        assert_eq!(report.delivered, 200);
        // every fifth first delivery went unacknowledged and came back
        assert!(report.duplicates >= 1);
        assert!(engine.get_queue(SOAK_QUEUE).is_err());
    }

    #[tokio::test]
    async fn test_soak_timeout_aborts_workers() {
        let engine = Arc::new(QueueEngine::with_system_clock(EngineConfig::default()));
        let mut slow = args(1_000_000);
        slow.timeout_secs = 0;

        let err = run(engine.clone(), slow).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(engine.get_queue(SOAK_QUEUE).is_err());
    }

    #[tokio::test]
    async fn test_aborted_workers_are_cancelled() {
        let engine = QueueEngine::with_system_clock(EngineConfig::default());
        engine.create_queue_if_not_exists(SOAK_QUEUE).unwrap();
        let shared = Arc::new(Shared {
            queue: engine.get_queue(SOAK_QUEUE).unwrap(),
            deliveries: DashMap::new(),
            producers_done: AtomicBool::new(false),
            rejected_acks: AtomicU64::new(0),
        });

        let workers = Workers::spawn(&shared, &args(1_000_000)).unwrap();
        for handle in workers.abort_handles() {
            handle.abort();
        }
        for handle in workers.producers.into_iter().chain(workers.consumers) {
            assert!(handle.await.unwrap_err().is_cancelled());
        }
        assert!(!shared.producers_done.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_soak_requires_workers() {
        let engine = Arc::new(QueueEngine::with_system_clock(EngineConfig::default()));
        let mut bad = args(10);
        bad.consumers = 0;

        assert!(run(engine, bad).await.is_err());
    }
}

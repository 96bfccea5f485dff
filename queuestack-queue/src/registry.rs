//! Queue registry

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use queuestack_core::Clock;
use std::sync::Arc;
use tracing::info;

use crate::config::EngineConfig;
use crate::error::QueueError;
use crate::queue::{Queue, QueueHandle};

/// Most queues a single listing segment may return
pub const MAX_LIST_RESULTS: usize = 5000;

/// Result of [`QueueRegistry::create_if_not_exists`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

impl CreateOutcome {
    pub fn is_created(self) -> bool {
        self == Self::Created
    }
}

/// Result of [`QueueRegistry::delete_if_exists`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Totals from one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub queues_scanned: usize,
    pub messages_removed: usize,
}

/// Name-ordered snapshot of the registry taken when listing started
#[derive(Debug)]
pub struct QueueListing {
    inner: std::vec::IntoIter<QueueHandle>,
}

impl Iterator for QueueListing {
    type Item = QueueHandle;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for QueueListing {}

/// One page of a listing
#[derive(Debug)]
pub struct QueueSegment {
    pub queues: Vec<QueueHandle>,
    /// Pass back as `marker` to fetch the next page
    pub next_marker: Option<String>,
}

/// Owns every queue of one engine
#[derive(Debug)]
pub struct QueueRegistry {
    queues: DashMap<String, Arc<Queue>>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl QueueRegistry {
    pub fn new(config: EngineConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            queues: DashMap::new(),
            clock,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn create_if_not_exists(&self, name: &str) -> Result<CreateOutcome, QueueError> {
        check_name(name)?;

        match self.queues.entry(name.to_string()) {
            Entry::Occupied(_) => Ok(CreateOutcome::AlreadyExists),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Queue::new(name.to_string(), self.clock.now())));
                info!(queue = %name, "Created queue");
                Ok(CreateOutcome::Created)
            }
        }
    }

    /// Create a queue, failing if the name is taken
    pub fn create(&self, name: &str) -> Result<QueueHandle, QueueError> {
        check_name(name)?;

        match self.queues.entry(name.to_string()) {
            Entry::Occupied(_) => Err(QueueError::QueueAlreadyExists(name.to_string())),
            Entry::Vacant(entry) => {
                let queue = Arc::new(Queue::new(name.to_string(), self.clock.now()));
                entry.insert(queue.clone());
                info!(queue = %name, "Created queue");
                Ok(self.handle(queue))
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<QueueHandle, QueueError> {
        self.queues
            .get(name)
            .map(|q| self.handle(q.value().clone()))
            .ok_or_else(|| QueueError::QueueNotFound(name.to_string()))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    /// Remove a queue and every message in it
    pub fn delete_if_exists(&self, name: &str) -> DeleteOutcome {
        match self.queues.remove(name) {
            Some((_, queue)) => {
                let discarded = queue.mark_deleted();
                info!(queue = %name, discarded, "Deleted queue");
                DeleteOutcome::Deleted
            }
            None => DeleteOutcome::NotFound,
        }
    }

    pub fn list(&self) -> QueueListing {
        self.list_with_prefix("")
    }

    pub fn list_with_prefix(&self, prefix: &str) -> QueueListing {
        QueueListing {
            inner: self.snapshot(prefix).into_iter(),
        }
    }

    /// Page through queues whose names start with `prefix`, in name order,
    /// beginning after `marker`
    pub fn list_segment(
        &self,
        prefix: Option<&str>,
        max_results: usize,
        marker: Option<&str>,
    ) -> Result<QueueSegment, QueueError> {
        QueueError::check_range(
            "max_results",
            i64::try_from(max_results).unwrap_or(i64::MAX),
            1,
            MAX_LIST_RESULTS as i64,
        )?;

        let mut remaining = self
            .snapshot(prefix.unwrap_or(""))
            .into_iter()
            .filter(|q| marker.map_or(true, |m| q.name() > m))
            .peekable();

        let queues: Vec<QueueHandle> = remaining.by_ref().take(max_results).collect();
        let next_marker = match (remaining.peek(), queues.last()) {
            (Some(_), Some(last)) => Some(last.name().to_string()),
            _ => None,
        };

        Ok(QueueSegment {
            queues,
            next_marker,
        })
    }

    /// Physically remove expired messages from every queue
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> SweepReport {
        let queues: Vec<Arc<Queue>> = self.queues.iter().map(|q| q.value().clone()).collect();

        let mut report = SweepReport::default();
        for queue in queues {
            report.queues_scanned += 1;
            report.messages_removed += queue.remove_expired(now);
        }
        report
    }

    /// Drop every queue
    pub fn clear_all(&self) {
        let names: Vec<String> = self.queues.iter().map(|q| q.key().clone()).collect();
        for name in names {
            self.delete_if_exists(&name);
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    fn snapshot(&self, prefix: &str) -> Vec<QueueHandle> {
        let mut queues: Vec<QueueHandle> = self
            .queues
            .iter()
            .filter(|q| q.key().starts_with(prefix))
            .map(|q| self.handle(q.value().clone()))
            .collect();
        queues.sort_by(|a, b| a.name().cmp(b.name()));
        queues
    }

    fn handle(&self, queue: Arc<Queue>) -> QueueHandle {
        QueueHandle::new(queue, self.clock.clone(), self.config.clone())
    }
}

fn check_name(name: &str) -> Result<(), QueueError> {
    if name.is_empty() {
        return Err(QueueError::InvalidArgument(
            "queue name must not be empty".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::EnqueueOptions;
    use chrono::Duration;
    use queuestack_core::ManualClock;

    fn registry() -> (QueueRegistry, ManualClock) {
        let clock = ManualClock::default();
        (
            QueueRegistry::new(EngineConfig::default(), Arc::new(clock.clone())),
            clock,
        )
    }

    #[test]
    fn test_create_if_not_exists_is_idempotent() {
        let (registry, _) = registry();

        assert_eq!(
            registry.create_if_not_exists("orders").unwrap(),
            CreateOutcome::Created
        );
        assert_eq!(
            registry.create_if_not_exists("orders").unwrap(),
            CreateOutcome::AlreadyExists
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let (registry, _) = registry();
        registry.create("orders").unwrap();

        let result = registry.create("orders");
        assert!(matches!(result, Err(QueueError::QueueAlreadyExists(_))));
    }

    #[test]
    fn test_empty_name_is_invalid() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.create_if_not_exists(""),
            Err(QueueError::InvalidArgument(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let (registry, _) = registry();
        registry.create("Orders").unwrap();
        registry.create("orders").unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_get_missing_queue() {
        let (registry, _) = registry();
        assert!(matches!(registry.get("nope"), Err(QueueError::QueueNotFound(_))));
    }

    #[test]
    fn test_delete_if_exists() {
        let (registry, _) = registry();
        registry.create("orders").unwrap();

        assert_eq!(registry.delete_if_exists("orders"), DeleteOutcome::Deleted);
        assert_eq!(registry.delete_if_exists("orders"), DeleteOutcome::NotFound);
        assert!(!registry.exists("orders"));
    }

    #[test]
    fn test_delete_invalidates_outstanding_handles() {
        let (registry, _) = registry();
        let queue = registry.create("orders").unwrap();
        queue.enqueue("x", EnqueueOptions::default()).unwrap();
        let leased = queue.lease(1, Duration::seconds(30)).unwrap().remove(0);

        registry.delete_if_exists("orders");

        let err = queue
            .delete(leased.id, leased.pop_receipt.as_ref().unwrap())
            .unwrap_err();
        assert!(matches!(err, QueueError::QueueNotFound(_)));

        // a queue re-created under the same name starts empty
        let fresh = registry.create("orders").unwrap();
        assert!(fresh.peek(32).unwrap().is_empty());
    }

    #[test]
    fn test_list_is_sorted_snapshot() {
        let (registry, _) = registry();
        for name in ["gamma", "alpha", "beta"] {
            registry.create(name).unwrap();
        }

        let listing = registry.list();
        registry.create("delta").unwrap();

        let names: Vec<String> = listing.map(|q| q.name().to_string()).collect();
        assert_eq!(names, vec!["alpha", "beta", "gamma"]);

        // each call starts a fresh snapshot
        assert_eq!(registry.list().len(), 4);
    }

    #[test]
    fn test_list_with_prefix() {
        let (registry, _) = registry();
        for name in ["my-sample-queue", "my-other-queue", "unrelated"] {
            registry.create(name).unwrap();
        }

        let names: Vec<String> = registry
            .list_with_prefix("my-")
            .map(|q| q.name().to_string())
            .collect();
        assert_eq!(names, vec!["my-other-queue", "my-sample-queue"]);
    }

    #[test]
    fn test_list_segments() {
        let (registry, _) = registry();
        for name in ["q1", "q2", "q3", "q4", "q5"] {
            registry.create(name).unwrap();
        }

        let first = registry.list_segment(None, 2, None).unwrap();
        assert_eq!(first.queues.len(), 2);
        assert_eq!(first.next_marker.as_deref(), Some("q2"));

        let second = registry
            .list_segment(None, 2, first.next_marker.as_deref())
            .unwrap();
        let names: Vec<&str> = second.queues.iter().map(QueueHandle::name).collect();
        assert_eq!(names, vec!["q3", "q4"]);

        let last = registry
            .list_segment(None, 2, second.next_marker.as_deref())
            .unwrap();
        assert_eq!(last.queues.len(), 1);
        assert!(last.next_marker.is_none());

        assert!(matches!(
            registry.list_segment(None, 0, None),
            Err(QueueError::OutOfRange { .. })
        ));
        assert!(matches!(
            registry.list_segment(None, MAX_LIST_RESULTS + 1, None),
            Err(QueueError::OutOfRange { name: "max_results", .. })
        ));
        assert_eq!(
            registry.list_segment(None, MAX_LIST_RESULTS, None).unwrap().queues.len(),
            5
        );
    }

    #[test]
    fn test_sweep_expired_across_queues() {
        let (registry, clock) = registry();
        let short = EnqueueOptions::default().with_ttl(Duration::seconds(10));
        for name in ["a", "b"] {
            let queue = registry.create(name).unwrap();
            queue.enqueue("expiring", short).unwrap();
            queue.enqueue("staying", EnqueueOptions::default()).unwrap();
        }
        registry.get("a").unwrap().lease(32, Duration::hours(1)).unwrap();

        clock.advance(Duration::seconds(10));
        let report = registry.sweep_expired(clock.now());
        assert_eq!(report.queues_scanned, 2);
        assert_eq!(report.messages_removed, 2);

        assert_eq!(registry.sweep_expired(clock.now()).messages_removed, 0);
    }

    #[test]
    fn test_clear_all() {
        let (registry, _) = registry();
        let queue = registry.create("orders").unwrap();
        registry.create("audit").unwrap();

        registry.clear_all();
        assert!(registry.is_empty());
        assert!(matches!(queue.peek(1), Err(QueueError::QueueNotFound(_))));
    }
}

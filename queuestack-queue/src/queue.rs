//! Queue instances and the handles callers hold on to

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use queuestack_core::{Clock, PopReceipt};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, MAX_BATCH_SIZE};
use crate::error::QueueError;
use crate::message::{EnqueueOptions, MessageId, MessageSnapshot};
use crate::storage::MessageStore;

#[derive(Debug)]
struct QueueState {
    deleted: bool,
    store: MessageStore,
    metadata: HashMap<String, String>,
}

/// A named queue. All mutable state sits behind one lock.
#[derive(Debug)]
pub(crate) struct Queue {
    name: String,
    created_at: DateTime<Utc>,
    state: RwLock<QueueState>,
    approximate_count: AtomicU64,
}

impl Queue {
    pub fn new(name: String, created_at: DateTime<Utc>) -> Self {
        Self {
            name,
            created_at,
            state: RwLock::new(QueueState {
                deleted: false,
                store: MessageStore::new(),
                metadata: HashMap::new(),
            }),
            approximate_count: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Drop every message and make later operations through stale handles fail
    pub fn mark_deleted(&self) -> usize {
        let mut state = self.state.write();
        state.deleted = true;
        state.metadata.clear();
        self.approximate_count.store(0, Ordering::Relaxed);
        state.store.clear()
    }

    /// Physically remove expired messages
    pub fn remove_expired(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write();
        if state.deleted {
            return 0;
        }
        state.store.remove_expired(now)
    }
}

/// Queue properties fetched by [`QueueHandle::download_attributes`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueAttributes {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub metadata: HashMap<String, String>,
    pub approximate_message_count: u64,
}

/// Shared reference to a queue in a registry
#[derive(Debug, Clone)]
pub struct QueueHandle {
    queue: Arc<Queue>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
}

impl QueueHandle {
    pub(crate) fn new(queue: Arc<Queue>, clock: Arc<dyn Clock>, config: Arc<EngineConfig>) -> Self {
        Self {
            queue,
            clock,
            config,
        }
    }

    pub fn name(&self) -> &str {
        self.queue.name()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.queue.created_at
    }

    /// Add a message, returning its id
    pub fn enqueue(
        &self,
        content: impl Into<String>,
        options: EnqueueOptions,
    ) -> Result<MessageId, QueueError> {
        let content = content.into();
        self.check_content(&content)?;

        let ttl = options.ttl.unwrap_or_else(|| self.config.default_message_ttl());
        let delay = options.visibility_delay.unwrap_or_else(Duration::zero);
        if ttl <= Duration::zero() {
            return Err(QueueError::InvalidArgument(
                "ttl must be positive".to_string(),
            ));
        }
        QueueError::check_range(
            "ttl",
            ceil_secs(ttl),
            1,
            self.config.max_message_ttl().num_seconds(),
        )?;
        self.check_timeout("visibility_delay", delay, 0)?;
        if delay >= ttl {
            return Err(QueueError::InvalidArgument(
                "visibility_delay must be shorter than ttl".to_string(),
            ));
        }

        let mut state = self.write_state()?;
        let now = self.clock.now();
        let id = state.store.enqueue(content, now, delay, ttl);

        debug!(queue = %self.name(), message_id = %id, "Enqueued message");
        Ok(id)
    }

    /// Look at up to `max_count` visible messages without leasing them
    pub fn peek(&self, max_count: usize) -> Result<Vec<MessageSnapshot>, QueueError> {
        check_batch(max_count)?;

        let state = self.read_state()?;
        let now = self.clock.now();
        Ok(state.store.peek(now, max_count))
    }

    pub fn peek_one(&self) -> Result<Option<MessageSnapshot>, QueueError> {
        Ok(self.peek(1)?.into_iter().next())
    }

    /// Lease up to `max_count` visible messages for `visibility_timeout`
    pub fn lease(
        &self,
        max_count: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<MessageSnapshot>, QueueError> {
        check_batch(max_count)?;
        self.check_timeout("visibility_timeout", visibility_timeout, 1)?;

        let mut state = self.write_state()?;
        let now = self.clock.now();
        let leased = state.store.lease(now, max_count, visibility_timeout);

        debug!(queue = %self.name(), count = leased.len(), "Leased messages");
        Ok(leased)
    }

    /// Lease a single message, using the configured default timeout when none is given
    pub fn lease_one(
        &self,
        visibility_timeout: Option<Duration>,
    ) -> Result<Option<MessageSnapshot>, QueueError> {
        let timeout = visibility_timeout.unwrap_or_else(|| self.config.default_visibility_timeout());
        Ok(self.lease(1, timeout)?.into_iter().next())
    }

    /// Extend or shorten a lease and optionally replace the content.
    ///
    /// Returns the receipt for the renewed lease; the one passed in is no
    /// longer accepted afterwards.
    pub fn update(
        &self,
        id: MessageId,
        pop_receipt: &PopReceipt,
        content: Option<String>,
        visibility_timeout: Duration,
    ) -> Result<PopReceipt, QueueError> {
        if let Some(content) = &content {
            self.check_content(content)?;
        }
        self.check_timeout("visibility_timeout", visibility_timeout, 0)?;

        let mut state = self.write_state()?;
        let now = self.clock.now();
        let receipt = state
            .store
            .update(now, id, pop_receipt, content, visibility_timeout)
            .map_err(|e| {
                self.log_rejection(id, &e);
                e
            })?;

        debug!(queue = %self.name(), message_id = %id, "Updated message");
        Ok(receipt)
    }

    /// Permanently remove a leased message
    pub fn delete(&self, id: MessageId, pop_receipt: &PopReceipt) -> Result<(), QueueError> {
        let mut state = self.write_state()?;
        let now = self.clock.now();
        state
            .store
            .delete(now, id, pop_receipt)
            .map_err(|e| {
                self.log_rejection(id, &e);
                e
            })?;

        debug!(queue = %self.name(), message_id = %id, "Deleted message");
        Ok(())
    }

    /// Remove all messages regardless of lease state
    pub fn clear(&self) -> Result<(), QueueError> {
        let mut state = self.write_state()?;
        let removed = state.store.clear();

        info!(queue = %self.name(), removed, "Cleared queue");
        Ok(())
    }

    /// Last refreshed message count; may be stale
    pub fn approximate_count(&self) -> u64 {
        self.queue.approximate_count.load(Ordering::Relaxed)
    }

    /// Recount unexpired messages and cache the result
    pub fn refresh_approximate_count(&self) -> Result<u64, QueueError> {
        let state = self.read_state()?;
        let now = self.clock.now();
        let count = state.store.count_unexpired(now) as u64;
        self.queue.approximate_count.store(count, Ordering::Relaxed);
        Ok(count)
    }

    pub fn download_attributes(&self) -> Result<QueueAttributes, QueueError> {
        let state = self.read_state()?;
        let now = self.clock.now();
        let count = state.store.count_unexpired(now) as u64;
        self.queue.approximate_count.store(count, Ordering::Relaxed);

        Ok(QueueAttributes {
            name: self.name().to_string(),
            created_at: self.created_at(),
            metadata: state.metadata.clone(),
            approximate_message_count: count,
        })
    }

    /// Replace the queue's user metadata
    pub fn set_metadata(&self, metadata: HashMap<String, String>) -> Result<(), QueueError> {
        if metadata.keys().any(String::is_empty) {
            return Err(QueueError::InvalidArgument(
                "metadata keys must not be empty".to_string(),
            ));
        }

        let mut state = self.write_state()?;
        info!(queue = %self.name(), entries = metadata.len(), "Setting queue metadata");
        state.metadata = metadata;
        Ok(())
    }

    fn read_state(&self) -> Result<parking_lot::RwLockReadGuard<'_, QueueState>, QueueError> {
        let state = self.queue.state.read();
        if state.deleted {
            return Err(QueueError::QueueNotFound(self.name().to_string()));
        }
        Ok(state)
    }

    fn write_state(&self) -> Result<parking_lot::RwLockWriteGuard<'_, QueueState>, QueueError> {
        let state = self.queue.state.write();
        if state.deleted {
            return Err(QueueError::QueueNotFound(self.name().to_string()));
        }
        Ok(state)
    }

    fn check_content(&self, content: &str) -> Result<(), QueueError> {
        if content.len() > self.config.max_message_size {
            return Err(QueueError::InvalidArgument(format!(
                "message content is {} bytes, limit is {}",
                content.len(),
                self.config.max_message_size
            )));
        }
        Ok(())
    }

    fn check_timeout(
        &self,
        name: &'static str,
        timeout: Duration,
        min_secs: i64,
    ) -> Result<(), QueueError> {
        if timeout < Duration::zero() {
            return Err(QueueError::InvalidArgument(format!(
                "{name} must not be negative"
            )));
        }
        QueueError::check_range(
            name,
            ceil_secs(timeout),
            min_secs,
            self.config.max_visibility_timeout().num_seconds(),
        )
    }

    fn log_rejection(&self, id: MessageId, err: &QueueError) {
        if matches!(err, QueueError::LeaseMismatch(_)) {
            warn!(queue = %self.name(), message_id = %id, "Rejected stale pop receipt");
        }
    }
}

/// Whole seconds, rounding any fractional part up
fn ceil_secs(duration: Duration) -> i64 {
    let secs = duration.num_seconds();
    if duration > Duration::seconds(secs) {
        secs + 1
    } else {
        secs
    }
}

fn check_batch(max_count: usize) -> Result<(), QueueError> {
    QueueError::check_range(
        "max_count",
        i64::try_from(max_count).unwrap_or(i64::MAX),
        1,
        MAX_BATCH_SIZE as i64,
    )
}

//! Per-queue message store
//!
//! Pure data structure: every operation takes the current instant as an
//! argument and performs no locking. [`crate::queue::QueueHandle`] wraps it
//! in a lock and supplies `now` from the engine clock.

use chrono::{DateTime, Duration, Utc};
use queuestack_core::PopReceipt;
use std::collections::{BTreeMap, HashMap};

use crate::error::QueueError;
use crate::message::{MessageId, MessageSnapshot, StoredMessage};

#[derive(Debug, Default)]
pub(crate) struct MessageStore {
    next_sequence: u64,
    /// Messages keyed by insertion sequence
    messages: BTreeMap<u64, StoredMessage>,
    index: HashMap<MessageId, u64>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn enqueue(
        &mut self,
        content: String,
        now: DateTime<Utc>,
        visibility_delay: Duration,
        ttl: Duration,
    ) -> MessageId {
        let id = MessageId::new();
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        self.messages.insert(
            sequence,
            StoredMessage {
                id,
                content,
                insertion_time: now,
                expiration_time: now + ttl,
                next_visible_time: now + visibility_delay,
                dequeue_count: 0,
                pop_receipt: None,
            },
        );
        self.index.insert(id, sequence);
        id
    }

    pub fn peek(&self, now: DateTime<Utc>, max_count: usize) -> Vec<MessageSnapshot> {
        self.messages
            .values()
            .filter(|m| m.is_visible(now))
            .take(max_count)
            .map(StoredMessage::peeked)
            .collect()
    }

    /// Lease up to `max_count` visible messages, reclaiming expired ones met on the way
    pub fn lease(
        &mut self,
        now: DateTime<Utc>,
        max_count: usize,
        visibility_timeout: Duration,
    ) -> Vec<MessageSnapshot> {
        let mut expired = Vec::new();
        let mut leased = Vec::new();

        for (sequence, msg) in &mut self.messages {
            if msg.is_expired(now) {
                expired.push(*sequence);
                continue;
            }
            if leased.len() == max_count || !msg.is_visible(now) {
                continue;
            }

            msg.dequeue_count += 1;
            msg.next_visible_time = now + visibility_timeout;
            msg.pop_receipt = Some(PopReceipt::issue(now));
            leased.push(msg.leased());
        }

        for sequence in expired {
            self.remove_sequence(sequence);
        }
        leased
    }

    pub fn update(
        &mut self,
        now: DateTime<Utc>,
        id: MessageId,
        pop_receipt: &PopReceipt,
        content: Option<String>,
        visibility_timeout: Duration,
    ) -> Result<PopReceipt, QueueError> {
        let sequence = self.check_lease(now, id, pop_receipt)?;
        let msg = self
            .messages
            .get_mut(&sequence)
            .ok_or(QueueError::MessageNotFound(id))?;

        if let Some(content) = content {
            msg.content = content;
        }
        msg.next_visible_time = now + visibility_timeout;
        let receipt = PopReceipt::issue(now);
        msg.pop_receipt = Some(receipt.clone());
        Ok(receipt)
    }

    pub fn delete(
        &mut self,
        now: DateTime<Utc>,
        id: MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<(), QueueError> {
        let sequence = self.check_lease(now, id, pop_receipt)?;
        self.remove_sequence(sequence);
        Ok(())
    }

    /// Remove every message, returning how many were dropped
    pub fn clear(&mut self) -> usize {
        let removed = self.messages.len();
        self.messages.clear();
        self.index.clear();
        removed
    }

    /// Messages not yet expired, whether visible or leased
    pub fn count_unexpired(&self, now: DateTime<Utc>) -> usize {
        self.messages.values().filter(|m| !m.is_expired(now)).count()
    }

    pub fn remove_expired(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.messages.len();
        self.messages.retain(|_, m| !m.is_expired(now));
        if self.messages.len() != before {
            let messages = &self.messages;
            self.index.retain(|_, sequence| messages.contains_key(sequence));
        }
        before - self.messages.len()
    }

    /// Resolve `id` to its sequence if `pop_receipt` names its current lease.
    ///
    /// An expired message is reclaimed here and reported as missing.
    fn check_lease(
        &mut self,
        now: DateTime<Utc>,
        id: MessageId,
        pop_receipt: &PopReceipt,
    ) -> Result<u64, QueueError> {
        let sequence = *self
            .index
            .get(&id)
            .ok_or(QueueError::MessageNotFound(id))?;
        let msg = self
            .messages
            .get(&sequence)
            .ok_or(QueueError::MessageNotFound(id))?;

        if msg.is_expired(now) {
            self.remove_sequence(sequence);
            return Err(QueueError::MessageNotFound(id));
        }
        match &msg.pop_receipt {
            None => Err(QueueError::MessageNotFound(id)),
            Some(current) if current != pop_receipt => Err(QueueError::LeaseMismatch(id)),
            Some(_) => Ok(sequence),
        }
    }

    fn remove_sequence(&mut self, sequence: u64) {
        if let Some(msg) = self.messages.remove(&sequence) {
            self.index.remove(&msg.id);
        }
    }
}

//! Message types

use chrono::{DateTime, Duration, Utc};
use queuestack_core::PopReceipt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Immutable identifier assigned at enqueue time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Options for enqueue
#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    /// Delay before the message first becomes visible
    pub visibility_delay: Option<Duration>,
    /// Time to live; the queue default applies when unset
    pub ttl: Option<Duration>,
}

impl EnqueueOptions {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.visibility_delay = Some(delay);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }
}

/// A message as held by the store
#[derive(Debug, Clone)]
pub(crate) struct StoredMessage {
    pub id: MessageId,
    pub content: String,
    pub insertion_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    pub next_visible_time: DateTime<Utc>,
    pub dequeue_count: u32,
    pub pop_receipt: Option<PopReceipt>,
}

impl StoredMessage {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiration_time
    }

    pub fn is_visible(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_visible_time && !self.is_expired(now)
    }

    /// Snapshot without lease details, as returned by peek
    pub fn peeked(&self) -> MessageSnapshot {
        MessageSnapshot {
            id: self.id,
            content: self.content.clone(),
            insertion_time: self.insertion_time,
            expiration_time: self.expiration_time,
            next_visible_time: None,
            dequeue_count: self.dequeue_count,
            pop_receipt: None,
        }
    }

    /// Snapshot including the current lease
    pub fn leased(&self) -> MessageSnapshot {
        MessageSnapshot {
            next_visible_time: Some(self.next_visible_time),
            pop_receipt: self.pop_receipt.clone(),
            ..self.peeked()
        }
    }
}

/// Point-in-time copy of a message handed to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSnapshot {
    pub id: MessageId,
    pub content: String,
    pub insertion_time: DateTime<Utc>,
    pub expiration_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_visible_time: Option<DateTime<Utc>>,
    pub dequeue_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pop_receipt: Option<PopReceipt>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(now: DateTime<Utc>) -> StoredMessage {
        StoredMessage {
            id: MessageId::new(),
            content: "Hello, World".to_string(),
            insertion_time: now,
            expiration_time: now + Duration::seconds(60),
            next_visible_time: now,
            dequeue_count: 0,
            pop_receipt: None,
        }
    }

    #[test]
    fn test_visibility_window() {
        let now = Utc::now();
        let mut msg = message(now);

        assert!(msg.is_visible(now));
        assert!(!msg.is_visible(now + Duration::seconds(60)));
        assert!(msg.is_expired(now + Duration::seconds(60)));

        msg.next_visible_time = now + Duration::seconds(10);
        assert!(!msg.is_visible(now + Duration::seconds(9)));
        assert!(msg.is_visible(now + Duration::seconds(10)));
    }

    #[test]
    fn test_peek_snapshot_serialization_omits_lease() {
        let now = Utc::now();
        let mut msg = message(now);
        msg.pop_receipt = Some(PopReceipt::issue(now));

        let peeked = serde_json::to_value(msg.peeked()).unwrap();
        assert!(peeked.get("pop_receipt").is_none());
        assert!(peeked.get("next_visible_time").is_none());
        assert_eq!(peeked["content"], "Hello, World");
        assert_eq!(peeked["dequeue_count"], 0);

        let leased = serde_json::to_value(msg.leased()).unwrap();
        assert!(leased.get("pop_receipt").is_some());
        assert_eq!(leased["id"], msg.id.to_string());
    }

    #[test]
    fn test_message_id_parse() {
        let id = MessageId::new();
        let parsed: MessageId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<MessageId>().is_err());
    }
}

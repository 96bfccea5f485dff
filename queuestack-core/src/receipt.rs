//! Pop receipt generation

use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque token identifying one lease instance of a message.
///
/// A new receipt is issued every time a message is leased or its lease is
/// updated; only the most recent one is accepted for update/delete.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PopReceipt(String);

impl PopReceipt {
    /// Issue a fresh receipt for a lease taken at `leased_at`
    pub fn issue(leased_at: DateTime<Utc>) -> Self {
        // 16 random bytes followed by the lease instant in big-endian millis
        let mut raw = Vec::with_capacity(24);
        raw.extend_from_slice(Uuid::new_v4().as_bytes());
        raw.extend_from_slice(&leased_at.timestamp_millis().to_be_bytes());

        Self(base64::engine::general_purpose::STANDARD.encode(raw))
    }

    /// Wrap a receipt string handed back by a caller
    pub fn from_token(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PopReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

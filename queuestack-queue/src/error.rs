//! Queue engine errors

use queuestack_core::{ErrorCode, ErrorKind, ServiceError};
use thiserror::Error;

use crate::message::MessageId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Queue does not exist: {0}")]
    QueueNotFound(String),
    #[error("Message does not exist: {0}")]
    MessageNotFound(MessageId),
    #[error("Queue already exists: {0}")]
    QueueAlreadyExists(String),
    #[error("Pop receipt does not match the current lease of message {0}")]
    LeaseMismatch(MessageId),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

impl QueueError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::QueueNotFound(_) => ErrorCode::QueueNotFound,
            Self::MessageNotFound(_) => ErrorCode::MessageNotFound,
            Self::QueueAlreadyExists(_) => ErrorCode::QueueAlreadyExists,
            Self::LeaseMismatch(_) => ErrorCode::PopReceiptMismatch,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::OutOfRange { .. } => ErrorCode::OutOfRangeValue,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.code().kind()
    }

    /// Reject `value` unless it lies in `min..=max`
    pub(crate) fn check_range(
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    ) -> Result<(), QueueError> {
        if (min..=max).contains(&value) {
            Ok(())
        } else {
            Err(Self::OutOfRange {
                name,
                value,
                min,
                max,
            })
        }
    }
}

impl From<QueueError> for ServiceError {
    fn from(err: QueueError) -> Self {
        ServiceError::new(err.code(), err.to_string())
    }
}

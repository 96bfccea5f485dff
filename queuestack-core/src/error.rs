//! Service error codes and formatting

use serde::Serialize;
use thiserror::Error;

/// The four outcomes a caller has to distinguish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    LeaseMismatch,
    InvalidArgument,
}

/// Queue service error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    QueueNotFound,
    MessageNotFound,
    QueueAlreadyExists,
    PopReceiptMismatch,
    InvalidArgument,
    OutOfRangeValue,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QueueNotFound => "QueueNotFound",
            Self::MessageNotFound => "MessageNotFound",
            Self::QueueAlreadyExists => "QueueAlreadyExists",
            Self::PopReceiptMismatch => "PopReceiptMismatch",
            Self::InvalidArgument => "InvalidArgument",
            Self::OutOfRangeValue => "OutOfRangeQueryParameterValue",
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::QueueNotFound | Self::MessageNotFound => ErrorKind::NotFound,
            Self::QueueAlreadyExists => ErrorKind::AlreadyExists,
            Self::PopReceiptMismatch => ErrorKind::LeaseMismatch,
            Self::InvalidArgument | Self::OutOfRangeValue => ErrorKind::InvalidArgument,
        }
    }

    pub fn http_status(&self) -> u16 {
        match self {
            Self::QueueNotFound | Self::MessageNotFound => 404,
            Self::QueueAlreadyExists => 409,
            Self::PopReceiptMismatch | Self::InvalidArgument | Self::OutOfRangeValue => 400,
        }
    }
}

/// Error as reported to a remote caller
#[derive(Debug, Error)]
#[error("{}: {message}", .code.as_str())]
pub struct ServiceError {
    pub code: ErrorCode,
    pub message: String,
    pub request_id: String,
}

impl ServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            request_id: uuid::Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Format as the reference JSON error body
    pub fn to_json(&self) -> String {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct JsonError<'a> {
            code: &'static str,
            message: &'a str,
            request_id: &'a str,
        }

        let error = JsonError {
            code: self.code.as_str(),
            message: &self.message,
            request_id: &self.request_id,
        };

        serde_json::to_string(&error).unwrap_or_else(|_| {
            format!(r#"{{"code":"{}","message":"{}"}}"#, self.code.as_str(), self.message)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_json_format() {
        let error = ServiceError::new(ErrorCode::PopReceiptMismatch, "The pop receipt is stale")
            .with_request_id("test-request-id");

        let json: serde_json::Value = serde_json::from_str(&error.to_json()).unwrap();
        assert_eq!(json["code"], "PopReceiptMismatch");
        assert_eq!(json["message"], "The pop receipt is stale");
        assert_eq!(json["requestId"], "test-request-id");
    }

    #[test]
    fn test_error_display() {
        let error = ServiceError::new(ErrorCode::QueueNotFound, "no such queue");
        assert_eq!(error.to_string(), "QueueNotFound: no such queue");
    }

    #[test]
    fn test_kinds_and_statuses() {
        assert_eq!(ErrorCode::MessageNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(ErrorCode::OutOfRangeValue.kind(), ErrorKind::InvalidArgument);
        assert_eq!(ErrorCode::PopReceiptMismatch.kind(), ErrorKind::LeaseMismatch);
        assert_eq!(ErrorCode::QueueAlreadyExists.http_status(), 409);
        assert_eq!(ErrorCode::QueueNotFound.http_status(), 404);
    }
}

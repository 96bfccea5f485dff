//! Core types for queuestack
//!
//! This crate provides the pieces shared by the queue engine and its callers:
//! the lease clock, pop receipt tokens and service error codes.

pub mod clock;
pub mod error;
pub mod receipt;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorCode, ErrorKind, ServiceError};
pub use receipt::PopReceipt;

//! Lease-based message queue engine
//!
//! In-process queues with at-least-once delivery:
//! - create / delete / list queues
//! - enqueue, peek, lease with a visibility timeout
//! - update and delete leased messages by pop receipt
//! - clear, attributes and metadata, approximate counts
//! - periodic reclamation of expired messages

mod config;
mod engine;
mod error;
mod message;
mod queue;
mod registry;
mod storage;
mod sweep;

pub use config::{EngineConfig, MAX_BATCH_SIZE};
pub use engine::QueueEngine;
pub use error::QueueError;
pub use message::{EnqueueOptions, MessageId, MessageSnapshot};
pub use queue::{QueueAttributes, QueueHandle};
pub use registry::{
    CreateOutcome, DeleteOutcome, QueueListing, QueueRegistry, QueueSegment, SweepReport,
    MAX_LIST_RESULTS,
};
pub use sweep::{spawn_sweeper, SweeperHandle};

pub use queuestack_core::{
    Clock, ErrorCode, ErrorKind, ManualClock, PopReceipt, ServiceError, SystemClock,
};

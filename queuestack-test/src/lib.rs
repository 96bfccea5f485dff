//! Test utilities for queuestack
//!
//! Provides a deterministic harness for exercising the queue engine:
//! - an engine wired to a [`queuestack_queue::ManualClock`]
//! - helpers to move time and fetch queues
//! - a draining consumer for end-of-test assertions
//!
//! ## Usage
//!
//! ```rust
//! use queuestack_test::TestEngine;
//! use queuestack_queue::EnqueueOptions;
//!
//! let harness = TestEngine::new();
//! let queue = harness.queue("orders");
//! queue.enqueue("hello", EnqueueOptions::default()).unwrap();
//!
//! harness.advance_secs(30);
//! assert_eq!(queue.peek(1).unwrap().len(), 1);
//! ```

pub mod consumer;
pub mod engine;

pub use consumer::drain;
pub use engine::{init_tracing, TestEngine};

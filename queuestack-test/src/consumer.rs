//! Draining consumer

use chrono::Duration;
use queuestack_queue::{MessageSnapshot, QueueHandle, MAX_BATCH_SIZE};

/// Lease and delete every currently visible message, returning what was seen.
///
/// Panics on any engine error; meant for test assertions only.
pub fn drain(queue: &QueueHandle) -> Vec<MessageSnapshot> {
    let mut seen = Vec::new();
    loop {
        let batch = queue
            .lease(MAX_BATCH_SIZE, Duration::seconds(30))
            .unwrap_or_else(|e| panic!("lease failed on {}: {e}", queue.name()));
        if batch.is_empty() {
            return seen;
        }
        for message in batch {
            if let Some(receipt) = &message.pop_receipt {
                queue
                    .delete(message.id, receipt)
                    .unwrap_or_else(|e| panic!("delete failed on {}: {e}", queue.name()));
            }
            seen.push(message);
        }
    }
}

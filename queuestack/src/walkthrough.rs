//! Replays the classic queue sample against an in-process engine

use anyhow::Context;
use chrono::Duration;
use queuestack_queue::{EnqueueOptions, MessageSnapshot, QueueEngine};
use tracing::info;

/// Messages enqueued in bulk after the two greetings
const BULK_MESSAGES: usize = 20;

pub fn run(engine: &QueueEngine, queue_name: &str) -> anyhow::Result<()> {
    info!(queue = %queue_name, "Creating queue");
    let outcome = engine
        .create_queue_if_not_exists(queue_name)
        .context("queue could not be created")?;
    info!(created = outcome.is_created(), "Queue ready");
    let queue = engine.get_queue(queue_name)?;

    info!("Adding messages to the queue");
    queue.enqueue("Hello, World", EnqueueOptions::default())?;
    queue.enqueue("Bye, World", EnqueueOptions::default())?;
    for i in 0..BULK_MESSAGES {
        queue
            .enqueue(format!("Message {i}"), EnqueueOptions::default())
            .context("messages could not be pushed to the queue")?;
    }

    info!("Peeking first message from queue");
    if let Some(peeked) = queue.peek_one()? {
        print_message("Peeked", &peeked)?;
    }

    info!("Getting message from queue");
    let message = queue
        .lease_one(None)?
        .context("queue unexpectedly empty")?;
    print_message("Got", &message)?;
    let receipt = message
        .pop_receipt
        .as_ref()
        .context("leased message carries no pop receipt")?;

    info!(message_id = %message.id, "Changing message content");
    let receipt = queue
        .update(
            message.id,
            receipt,
            Some("Changed message".to_string()),
            Duration::seconds(60),
        )
        .context("message could not be updated")?;

    info!(message_id = %message.id, "Deleting message");
    queue
        .delete(message.id, &receipt)
        .context("message could not be deleted")?;

    info!("Getting messages with visibility timeout");
    let batch = queue
        .lease(20, Duration::seconds(300))
        .context("messages could not be retrieved from the queue")?;
    for message in &batch {
        print_message("Got", message)?;
    }

    info!("Getting queue attributes");
    let attributes = queue.download_attributes()?;
    println!(
        "Number of messages in queue: {}",
        attributes.approximate_message_count
    );

    info!("Clearing all messages from queue");
    queue.clear()?;

    info!("Listing all the available queues");
    for queue in engine.list_queues(None) {
        println!("Queue {} (created {})", queue.name(), queue.created_at());
    }

    info!("Deleting queue");
    engine.delete_queue_if_exists(queue_name);
    Ok(())
}

fn print_message(label: &str, message: &MessageSnapshot) -> anyhow::Result<()> {
    println!("{label}: {}", serde_json::to_string(message)?);
    Ok(())
}

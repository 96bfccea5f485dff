//! queuestack - lease-based message queue engine
//!
//! Runs the in-process queue engine under one of a few drivers: the classic
//! queue sample walkthrough, a concurrent soak run, or a config dump.

mod config;
mod soak;
mod walkthrough;

use clap::{Parser, Subcommand};
use queuestack_queue::QueueEngine;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "queuestack")]
#[command(about = "Lease-based message queue engine", long_about = None)]
struct Args {
    /// Configuration file (defaults to ./queuestack.toml if present)
    #[arg(short, long, env = "QUEUESTACK_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "QUEUESTACK_LOG_LEVEL")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Walk through every queue operation on a sample queue
    Walkthrough {
        /// Queue name (overrides the configured one)
        #[arg(long)]
        queue: Option<String>,
    },
    /// Run concurrent producers and consumers against one queue
    Soak(soak::SoakArgs),
    /// Print the effective configuration
    ShowConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "queuestack={level},queuestack_queue={level}",
                    level = args.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::load(args.config.as_deref())?;

    if let Command::ShowConfig = args.command {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    let engine = Arc::new(QueueEngine::with_system_clock(config.engine));
    engine.start_sweeper();

    let result = match args.command {
        Command::Walkthrough { queue } => {
            let queue_name = queue.unwrap_or(config.walkthrough.queue_name);
            walkthrough::run(&engine, &queue_name)
        }
        Command::Soak(soak_args) => soak::run(engine.clone(), soak_args).await.map(|report| {
            info!(
                produced = report.produced,
                delivered = report.delivered,
                duplicates = report.duplicates,
                rejected_acks = report.rejected_acks,
                elapsed = ?report.elapsed,
                "Soak run complete"
            );
        }),
        Command::ShowConfig => Ok(()),
    };

    engine.shutdown().await;
    result
}

//! eb - recurring-invocation scheduler demo.
//!
//! Usage:
//!   eb simulate    Run the profile unit against the in-memory host

use clap::{Parser, Subcommand};
use everbeat::{profile, Event, EventHandler, InMemorySink, OwnerId};
use everbeat::testing::SimHarness;
use std::sync::Arc;
use tracing::{info, warn};

/// eb - recurring-invocation scheduler demo
#[derive(Parser)]
#[command(name = "eb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the profile unit on the in-memory host and print the final table
    Simulate {
        /// Virtual seconds to simulate
        #[arg(long, default_value = "30")]
        seconds: u64,

        /// Heartbeat delay in seconds
        #[arg(long, default_value = "1")]
        delay: u32,
    },
}

/// Simple logging event handler that prints lifecycle events.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::TimerArmed {
                key, delay_secs, ..
            } => {
                info!("timer {} armed for {}s", key, delay_secs);
            }
            Event::InvocationStarted { name, .. } => {
                info!("invoking '{}'", name);
            }
            Event::InvocationCompleted { name, duration, .. } => {
                info!("'{}' completed in {:?}", name, duration);
            }
            Event::InvocationFailed { name, error, .. } => {
                warn!("'{}' failed: {}", name, error);
            }
            Event::DelegateScheduled { key, .. } => {
                info!("delegated one-shot under {}", key);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Simulate { seconds, delay } => simulate(seconds, delay).await,
    }
}

async fn simulate(seconds: u64, delay: u32) -> Result<(), Box<dyn std::error::Error>> {
    let sink = Arc::new(InMemorySink::new());
    let owner = OwnerId::new(1);
    let (dispatcher, store) = profile::contract(owner, Arc::clone(&sink), delay);
    dispatcher.event_bus().register(Arc::new(LoggingHandler)).await;

    let harness = SimHarness::new(dispatcher, Arc::clone(&sink));

    // Seed a couple of profiles through the public action surface.
    for (user, nickname) in [("alice", "Alice"), ("bob", "Bob")] {
        harness
            .invoke(
                profile::actions::UPDATE,
                Some(serde_json::json!({
                    "user": user,
                    "nickname": nickname,
                    "avatar": "",
                    "website": "",
                    "locale": "en",
                    "metadata": ""
                })),
            )
            .await?;
    }

    let mut delivered = 0usize;
    let mut failed = 0usize;
    for _ in 0..seconds {
        for outcome in harness.advance(1).await {
            delivered += 1;
            if outcome.result.is_err() {
                failed += 1;
            }
        }
    }

    info!(delivered, failed, "simulation finished");
    println!("{}", serde_json::to_string_pretty(&store.entries()?)?);
    Ok(())
}

//! heartwatch daemon: sweeps overdue checks and logs notifications.

use heartwatch::clock::SystemClock;
use heartwatch::config::ServerConfig;
use heartwatch::db::Store;
use heartwatch::monitor::Monitor;
use heartwatch::notify::LogNotifier;
use heartwatch::scheduler::Sweeper;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("heartwatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting heartwatch...");
    tracing::info!("Using database at {}", cfg.db_path);
    tracing::info!("Rate limits: {:?}", cfg.rate_limits);
    if cfg.secret_key.is_empty() {
        tracing::warn!("HEARTWATCH_SECRET_KEY is not set; hashed rate-limit keys are unsalted");
    }

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    let checks = store.get_checks()?;
    tracing::info!("Monitoring {} checks", checks.len());

    let monitor = Arc::new(Monitor::new(store, Arc::new(SystemClock)));

    // Start sweeper
    let sweeper = Sweeper::new(monitor, Arc::new(LogNotifier), cfg.sweep_interval);
    let handle = sweeper.start();

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    sweeper.stop();
    handle.await?;

    Ok(())
}

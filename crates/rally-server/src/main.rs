//! # Rally Server
//!
//! Realtime party relay: players create or join a party by a short code and
//! the server fans their state, chat and events out to the rest of the party.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! rally
//!
//! # Run with a config file in the working directory
//! cp rally.example.toml rally.toml && rally
//!
//! # Run with environment variables
//! RALLY_PORT=8080 RALLY_HOST=0.0.0.0 rally
//! ```

mod config;
mod handlers;
mod metrics;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "rally=debug,rally_core=debug,rally_transport=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::load()?;

    tracing::info!("Starting Rally server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}

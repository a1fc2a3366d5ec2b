//! Standalone MQTT relay built on [`Connection`](crate::Connection).
//!
//! This module exposes the command-line interface and the listener that
//! power the `pubsub-mqtt-server` binary. Binaries stay thin wrappers that
//! only need to call [`run`].

pub mod cli;
mod listener;
pub mod relay;
mod session;

use anyhow::Result;
use clap::Parser;
pub use cli::{AppConfig, Cli, ConfigError, load_config};
pub use listener::Server;
pub use relay::{Relay, topic_matches, valid_filter};
pub use session::ConnectPolicy;

/// Parse CLI arguments and run the server.
///
/// # Errors
///
/// Returns any error emitted while loading configuration or serving.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    run_with_cli(&cli).await
}

/// Run the server using an already parsed [`Cli`].
///
/// # Errors
///
/// Propagates configuration errors and failures reported by the listener.
pub async fn run_with_cli(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    listener::run(&config).await
}

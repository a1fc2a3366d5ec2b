//! Binary entry point for the MQTT relay server.
//!
//! The runtime logic lives in `pubsub_mqtt::server`, so this binary only
//! installs logging and delegates to the shared library code.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    pubsub_mqtt::server::run().await
}

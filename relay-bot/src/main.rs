//! Relay Bot - Main entry point.

use anyhow::Result;
use relay_common::config::Config;
use relay_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Credentials are required; a missing one aborts startup here
    let config = Config::load()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Relay Bot v{}", env!("CARGO_PKG_VERSION"));

    relay_bot::run(&config).await
}

//! Relay Gateway Server entry point
//!
//! Run with:
//! ```bash
//! cargo run -p relay-gateway
//! ```
//!
//! Configuration is loaded from environment variables.

use relay_common::{try_init_tracing_with_config, AppConfig, AppError, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Configuration decides the log level, so report its errors without tracing
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(AppError::from(e).exit_code());
        }
    };

    // Initialize tracing
    if let Err(e) = try_init_tracing_with_config(TracingConfig::from_app_config(&config)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    info!(
        pid = std::process::id(),
        listen = %config.server.address(),
        broker = %config.broker.url(),
        exchange = %config.broker.exchange,
        debug = config.debug,
        "Starting Relay Gateway Server..."
    );

    // Run the server
    if let Err(e) = relay_gateway::run(config).await {
        error!(error = %e, code = e.error_code(), "Gateway stopped");
        std::process::exit(e.exit_code());
    }
}

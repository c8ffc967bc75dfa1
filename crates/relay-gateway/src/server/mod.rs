//! Gateway server setup
//!
//! Routes, broker bootstrap and the process run loop.

mod handler;
mod state;

pub use handler::{relay_handler, ConnectParams};
pub use state::GatewayState;

use axum::{routing::get, Router};
use relay_broker::{AmqpChannel, AmqpConfig};
use relay_common::{AppConfig, AppError, AppResult};
use relay_core::BrokerChannel;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/", get(relay_handler))
        .route("/ws", get(relay_handler))
        .route("/health", get(health_check))
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Connect to the broker and create `GatewayState`
///
/// The exchange is asserted once here: publishing to a missing exchange
/// closes the shared AMQP channel, so it must exist before the first client.
pub async fn create_gateway_state(config: AppConfig) -> AppResult<GatewayState> {
    let amqp_config = AmqpConfig::from(&config.broker);

    tracing::info!(url = %amqp_config.url, "Connecting to AMQP broker...");
    let channel = AmqpChannel::connect(&amqp_config)
        .await
        .map_err(AppError::broker)?;
    tracing::info!("AMQP connection established");

    channel
        .declare_exchange(&config.broker.exchange)
        .await
        .map_err(AppError::broker)?;
    tracing::info!(exchange = %config.broker.exchange, "Exchange declared");

    Ok(GatewayState::new(Arc::new(channel), config))
}

/// Serve the application on a bound listener
pub async fn serve(listener: TcpListener, app: Router) -> AppResult<()> {
    axum::serve(listener, app).await.map_err(AppError::internal)
}

/// Serve until the listener fails or the shared broker channel is lost
///
/// Every session rides on the one channel, so losing it ends the server.
pub async fn serve_with_broker(
    listener: TcpListener,
    app: Router,
    broker: Arc<dyn BrokerChannel>,
) -> AppResult<()> {
    tokio::select! {
        result = serve(listener, app) => result,
        err = broker.closed() => {
            tracing::error!(error = %err, "Broker channel lost");
            Err(AppError::broker(err))
        }
    }
}

/// Bind and run the gateway server
pub async fn run_server(state: GatewayState, addr: &str) -> AppResult<()> {
    let listener = TcpListener::bind(addr).await.map_err(|source| AppError::Bind {
        addr: addr.to_string(),
        source,
    })?;

    tracing::info!("Gateway listening on ws://{}/?name=<client>", addr);

    let broker = state.broker().clone();
    serve_with_broker(listener, create_app(state), broker).await
}

/// Run the complete gateway server with configuration
///
/// Returns when the server fails, the broker channel is lost or a shutdown
/// signal arrives. Open sockets are not drained.
pub async fn run(config: AppConfig) -> AppResult<()> {
    let addr = config.server.address();

    let state = create_gateway_state(config).await?;

    tokio::select! {
        result = run_server(state, &addr) => result,
        signal = shutdown_signal() => {
            tracing::info!(signal, "Shutting down");
            Ok(())
        }
    }
}

/// Wait for SIGINT or SIGTERM and return the signal name
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => "SIGINT",
        () = terminate => "SIGTERM",
    }
}

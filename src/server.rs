//! Relay HTTP server

use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use axum::{routing::get, Router};

use crate::handlers::{self, AppState};
use crate::relay::SoapRelay;

/// Create and configure the Axum router
pub fn create_router(relay: SoapRelay) -> Router {
    let state = Arc::new(AppState { relay });

    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/fetch_data", get(handlers::fetch_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server until SIGINT/SIGTERM
pub async fn run(listener: tokio::net::TcpListener, relay: SoapRelay) -> std::io::Result<()> {
    let app = create_router(relay);

    info!(
        "Relay listening on {}",
        listener
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 0)))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

/// Wait for SIGTERM or SIGINT signal
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Starting graceful shutdown...");
}

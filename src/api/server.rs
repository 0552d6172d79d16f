use std::net::SocketAddr;

use axum::{Router, routing::get, routing::post};
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::{info, warn};

use super::{
    services::{health, list_modules, query},
    state::AppState,
};
use crate::config::Config;
use crate::handlers::ModuleRegistry;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All routes and middleware, ready to serve or to drive from tests.
pub fn build_router(state: AppState) -> Router {
    let max_concurrent = state.config.server.max_concurrent_queries;

    Router::new()
        .route("/query", post(query))
        .route("/modules", get(list_modules))
        .route("/healthcheck", get(health))
        .route("/health", get(health))
        .with_state(state)
        // Inflates gzip request bodies before the size limit is applied
        .layer(RequestDecompressionLayer::new())
        // One semaphore shared by every route
        .layer(GlobalConcurrencyLimitLayer::new(max_concurrent))
}

pub async fn run(config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    let registry = ModuleRegistry::with_builtins()?;
    info!(modules = registry.len(), "Module registry ready");

    for name in config.unknown_modules(|name| registry.contains(name)) {
        warn!(module = %name, "Configuration names an unregistered module");
    }

    let address = address.unwrap_or(config.server.bind_addr);
    let app = build_router(AppState::new(config, registry));

    let listener = TcpListener::bind(address).await?;
    info!(%address, "enrichbox listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received");
}

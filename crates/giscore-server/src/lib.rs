// SPDX-License-Identifier: Apache-2.0

//! HTTP backend for Giscore.
//!
//! Serves the OAuth login (authorize, callback, session token exchange,
//! logout), a repository read, a GitHub App installation check and a
//! health probe on axum, on top of the `giscore-core` token codec and
//! credential exchange.

mod cookies;
mod error;
mod logging;
mod middleware;
mod response;
pub mod routes;
mod state;

use axum::Router;
use http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

pub use cookies::SESSION_COOKIE;
pub use error::ApiError;
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use response::{ApiFailure, ApiResponse};
pub use state::AppState;

/// Builds the application router with CORS and request logging.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.allowed_origins);

    routes::router()
        .layer(cors)
        .layer(axum::middleware::from_fn(middleware::log_requests))
        .with_state(state)
}

/// CORS restricted to the configured origins, with credentials so the
/// session cookie travels on cross-site requests.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            HeaderValue::from_str(origin)
                .inspect_err(|_| warn!(origin = %origin, "Ignoring invalid allowed origin"))
                .ok()
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Run the HTTP server.
///
/// Binds `host:port` and serves [`app`] until Ctrl+C.
pub async fn run_http(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    tracing::info!("Starting giscore HTTP server on {}:{}", host, port);

    let router = app(state);

    // Handle both IPv4 and IPv6 addresses
    let addr: SocketAddr = if host.contains(':') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
    .parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!("HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            tracing::info!("Received Ctrl+C, shutting down gracefully");
        })
        .await?;

    Ok(())
}

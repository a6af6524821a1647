// SPDX-License-Identifier: Apache-2.0

//! Request logging middleware.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, info, warn};

/// Logs method, path, status and latency for every request.
///
/// The query string is left out: it carries OAuth codes and session tokens.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    if response.status().is_server_error() {
        error!(%method, %path, status, duration_ms, "Request failed");
    } else if response.status().is_client_error() {
        warn!(%method, %path, status, duration_ms, "Request rejected");
    } else {
        info!(%method, %path, status, duration_ms, "Request handled");
    }

    response
}

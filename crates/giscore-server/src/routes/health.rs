// SPDX-License-Identifier: Apache-2.0

//! Liveness probe.

use axum::Json;

use crate::response::{ApiResponse, ok};

/// `GET /health`
pub async fn health() -> Json<ApiResponse<()>> {
    ok(())
}

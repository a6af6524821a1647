// SPDX-License-Identifier: Apache-2.0

//! JSON response envelope shared by every route.

use axum::Json;
use serde::Serialize;

/// `{ "success": bool, "msg": "...", "data": ... }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    /// Whether the request succeeded.
    pub success: bool,
    /// `"ok"` on success, otherwise the error message.
    pub msg: String,
    /// Payload; `null` for routes without one.
    pub data: T,
}

/// Wraps `data` in a success envelope.
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        msg: "ok".to_string(),
        data,
    })
}

/// Failure envelope; carries no `data`.
#[derive(Debug, Serialize)]
pub struct ApiFailure {
    /// Always `false`.
    pub success: bool,
    /// Human-readable reason.
    pub msg: String,
}

impl ApiFailure {
    /// Builds a failure envelope.
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            msg: msg.into(),
        }
    }
}

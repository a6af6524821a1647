// SPDX-License-Identifier: Apache-2.0

//! Conversion from core errors to HTTP responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use giscore_core::GiscoreError;

use crate::response::ApiFailure;

/// Errors returned by route handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Failure from the core library.
    #[error(transparent)]
    Core(#[from] GiscoreError),

    /// Missing or malformed request parameter.
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    /// HTTP status for this error.
    ///
    /// Maps core variants as follows:
    /// - token, state, repository and provider refusals -> 400
    /// - `Expired`, `MissingSession` -> 401
    /// - `InstallationNotFound`, `RepositoryNotFound` -> 404
    /// - upstream GitHub failures -> 502
    /// - everything else -> 500
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Core(err) => match err {
                GiscoreError::StateMismatch
                | GiscoreError::InvalidToken
                | GiscoreError::Decryption
                | GiscoreError::InvalidRepository { .. }
                | GiscoreError::OAuth { .. } => StatusCode::BAD_REQUEST,
                GiscoreError::Expired | GiscoreError::MissingSession => StatusCode::UNAUTHORIZED,
                GiscoreError::InstallationNotFound { .. }
                | GiscoreError::RepositoryNotFound { .. } => StatusCode::NOT_FOUND,
                GiscoreError::TokenExchange { .. }
                | GiscoreError::GitHub { .. }
                | GiscoreError::Network(_) => StatusCode::BAD_GATEWAY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let msg = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "Internal error");
            "internal server error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ApiFailure::new(msg))).into_response()
    }
}

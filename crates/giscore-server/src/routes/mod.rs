// SPDX-License-Identifier: Apache-2.0

//! HTTP routes.

pub mod health;
pub mod installation;
pub mod oauth;
pub mod repository;

use axum::Router;
use axum::routing::{get, post};

use crate::state::AppState;

/// All routes, before state and layers are applied.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth/authorize", get(oauth::authorize))
        .route("/oauth/callback", get(oauth::callback))
        .route(
            "/oauth/token",
            get(oauth::token_from_cookie).post(oauth::token_from_body),
        )
        .route("/oauth/logout", post(oauth::logout))
        .route("/api/installation", get(installation::installation))
        .route("/api/repository", get(repository::repository))
        .route("/health", get(health::health))
}

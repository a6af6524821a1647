// SPDX-License-Identifier: Apache-2.0

//! GitHub App installation check.
//!
//! Runs the full credential exchange for a repository so site owners can
//! verify their setup. The installation token itself never leaves the server.

use axum::Json;
use axum::extract::{Query, State};
use giscore_core::RepoKey;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::response::{ApiResponse, ok};
use crate::state::AppState;

/// Query of `GET /api/installation`.
#[derive(Debug, Deserialize)]
pub struct InstallationParams {
    repo: Option<String>,
}

/// Installation status for a repository.
#[derive(Debug, Serialize)]
pub struct InstallationStatus {
    repo: String,
    installed: bool,
}

/// `GET /api/installation?repo=owner/repo`
pub async fn installation(
    State(state): State<AppState>,
    Query(params): Query<InstallationParams>,
) -> Result<Json<ApiResponse<InstallationStatus>>, ApiError> {
    let input = params
        .repo
        .ok_or_else(|| ApiError::BadRequest("repo is required".to_string()))?;
    let repo = RepoKey::parse(&input)?;

    state.credentials.token_for(&repo).await?;
    info!(repo = %repo, "GitHub App installation verified");

    Ok(ok(InstallationStatus {
        repo: repo.to_string(),
        installed: true,
    }))
}

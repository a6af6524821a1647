// SPDX-License-Identifier: Apache-2.0

//! Repository metadata for the widget.
//!
//! Reads as the caller when an `Authorization: Bearer` token is sent and as
//! the GitHub App otherwise, so anonymous visitors still get public data.

use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use giscore_core::{RepoKey, RepositoryInfo, TokenSource, bearer_token, resolve_read_token};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ApiError;
use crate::response::{ApiResponse, ok};
use crate::state::AppState;

/// Query of `GET /api/repository`.
#[derive(Debug, Deserialize)]
pub struct RepositoryParams {
    repo: Option<String>,
}

/// Repository metadata and the credential it was read with.
#[derive(Debug, Serialize)]
pub struct RepositoryData {
    #[serde(flatten)]
    repository: RepositoryInfo,
    source: TokenSource,
}

/// `GET /api/repository?repo=owner/repo`
pub async fn repository(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<RepositoryParams>,
) -> Result<Json<ApiResponse<RepositoryData>>, ApiError> {
    let input = params
        .repo
        .ok_or_else(|| ApiError::BadRequest("repo is required".to_string()))?;
    let repo = RepoKey::parse(&input)?;

    let user_token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token);

    let (token, source) =
        resolve_read_token(user_token, &state.credentials, repo.owner(), repo.repo()).await?;
    let repository = state.repositories.repository(&token, &repo).await?;
    debug!(repo = %repo, source = %source, "Read repository");

    Ok(ok(RepositoryData { repository, source }))
}

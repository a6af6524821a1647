// SPDX-License-Identifier: Apache-2.0

//! Repository metadata reads.
//!
//! The widget needs a repository's GraphQL node id before it can create a
//! discussion. Reads run as the signed-in user when a token is supplied and
//! as the App otherwise (see [`crate::auth::resolve_read_token`]).

use async_trait::async_trait;
use octocrab::Octocrab;
use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, instrument};

use super::app::is_not_found;
use super::{DEFAULT_API_BASE_URL, RepoKey};
use crate::Result;
use crate::error::GiscoreError;

/// What the widget needs to know about a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryInfo {
    /// `owner/name` as GitHub spells it.
    pub full_name: String,
    /// GraphQL node id.
    pub node_id: Option<String>,
    /// Whether the repository is private.
    pub private: bool,
}

/// Repository lookup seam.
#[async_trait]
pub trait RepositoryApi: Send + Sync {
    /// `GET /repos/{owner}/{repo}` as the holder of `token`.
    ///
    /// # Errors
    ///
    /// [`GiscoreError::RepositoryNotFound`] when the repository does not
    /// exist or `token` cannot see it.
    async fn repository(&self, token: &SecretString, repo: &RepoKey) -> Result<RepositoryInfo>;
}

/// [`RepositoryApi`] over octocrab.
#[derive(Debug, Clone)]
pub struct OctocrabRepositoryApi {
    base_uri: String,
    user_agent: Option<String>,
}

impl Default for OctocrabRepositoryApi {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

impl OctocrabRepositoryApi {
    /// Creates a client for the API at `base_uri`.
    #[must_use]
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self {
            base_uri: base_uri.into(),
            user_agent: None,
        }
    }

    /// Sends `user_agent` instead of octocrab's default.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    fn client(&self, token: &SecretString) -> Result<Octocrab> {
        super::octocrab_client(&self.base_uri, self.user_agent.as_deref(), token)
    }
}

#[async_trait]
impl RepositoryApi for OctocrabRepositoryApi {
    #[instrument(skip(self, token), fields(repo = %repo))]
    async fn repository(&self, token: &SecretString, repo: &RepoKey) -> Result<RepositoryInfo> {
        let crab = self.client(token)?;
        let found = match crab.repos(repo.owner(), repo.repo()).get().await {
            Ok(found) => found,
            Err(err) if is_not_found(&err) => {
                return Err(GiscoreError::RepositoryNotFound {
                    input: repo.to_string(),
                });
            }
            Err(err) => return Err(err.into()),
        };

        debug!(private = ?found.private, "Fetched repository");
        Ok(RepositoryInfo {
            full_name: found.full_name.unwrap_or_else(|| repo.to_string()),
            node_id: found.node_id,
            private: found.private.unwrap_or(false),
        })
    }
}

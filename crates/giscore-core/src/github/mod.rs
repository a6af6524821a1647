// SPDX-License-Identifier: Apache-2.0

//! GitHub integration module.
//!
//! Provides GitHub App authentication (App JWT, installation access tokens)
//! and the OAuth web-flow code exchange.

use std::fmt;
use std::str::FromStr;

use octocrab::Octocrab;
use octocrab::service::middleware::retry::RetryConfig;
use reqwest::header::USER_AGENT;
use secrecy::SecretString;

use crate::Result;
use crate::error::GiscoreError;

pub mod app;
pub mod jwt;
pub mod oauth;
pub mod repository;

/// Default GitHub REST API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Default GitHub OAuth base URL.
pub const DEFAULT_OAUTH_BASE_URL: &str = "https://github.com/login/oauth";

/// Builds an octocrab client sending `token` as a bearer credential.
///
/// Retries are off: [`app::AppCredentials`] owns the single retry of the
/// credential exchange, and octocrab would otherwise repeat every 5xx three
/// more times.
pub(crate) fn octocrab_client(
    base_uri: &str,
    user_agent: Option<&str>,
    token: &SecretString,
) -> Result<Octocrab> {
    let mut builder = Octocrab::builder()
        .base_uri(base_uri)?
        .add_retry_config(RetryConfig::None)
        .personal_token(token.clone());
    if let Some(agent) = user_agent {
        builder = builder.add_header(USER_AGENT, agent.to_string());
    }
    Ok(builder.build()?)
}

/// A normalized `owner/repo` pair.
///
/// GitHub names are case-insensitive, so both halves are lowercased. The
/// `Display` form is the cache key suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoKey {
    owner: String,
    repo: String,
}

impl RepoKey {
    /// Builds a key from separate owner and repository names.
    ///
    /// # Errors
    ///
    /// Returns [`GiscoreError::InvalidRepository`] if either half is empty or
    /// contains a `/`.
    pub fn new(owner: &str, repo: &str) -> Result<Self> {
        let owner = owner.trim();
        let repo = repo.trim();
        if owner.is_empty() || repo.is_empty() || owner.contains('/') || repo.contains('/') {
            return Err(GiscoreError::InvalidRepository {
                input: format!("{owner}/{repo}"),
            });
        }
        Ok(Self {
            owner: owner.to_ascii_lowercase(),
            repo: repo.to_ascii_lowercase(),
        })
    }

    /// Parses an `owner/repo` string.
    ///
    /// Validates format: exactly one `/`, non-empty parts.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || GiscoreError::InvalidRepository {
            input: s.to_string(),
        };
        let (owner, repo) = s.split_once('/').ok_or_else(invalid)?;
        Self::new(owner, repo).map_err(|_| invalid())
    }

    /// Repository owner (lowercased).
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Repository name (lowercased).
    #[must_use]
    pub fn repo(&self) -> &str {
        &self.repo
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

impl FromStr for RepoKey {
    type Err = GiscoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

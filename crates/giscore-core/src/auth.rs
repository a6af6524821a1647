// SPDX-License-Identifier: Apache-2.0

//! Read-path credential resolution.
//!
//! Token priority chain for reading repository data:
//! 1. The signed-in user's token (`Authorization: Bearer ...`)
//! 2. The GitHub App installation token for the repository
//!
//! Anonymous visitors read through the App, so a missing user token never
//! blocks public content.

use secrecy::SecretString;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::Result;
use crate::github::app::AppCredentials;

/// Source of a read token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenSource {
    /// Token supplied by the signed-in user.
    User,
    /// GitHub App installation token.
    App,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::User => write!(f, "user token"),
            TokenSource::App => write!(f, "app installation token"),
        }
    }
}

/// Extracts the token from an `Authorization` header value.
///
/// The scheme is matched case-insensitively; anything but a non-empty
/// `Bearer` credential yields `None`.
#[must_use]
pub fn bearer_token(header: &str) -> Option<SecretString> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| SecretString::from(token))
}

/// Resolves the token used to read `owner/repo`.
///
/// # Errors
///
/// Only fails when falling back to the App, with that exchange's error
/// (for example [`crate::GiscoreError::InstallationNotFound`]).
#[instrument(skip(user_token, credentials))]
pub async fn resolve_read_token(
    user_token: Option<SecretString>,
    credentials: &AppCredentials,
    owner: &str,
    repo: &str,
) -> Result<(SecretString, TokenSource)> {
    if let Some(token) = user_token {
        debug!("Using caller-supplied user token");
        return Ok((token, TokenSource::User));
    }

    let token = credentials.installation_access_token(owner, repo).await?;
    debug!("Using App installation token");
    Ok((token, TokenSource::App))
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_token_source_display() {
        assert_eq!(TokenSource::User.to_string(), "user token");
        assert_eq!(TokenSource::App.to_string(), "app installation token");
    }

    #[test]
    fn test_token_source_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TokenSource::App).unwrap(), "\"app\"");
    }

    #[test]
    fn test_bearer_token() {
        let token = bearer_token("Bearer gho_abc").unwrap();
        assert_eq!(token.expose_secret(), "gho_abc");
        let token = bearer_token("bearer   gho_abc ").unwrap();
        assert_eq!(token.expose_secret(), "gho_abc");
    }

    #[test]
    fn test_bearer_token_rejects_other_schemes() {
        assert!(bearer_token("Basic dXNlcjpwYXNz").is_none());
        assert!(bearer_token("Bearer").is_none());
        assert!(bearer_token("Bearer ").is_none());
        assert!(bearer_token("").is_none());
    }
}

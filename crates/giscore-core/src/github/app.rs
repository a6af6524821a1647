// SPDX-License-Identifier: Apache-2.0

//! GitHub App installation credentials.
//!
//! Exchanges the App identity for a repository-scoped installation access
//! token:
//! 1. Sign an App JWT
//! 2. Resolve the repository's installation id (cache, then GitHub)
//! 3. Resolve an installation access token (cache, then GitHub)
//! 4. If step 3 fails, drop both cache entries and run 2-3 once more
//!
//! A stale installation id (the App was reinstalled) is the usual reason
//! step 3 fails, and a single retry is enough to recover from it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::EncodingKey;
use octocrab::Octocrab;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, instrument, warn};

use super::jwt::{self, AppClaims};
use super::{DEFAULT_API_BASE_URL, RepoKey};
use crate::Result;
use crate::cache::{TokenCache, TokenCacheEntry};
use crate::error::GiscoreError;

/// Lifetime GitHub documents for installation tokens, used when a response
/// carries no `expires_at`.
pub const DEFAULT_INSTALLATION_TOKEN_LIFETIME: Duration = Duration::hours(1);

/// A GitHub App's id and parsed signing key.
#[derive(Clone)]
pub struct AppIdentity {
    app_id: String,
    key: EncodingKey,
}

impl fmt::Debug for AppIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppIdentity")
            .field("app_id", &self.app_id)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl AppIdentity {
    /// Parses `private_key` (PKCS#1 or PKCS#8 PEM) for `app_id`.
    ///
    /// # Errors
    ///
    /// Returns [`GiscoreError::InvalidPrivateKey`] if the key is unusable.
    pub fn new(app_id: impl Into<String>, private_key: &SecretString) -> Result<Self> {
        Ok(Self {
            app_id: app_id.into(),
            key: jwt::encoding_key(private_key)?,
        })
    }

    /// The App id (`iss` claim).
    #[must_use]
    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Signs a fresh App JWT.
    pub fn jwt(&self) -> Result<SecretString> {
        self.jwt_at(Utc::now())
    }

    /// Signs an App JWT as of `now`.
    pub fn jwt_at(&self, now: DateTime<Utc>) -> Result<SecretString> {
        jwt::sign(&self.key, &AppClaims::at(&self.app_id, now))
    }
}

/// A freshly issued installation access token.
#[derive(Debug, Clone)]
pub struct InstallationToken {
    /// The token value.
    pub token: SecretString,
    /// Server-declared expiry.
    pub expires_at: DateTime<Utc>,
}

/// The two GitHub App endpoints the credential exchange needs.
///
/// Both calls authenticate with the App JWT.
#[async_trait]
pub trait AppApi: Send + Sync {
    /// `GET /repos/{owner}/{repo}/installation`.
    ///
    /// # Errors
    ///
    /// [`GiscoreError::InstallationNotFound`] when the App is not installed
    /// on `repo`, [`GiscoreError::TokenExchange`] for any other failure.
    async fn repository_installation_id(&self, jwt: &SecretString, repo: &RepoKey) -> Result<u64>;

    /// `POST /app/installations/{id}/access_tokens`.
    async fn create_installation_token(
        &self,
        jwt: &SecretString,
        installation_id: u64,
    ) -> Result<InstallationToken>;
}

/// [`AppApi`] over octocrab.
#[derive(Debug, Clone)]
pub struct OctocrabAppApi {
    base_uri: String,
    user_agent: Option<String>,
}

impl Default for OctocrabAppApi {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

impl OctocrabAppApi {
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

    fn client(&self, jwt: &SecretString) -> Result<Octocrab> {
        super::octocrab_client(&self.base_uri, self.user_agent.as_deref(), jwt)
    }
}

pub(crate) fn is_not_found(err: &octocrab::Error) -> bool {
    matches!(err, octocrab::Error::GitHub { source, .. } if source.status_code.as_u16() == 404)
}

fn exchange_error(err: impl fmt::Display) -> GiscoreError {
    GiscoreError::TokenExchange {
        message: err.to_string(),
    }
}

fn parse_expiry(expires_at: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    expires_at
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map_or_else(
            || now + DEFAULT_INSTALLATION_TOKEN_LIFETIME,
            |at| at.with_timezone(&Utc),
        )
}

#[async_trait]
impl AppApi for OctocrabAppApi {
    #[instrument(skip(self, jwt), fields(repo = %repo))]
    async fn repository_installation_id(&self, jwt: &SecretString, repo: &RepoKey) -> Result<u64> {
        let crab = self.client(jwt)?;
        match crab
            .apps()
            .get_repository_installation(repo.owner(), repo.repo())
            .await
        {
            Ok(installation) => Ok(installation.id.0),
            Err(err) if is_not_found(&err) => Err(GiscoreError::InstallationNotFound {
                owner: repo.owner().to_string(),
                repo: repo.repo().to_string(),
            }),
            Err(err) => Err(exchange_error(err)),
        }
    }

    #[instrument(skip(self, jwt))]
    async fn create_installation_token(
        &self,
        jwt: &SecretString,
        installation_id: u64,
    ) -> Result<InstallationToken> {
        let crab = self.client(jwt)?;
        let route = format!("/app/installations/{installation_id}/access_tokens");
        let issued: octocrab::models::InstallationToken = crab
            .post(route, None::<&()>)
            .await
            .map_err(exchange_error)?;

        Ok(InstallationToken {
            expires_at: parse_expiry(issued.expires_at.as_deref(), Utc::now()),
            token: SecretString::from(issued.token),
        })
    }
}

/// Resolves installation access tokens for repositories, caching both the
/// installation id and the token.
#[derive(Clone)]
pub struct AppCredentials {
    identity: AppIdentity,
    api: Arc<dyn AppApi>,
    cache: TokenCache,
}

impl fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCredentials")
            .field("identity", &self.identity)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl AppCredentials {
    /// Creates the exchange. Pass [`TokenCache::default`] for an in-memory cache.
    #[must_use]
    pub fn new(identity: AppIdentity, api: Arc<dyn AppApi>, cache: TokenCache) -> Self {
        Self {
            identity,
            api,
            cache,
        }
    }

    /// The shared token cache.
    #[must_use]
    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    /// Returns an installation access token for `owner/repo`.
    ///
    /// # Errors
    ///
    /// - [`GiscoreError::InvalidRepository`] for an empty owner or repo
    /// - [`GiscoreError::InstallationNotFound`] if the App is not installed
    /// - [`GiscoreError::TokenExchange`] if issuance fails after the retry
    pub async fn installation_access_token(&self, owner: &str, repo: &str) -> Result<SecretString> {
        let repo = RepoKey::new(owner, repo)?;
        self.token_for(&repo).await
    }

    /// Same as [`Self::installation_access_token`] for a parsed key.
    #[instrument(skip(self), fields(repo = %repo))]
    pub async fn token_for(&self, repo: &RepoKey) -> Result<SecretString> {
        let jwt = self.identity.jwt()?;

        let installation_id = self.installation_id(&jwt, repo).await?;
        let first = match self.access_token(&jwt, repo, installation_id).await {
            Ok(token) => return Ok(token),
            Err(err) => err,
        };

        warn!(
            error = %first,
            installation_id,
            "Installation token exchange failed, retrying once with a fresh installation id"
        );
        self.cache.invalidate(repo).await?;

        let installation_id = self.installation_id(&jwt, repo).await?;
        self.access_token(&jwt, repo, installation_id)
            .await
            .map_err(|err| match err {
                GiscoreError::TokenExchange { .. } => err,
                other => exchange_error(other),
            })
    }

    /// Drops the cached installation id and token for `owner/repo`.
    pub async fn invalidate(&self, owner: &str, repo: &str) -> Result<()> {
        self.cache.invalidate(&RepoKey::new(owner, repo)?).await
    }

    async fn installation_id(&self, jwt: &SecretString, repo: &RepoKey) -> Result<u64> {
        if let Some(id) = self.cache.installation_id(repo).await? {
            debug!(installation_id = id, "Installation id cache hit");
            return Ok(id);
        }

        let id = self.api.repository_installation_id(jwt, repo).await?;
        self.cache.set_installation_id(repo, id).await?;
        debug!(installation_id = id, "Resolved installation id");
        Ok(id)
    }

    async fn access_token(
        &self,
        jwt: &SecretString,
        repo: &RepoKey,
        installation_id: u64,
    ) -> Result<SecretString> {
        if let Some(entry) = self.cache.get(repo).await? {
            return Ok(entry.secret());
        }

        let issued = self
            .api
            .create_installation_token(jwt, installation_id)
            .await?;

        let entry = TokenCacheEntry {
            installation_id,
            token: issued.token.expose_secret().to_string(),
            expires_at: issued.expires_at,
        };
        self.cache.set(repo, &entry).await?;

        info!(installation_id, expires_at = %issued.expires_at, "Issued installation token");
        Ok(issued.token)
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Shared handler state.

use std::sync::Arc;

use giscore_core::{
    AppConfig, AppCredentials, AppIdentity, GitHubOAuthClient, OAuthExchange, OctocrabAppApi,
    OctocrabRepositoryApi, RepositoryApi, SessionDelivery, TokenCache, TokenCodec,
};
use url::Url;

/// State cloned into every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Mints and opens `state` and `session` tokens.
    pub codec: TokenCodec,
    /// OAuth provider.
    pub provider: Arc<dyn OAuthExchange>,
    /// GitHub App installation token exchange.
    pub credentials: AppCredentials,
    /// Repository reads, as the user or the App.
    pub repositories: Arc<dyn RepositoryApi>,
    /// How the callback hands the session back.
    pub delivery: SessionDelivery,
    /// `Secure` + `SameSite=None` on the session cookie.
    pub secure_cookies: bool,
    /// Browser origins allowed to call the API and receive sessions.
    pub allowed_origins: Arc<[String]>,
}

impl AppState {
    /// State with query delivery, secure cookies, no allowed origins and
    /// repository reads against api.github.com.
    pub fn new(
        codec: TokenCodec,
        provider: Arc<dyn OAuthExchange>,
        credentials: AppCredentials,
    ) -> Self {
        Self {
            codec,
            provider,
            credentials,
            repositories: Arc::new(OctocrabRepositoryApi::default()),
            delivery: SessionDelivery::Query,
            secure_cookies: true,
            allowed_origins: Arc::from(Vec::new()),
        }
    }

    /// Wires production collaborators from a validated configuration.
    ///
    /// # Errors
    ///
    /// Fails when the App private key cannot be parsed.
    pub fn from_config(config: &AppConfig) -> giscore_core::Result<Self> {
        let github = &config.github;

        let identity = AppIdentity::new(github.app_id.clone(), &github.app_private_key)?;
        let api = OctocrabAppApi::new(github.api_base_url.clone())
            .with_user_agent(github.user_agent.clone());
        let cache =
            TokenCache::default().with_installation_id_ttl(config.cache.installation_id_ttl());
        let credentials = AppCredentials::new(identity, Arc::new(api), cache);

        let provider = GitHubOAuthClient::new(github.client_id.clone(), github.client_secret.clone())
            .with_base_url(github.oauth_base_url.clone())
            .with_scope(github.scope.clone());

        let repositories = OctocrabRepositoryApi::new(github.api_base_url.clone())
            .with_user_agent(github.user_agent.clone());

        Ok(Self::new(config.auth.codec(), Arc::new(provider), credentials)
            .with_repositories(Arc::new(repositories))
            .with_delivery(config.server.session_delivery)
            .with_secure_cookies(config.server.secure_cookies)
            .with_allowed_origins(config.server.allowed_origins.clone()))
    }

    /// Replaces the repository reader.
    #[must_use]
    pub fn with_repositories(mut self, repositories: Arc<dyn RepositoryApi>) -> Self {
        self.repositories = repositories;
        self
    }

    /// Sets the session hand-off mode.
    #[must_use]
    pub fn with_delivery(mut self, delivery: SessionDelivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Sets the cookie security flags.
    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }

    /// Sets the allowed browser origins (`scheme://host[:port]`).
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins
            .into_iter()
            .map(|origin| origin.trim_end_matches('/').to_string())
            .collect();
        self
    }

    /// Whether `url` belongs to one of the allowed origins.
    #[must_use]
    pub fn allows_origin(&self, url: &Url) -> bool {
        let origin = url.origin();
        if !origin.is_tuple() {
            return false;
        }
        let origin = origin.ascii_serialization();
        self.allowed_origins.iter().any(|allowed| *allowed == origin)
    }
}

// SPDX-License-Identifier: Apache-2.0

//! GitHub OAuth web flow: authorize URL and code exchange.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use super::DEFAULT_OAUTH_BASE_URL;
use crate::Result;
use crate::error::GiscoreError;

/// Default scope requested from the user.
pub const DEFAULT_SCOPE: &str = "public_repo";

/// The OAuth provider: where to send the user, and how to redeem the code.
#[async_trait]
pub trait OAuthExchange: Send + Sync {
    /// Provider consent page carrying `state`.
    fn authorize_url(&self, state: &str) -> Result<Url>;

    /// Trades `code` for an access token.
    ///
    /// # Errors
    ///
    /// [`GiscoreError::OAuth`] when the provider refuses the code,
    /// [`GiscoreError::TokenExchange`] on transport or HTTP failures.
    async fn exchange_code(&self, code: &str) -> Result<SecretString>;
}

/// GitHub OAuth App credentials and endpoints.
#[derive(Debug, Clone)]
pub struct GitHubOAuthClient {
    client_id: String,
    client_secret: SecretString,
    base_url: String,
    scope: String,
    http: Client,
}

#[derive(Serialize)]
struct AccessTokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
}

#[derive(Deserialize)]
struct AccessTokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl GitHubOAuthClient {
    /// Creates a client against `github.com`.
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: SecretString) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret,
            base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            http: Client::new(),
        }
    }

    /// Points the client at another OAuth base URL (GitHub Enterprise, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Overrides the requested scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = scope.into();
        self
    }

    /// Uses a preconfigured HTTP client (timeouts, user agent).
    #[must_use]
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }
}

#[async_trait]
impl OAuthExchange for GitHubOAuthClient {
    /// Builds `{base}/authorize?client_id=..&scope=..&state=..`.
    fn authorize_url(&self, state: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/authorize", self.base_url)).map_err(|e| {
            GiscoreError::Config {
                message: format!("invalid OAuth base URL '{}': {e}", self.base_url),
            }
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("scope", &self.scope)
            .append_pair("state", state);
        Ok(url)
    }

    #[instrument(skip(self, code))]
    async fn exchange_code(&self, code: &str) -> Result<SecretString> {
        let request = AccessTokenRequest {
            client_id: &self.client_id,
            client_secret: self.client_secret.expose_secret(),
            code,
        };

        let response = self
            .http
            .post(format!("{}/access_token", self.base_url))
            .header(ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| GiscoreError::TokenExchange {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "OAuth code exchange rejected");
            return Err(GiscoreError::TokenExchange {
                message: format!("OAuth token endpoint returned {status}"),
            });
        }

        let body: AccessTokenResponse =
            response
                .json()
                .await
                .map_err(|e| GiscoreError::TokenExchange {
                    message: format!("malformed OAuth token response: {e}"),
                })?;

        parse_access_token(body)
    }
}

fn parse_access_token(body: AccessTokenResponse) -> Result<SecretString> {
    if body.error.is_some() || body.error_description.is_some() {
        let message = body
            .error_description
            .or(body.error)
            .unwrap_or_default();
        debug!(message = %message, "OAuth provider refused the code");
        return Err(GiscoreError::OAuth { message });
    }

    match body.access_token {
        Some(token) if !token.is_empty() => Ok(SecretString::from(token)),
        _ => Err(GiscoreError::OAuth {
            message: "response did not include an access token".to_string(),
        }),
    }
}

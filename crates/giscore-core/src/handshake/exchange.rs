// SPDX-License-Identifier: Apache-2.0

//! Session-for-token exchange against the backend's `/oauth/token`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::Result;
use crate::error::GiscoreError;

/// Trades the opaque session value for a bearer token.
#[async_trait]
pub trait SessionExchange: Send + Sync {
    /// With `Some(session)` the session is sent in the body; with `None` the
    /// backend reads its session cookie.
    async fn exchange(&self, session: Option<&str>) -> Result<SecretString>;
}

#[derive(Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    msg: String,
    data: Option<TokenData>,
}

#[derive(Deserialize)]
struct TokenData {
    token: String,
}

/// A 401 means either no session reached the backend or it has expired.
fn unauthorized(msg: &str) -> GiscoreError {
    if msg == GiscoreError::MissingSession.to_string() {
        GiscoreError::MissingSession
    } else {
        GiscoreError::Expired
    }
}

/// [`SessionExchange`] over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSessionExchange {
    token_url: String,
    http: Client,
}

impl HttpSessionExchange {
    /// Creates an exchange for the backend at `server_url`, keeping cookies
    /// between requests.
    pub fn new(server_url: &str) -> Result<Self> {
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self::with_client(server_url, http))
    }

    /// Uses a preconfigured client.
    #[must_use]
    pub fn with_client(server_url: &str, http: Client) -> Self {
        Self {
            token_url: format!("{}/oauth/token", server_url.trim_end_matches('/')),
            http,
        }
    }
}

#[async_trait]
impl SessionExchange for HttpSessionExchange {
    #[instrument(skip(self, session), fields(url = %self.token_url, body = session.is_some()))]
    async fn exchange(&self, session: Option<&str>) -> Result<SecretString> {
        let request = match session {
            Some(session) => self
                .http
                .post(&self.token_url)
                .json(&json!({ "session": session })),
            None => self.http.get(&self.token_url),
        };

        let response = request.send().await?;
        let status = response.status();
        let envelope: Envelope = response.json().await?;
        debug!(status = %status, success = envelope.success, "Session exchange response");

        match (envelope.success, envelope.data) {
            (true, Some(data)) => Ok(SecretString::from(data.token)),
            _ if status == StatusCode::UNAUTHORIZED => Err(unauthorized(&envelope.msg)),
            _ if status == StatusCode::BAD_REQUEST => Err(GiscoreError::InvalidToken),
            _ => Err(GiscoreError::TokenExchange {
                message: envelope.msg,
            }),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Configuration management for the Giscore backend.
//!
//! Provides layered configuration from a TOML file and environment variables.
//! Loaded once at startup and never mutated afterwards.
//!
//! # Configuration Sources (in priority order)
//!
//! 1. Environment variables (prefix: `GISCORE_`)
//! 2. Config file: `--config <path>` or `./giscore.toml`
//! 3. Built-in defaults
//!
//! # Examples
//!
//! ```bash
//! GISCORE_AUTH__ENCRYPTION_PASSWORD=... GISCORE_SERVER__PORT=8080 giscore-server
//! ```

use std::path::Path;

use chrono::Duration;
use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::crypto::TokenCodec;
use crate::error::GiscoreError;
use crate::github::oauth::DEFAULT_SCOPE;
use crate::github::{DEFAULT_API_BASE_URL, DEFAULT_OAUTH_BASE_URL};

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "giscore.toml";

/// How `/oauth/callback` hands the session back to the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionDelivery {
    /// Append `giscore=<session>` to the return URL.
    #[default]
    Query,
    /// Set an `HttpOnly` session cookie.
    Cookie,
}

/// Application configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener and browser-facing settings.
    pub server: ServerConfig,
    /// GitHub App and OAuth App credentials.
    pub github: GitHubConfig,
    /// Token encryption settings.
    pub auth: AuthConfig,
    /// Cache settings.
    pub cache: CacheConfig,
}

/// HTTP listener settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Origins allowed by CORS.
    pub allowed_origins: Vec<String>,
    /// Session hand-off mode.
    pub session_delivery: SessionDelivery,
    /// Mark the session cookie `Secure` and `SameSite=None`.
    pub secure_cookies: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            session_delivery: SessionDelivery::Query,
            secure_cookies: true,
        }
    }
}

/// GitHub settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub App id.
    pub app_id: String,
    /// GitHub App private key, PKCS#1 or PKCS#8 PEM.
    pub app_private_key: SecretString,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: SecretString,
    /// OAuth base URL.
    pub oauth_base_url: String,
    /// REST API base URL.
    pub api_base_url: String,
    /// Scope requested at authorization.
    pub scope: String,
    /// `User-Agent` for outbound GitHub calls.
    pub user_agent: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            app_private_key: SecretString::default(),
            client_id: String::new(),
            client_secret: SecretString::default(),
            oauth_base_url: DEFAULT_OAUTH_BASE_URL.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            user_agent: concat!("giscore/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Token encryption settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Server secret the token cipher key is derived from.
    pub encryption_password: SecretString,
    /// Validity of the OAuth `state` token.
    pub state_ttl_minutes: i64,
    /// Validity of the `session` token.
    pub session_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            encryption_password: SecretString::default(),
            state_ttl_minutes: 10,
            session_ttl_days: 365,
        }
    }
}

impl AuthConfig {
    /// `state` window.
    #[must_use]
    pub fn state_ttl(&self) -> Duration {
        Duration::try_minutes(self.state_ttl_minutes).unwrap_or(Duration::MAX)
    }

    /// `session` window.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::try_days(self.session_ttl_days).unwrap_or(Duration::MAX)
    }

    /// Builds the token codec for these settings.
    #[must_use]
    pub fn codec(&self) -> TokenCodec {
        TokenCodec::new(self.encryption_password.clone())
            .with_state_ttl(self.state_ttl())
            .with_session_ttl(self.session_ttl())
    }
}

/// Cache settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Installation id cache TTL in minutes.
    pub installation_id_ttl_minutes: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            installation_id_ttl_minutes: 60,
        }
    }
}

impl CacheConfig {
    /// Installation id TTL as a duration.
    #[must_use]
    pub fn installation_id_ttl(&self) -> Duration {
        Duration::try_minutes(self.installation_id_ttl_minutes).unwrap_or(Duration::MAX)
    }
}

/// Longest accepted `state` window (one day).
pub const MAX_STATE_TTL_MINUTES: i64 = 24 * 60;

/// Longest accepted `session` window (ten years).
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;

/// Longest accepted installation id cache TTL (one week).
pub const MAX_INSTALLATION_ID_TTL_MINUTES: i64 = 7 * 24 * 60;

fn missing(field: &str) -> GiscoreError {
    GiscoreError::Config {
        message: format!("{field} is required"),
    }
}

fn out_of_range(field: &str, value: i64, max: i64) -> Result<(), GiscoreError> {
    if (1..=max).contains(&value) {
        Ok(())
    } else {
        Err(GiscoreError::Config {
            message: format!("{field} must be between 1 and {max}, got {value}"),
        })
    }
}

fn blank(secret: &SecretString) -> bool {
    secret.expose_secret().trim().is_empty()
}

impl AppConfig {
    /// Rejects configurations the server cannot start with.
    ///
    /// # Errors
    ///
    /// Returns [`GiscoreError::Config`] naming the first missing or invalid
    /// setting.
    pub fn validate(&self) -> Result<(), GiscoreError> {
        if blank(&self.auth.encryption_password) {
            return Err(missing("auth.encryption_password"));
        }
        if self.github.client_id.trim().is_empty() {
            return Err(missing("github.client_id"));
        }
        if blank(&self.github.client_secret) {
            return Err(missing("github.client_secret"));
        }
        if self.github.app_id.trim().is_empty() {
            return Err(missing("github.app_id"));
        }
        if blank(&self.github.app_private_key) {
            return Err(missing("github.app_private_key"));
        }
        out_of_range(
            "auth.state_ttl_minutes",
            self.auth.state_ttl_minutes,
            MAX_STATE_TTL_MINUTES,
        )?;
        out_of_range(
            "auth.session_ttl_days",
            self.auth.session_ttl_days,
            MAX_SESSION_TTL_DAYS,
        )?;
        out_of_range(
            "cache.installation_id_ttl_minutes",
            self.cache.installation_id_ttl_minutes,
            MAX_INSTALLATION_ID_TTL_MINUTES,
        )?;
        Ok(())
    }
}

/// Load application configuration.
///
/// Reads `path` when given (it must exist), otherwise `./giscore.toml` if
/// present, then applies environment variables with the prefix `GISCORE_`
/// and double underscore for nested keys (e.g. `GISCORE_SERVER__PORT`).
/// `GISCORE_SERVER__ALLOWED_ORIGINS` is a comma-separated list.
///
/// # Errors
///
/// Returns `GiscoreError::Config` if the config file is missing or invalid.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, GiscoreError> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let config = Config::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("GISCORE")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.allowed_origins")
                .try_parsing(true),
        )
        .build()?;

    let app_config: AppConfig = config.try_deserialize()?;

    Ok(app_config)
}

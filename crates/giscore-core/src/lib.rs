// SPDX-License-Identifier: Apache-2.0

#![warn(missing_docs)]

//! # Giscore Core
//!
//! Core library for the Giscore comments backend.
//!
//! This crate provides reusable components for:
//! - Encrypting opaque strings and minting signed, expiring tokens
//! - GitHub App authentication (App JWT, installation access tokens)
//! - The GitHub OAuth web flow and the cross-window login handshake
//! - Configuration management
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use giscore_core::{AppCredentials, AppIdentity, OctocrabAppApi, TokenCache, load_config};
//! use anyhow::Result;
//!
//! # async fn example() -> Result<()> {
//! let config = load_config(None)?;
//! config.validate()?;
//!
//! let identity = AppIdentity::new(config.github.app_id.clone(), &config.github.app_private_key)?;
//! let credentials = AppCredentials::new(
//!     identity,
//!     Arc::new(OctocrabAppApi::new(config.github.api_base_url.clone())),
//!     TokenCache::default(),
//! );
//!
//! let token = credentials.installation_access_token("octo", "blog").await?;
//! # let _ = token;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`auth`] - Read-path token resolution
//! - [`cache`] - Key/value store and installation token cache
//! - [`config`] - Configuration loading
//! - [`crypto`] - AES-GCM cipher and token codec
//! - [`error`] - Error types
//! - [`github`] - GitHub App and OAuth
//! - [`handshake`] - Popup login state machine

// ============================================================================
// Error Handling
// ============================================================================

pub use error::GiscoreError;

/// Convenience Result type for Giscore operations.
///
/// This is equivalent to `std::result::Result<T, GiscoreError>`.
pub type Result<T> = std::result::Result<T, GiscoreError>;

// ============================================================================
// Configuration
// ============================================================================

pub use config::{
    AppConfig, AuthConfig, CacheConfig, GitHubConfig, ServerConfig, SessionDelivery, load_config,
};

// ============================================================================
// Cryptography
// ============================================================================

pub use crypto::{TokenCodec, TokenPolicy, decode_token, decrypt, encode_token, encrypt};

// ============================================================================
// Caching
// ============================================================================

pub use cache::{EXPIRY_BUFFER, KeyValueStore, MemoryStore, TokenCache, TokenCacheEntry};

// ============================================================================
// GitHub Integration
// ============================================================================

pub use github::RepoKey;
pub use github::app::{AppApi, AppCredentials, AppIdentity, InstallationToken, OctocrabAppApi};
pub use github::jwt::create_app_jwt;
pub use github::oauth::{GitHubOAuthClient, OAuthExchange};
pub use github::repository::{OctocrabRepositoryApi, RepositoryApi, RepositoryInfo};

// ============================================================================
// Authentication
// ============================================================================

pub use auth::{TokenSource, bearer_token, resolve_read_token};

// ============================================================================
// Login Handshake
// ============================================================================

pub use handshake::{HandshakeState, LoginHandshake, MessageBus, PopupOptions};

// ============================================================================
// Modules
// ============================================================================

pub mod auth;
pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod github;
pub mod handshake;

// SPDX-License-Identifier: Apache-2.0

//! Error types for Giscore.
//!
//! Uses `thiserror` for deriving `std::error::Error` implementations.
//! Binaries should use `anyhow::Result` for top-level error handling.

use thiserror::Error;

/// Errors that can occur during Giscore operations.
#[derive(Error, Debug)]
pub enum GiscoreError {
    /// Plaintext could not be sealed.
    #[error("Encryption failed")]
    Encryption,

    /// Ciphertext could not be opened. Carries no detail on purpose.
    #[error("Decryption failed")]
    Decryption,

    /// A signed token decoded correctly but its deadline has passed.
    #[error("Token expired")]
    Expired,

    /// No session token was presented.
    #[error("No session")]
    MissingSession,

    /// A signed token could not be decrypted or its envelope is malformed.
    #[error("Invalid token")]
    InvalidToken,

    /// OAuth `state` did not validate on the callback.
    #[error("Invalid state value")]
    StateMismatch,

    /// The GitHub App is not installed on the target repository.
    #[error(
        "The GitHub App is not installed on {owner}/{repo} - install it on the repository to enable comments"
    )]
    InstallationNotFound {
        /// Repository owner.
        owner: String,
        /// Repository name.
        repo: String,
    },

    /// The installation token exchange failed, after the single retry.
    #[error("Installation token exchange failed: {message}")]
    TokenExchange {
        /// Error message.
        message: String,
    },

    /// A repository reference is not of the form `owner/repo`.
    #[error("Invalid owner/repo format. Expected: owner/repo, got: {input}")]
    InvalidRepository {
        /// The rejected input.
        input: String,
    },

    /// The repository does not exist or the reading token cannot see it.
    #[error("Repository not found: {input}")]
    RepositoryNotFound {
        /// The `owner/repo` that was looked up.
        input: String,
    },

    /// The OAuth provider refused the authorization code.
    #[error("OAuth error: {message}")]
    OAuth {
        /// Provider-supplied description or error code.
        message: String,
    },

    /// The App private key is not a usable RSA PEM.
    #[error("Invalid GitHub App private key: {message}")]
    InvalidPrivateKey {
        /// Error message.
        message: String,
    },

    /// App JWT signing failed.
    #[error("Failed to sign App JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config {
        /// Error message.
        message: String,
    },

    /// Backing key/value store error.
    #[error("Storage error: {message}")]
    Storage {
        /// Error message.
        message: String,
    },

    /// GitHub API error from octocrab.
    #[error("GitHub API error: {message}")]
    GitHub {
        /// Error message.
        message: String,
    },

    /// Network/HTTP error from reqwest.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl From<octocrab::Error> for GiscoreError {
    fn from(err: octocrab::Error) -> Self {
        GiscoreError::GitHub {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for GiscoreError {
    fn from(err: config::ConfigError) -> Self {
        GiscoreError::Config {
            message: err.to_string(),
        }
    }
}

// SPDX-License-Identifier: Apache-2.0

//! Signed, expiring tokens for OAuth `state` and `session` values.
//!
//! A token is the encryption of a JSON envelope `{"value": ..., "expires": ...}`
//! where `expires` is absolute Unix-epoch milliseconds. Expiry is checked only
//! when decoding; there is no revocation list.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cipher;
use crate::Result;
use crate::error::GiscoreError;

/// Default validity of an OAuth `state` token.
pub const DEFAULT_STATE_TTL: Duration = Duration::minutes(10);

/// Default validity of a `session` token.
pub const DEFAULT_SESSION_TTL: Duration = Duration::days(365);

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    value: String,
    expires: i64,
}

/// Encodes `value` into a token valid for `validity` from now.
pub fn encode_token(value: &str, password: &str, validity: Duration) -> Result<String> {
    encode_token_at(value, password, validity, Utc::now())
}

/// Same as [`encode_token`], with an explicit current time.
pub fn encode_token_at(
    value: &str,
    password: &str,
    validity: Duration,
    now: DateTime<Utc>,
) -> Result<String> {
    let expires = now
        .checked_add_signed(validity)
        .ok_or_else(|| GiscoreError::Config {
            message: format!("token validity of {} days is out of range", validity.num_days()),
        })?;
    let envelope = Envelope {
        value: value.to_string(),
        expires: expires.timestamp_millis(),
    };
    let json = serde_json::to_string(&envelope).map_err(|_| GiscoreError::Encryption)?;
    cipher::encrypt(&json, password)
}

/// Decodes a token produced by [`encode_token`].
///
/// # Errors
///
/// - [`GiscoreError::InvalidToken`] if the token does not decrypt or the
///   envelope is malformed
/// - [`GiscoreError::Expired`] if the deadline has passed
pub fn decode_token(token: &str, password: &str) -> Result<String> {
    decode_token_at(token, password, Utc::now())
}

/// Same as [`decode_token`], with an explicit current time.
pub fn decode_token_at(token: &str, password: &str, now: DateTime<Utc>) -> Result<String> {
    let json = cipher::decrypt(token, password).map_err(|_| GiscoreError::InvalidToken)?;
    let envelope: Envelope =
        serde_json::from_str(&json).map_err(|_| GiscoreError::InvalidToken)?;

    if now.timestamp_millis() >= envelope.expires {
        debug!(expires = envelope.expires, "Rejected expired token");
        return Err(GiscoreError::Expired);
    }

    Ok(envelope.value)
}

/// The two token lifetimes used by the OAuth flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenPolicy {
    /// Short-lived token carrying the return URL across the provider round-trip.
    State,
    /// Long-lived token carrying the provider access token.
    Session,
}

impl std::fmt::Display for TokenPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenPolicy::State => write!(f, "state"),
            TokenPolicy::Session => write!(f, "session"),
        }
    }
}

/// Token codec bound to the server password and the two policy windows.
#[derive(Debug, Clone)]
pub struct TokenCodec {
    password: SecretString,
    state_ttl: Duration,
    session_ttl: Duration,
}

impl TokenCodec {
    /// Creates a codec with the default windows.
    #[must_use]
    pub fn new(password: SecretString) -> Self {
        Self {
            password,
            state_ttl: DEFAULT_STATE_TTL,
            session_ttl: DEFAULT_SESSION_TTL,
        }
    }

    /// Overrides the `state` window.
    #[must_use]
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Overrides the `session` window.
    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Returns the validity window for `policy`.
    #[must_use]
    pub fn ttl(&self, policy: TokenPolicy) -> Duration {
        match policy {
            TokenPolicy::State => self.state_ttl,
            TokenPolicy::Session => self.session_ttl,
        }
    }

    /// Encodes `value` under `policy`.
    pub fn encode(&self, policy: TokenPolicy, value: &str) -> Result<String> {
        encode_token(value, self.password.expose_secret(), self.ttl(policy))
    }

    /// Decodes a token minted under any policy.
    pub fn decode(&self, token: &str) -> Result<String> {
        decode_token(token, self.password.expose_secret())
    }

    /// Mints a `state` token embedding the caller's return URL.
    pub fn encode_state(&self, return_url: &str) -> Result<String> {
        self.encode(TokenPolicy::State, return_url)
    }

    /// Validates a `state` token and returns the return URL.
    ///
    /// Any failure, including expiry, is a [`GiscoreError::StateMismatch`].
    pub fn decode_state(&self, state: &str) -> Result<String> {
        self.decode(state).map_err(|err| {
            debug!(error = %err, "OAuth state rejected");
            GiscoreError::StateMismatch
        })
    }

    /// Wraps a provider access token in a `session` token.
    pub fn encode_session(&self, access_token: &SecretString) -> Result<String> {
        self.encode(TokenPolicy::Session, access_token.expose_secret())
    }

    /// Unwraps a `session` token back into the provider access token.
    pub fn decode_session(&self, session: &str) -> Result<SecretString> {
        self.decode(session).map(SecretString::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "correct horse battery staple";

    fn codec() -> TokenCodec {
        TokenCodec::new(SecretString::from(PASSWORD))
    }

    #[test]
    fn test_decode_before_expiry() {
        let now = Utc::now();
        let token = encode_token_at("value", PASSWORD, Duration::minutes(5), now).unwrap();
        let value = decode_token_at(&token, PASSWORD, now + Duration::minutes(4)).unwrap();
        assert_eq!(value, "value");
    }

    #[test]
    fn test_decode_just_before_deadline() {
        let now = Utc::now();
        let window = Duration::seconds(30);
        let token = encode_token_at("v", PASSWORD, window, now).unwrap();
        let at = now + window - Duration::milliseconds(1);
        assert_eq!(decode_token_at(&token, PASSWORD, at).unwrap(), "v");
    }

    #[test]
    fn test_decode_after_expiry() {
        let now = Utc::now();
        let window = Duration::seconds(30);
        let token = encode_token_at("v", PASSWORD, window, now).unwrap();
        let at = now + window + Duration::milliseconds(1);
        assert!(matches!(
            decode_token_at(&token, PASSWORD, at),
            Err(GiscoreError::Expired)
        ));
    }

    #[test]
    fn test_decode_at_deadline_is_expired() {
        let now = Utc::now();
        let window = Duration::seconds(30);
        let token = encode_token_at("v", PASSWORD, window, now).unwrap();
        assert!(matches!(
            decode_token_at(&token, PASSWORD, now + window),
            Err(GiscoreError::Expired)
        ));
    }

    #[test]
    fn test_out_of_range_validity_is_error() {
        let err = encode_token("v", PASSWORD, Duration::days(100_000_000)).unwrap_err();
        assert!(matches!(err, GiscoreError::Config { .. }), "got {err:?}");

        let codec = codec().with_session_ttl(Duration::MAX);
        assert!(
            codec
                .encode_session(&SecretString::from("gho_abc"))
                .is_err()
        );
    }

    #[test]
    fn test_wrong_password_is_invalid_token() {
        let token = encode_token("v", PASSWORD, Duration::minutes(1)).unwrap();
        assert!(matches!(
            decode_token(&token, "nope"),
            Err(GiscoreError::InvalidToken)
        ));
    }

    #[test]
    fn test_bare_ciphertext_is_invalid_token() {
        // Decrypts fine but is not an envelope.
        let token = cipher::encrypt("gho_plain_token", PASSWORD).unwrap();
        assert!(matches!(
            decode_token(&token, PASSWORD),
            Err(GiscoreError::InvalidToken)
        ));
    }

    #[test]
    fn test_envelope_missing_fields_is_invalid_token() {
        let token = cipher::encrypt(r#"{"value":"x"}"#, PASSWORD).unwrap();
        assert!(matches!(
            decode_token(&token, PASSWORD),
            Err(GiscoreError::InvalidToken)
        ));
    }

    #[test]
    fn test_session_expires_after_a_year() {
        let now = Utc::now();
        let token = encode_token_at("gho_abc", PASSWORD, DEFAULT_SESSION_TTL, now).unwrap();
        let later = now + Duration::days(366);
        assert!(matches!(
            decode_token_at(&token, PASSWORD, later),
            Err(GiscoreError::Expired)
        ));
    }

    #[test]
    fn test_codec_state_round_trip() {
        let codec = codec();
        let state = codec.encode_state("https://blog.example/post").unwrap();
        assert_eq!(
            codec.decode_state(&state).unwrap(),
            "https://blog.example/post"
        );
    }

    #[test]
    fn test_codec_state_failures_are_mismatch() {
        let codec = codec();
        assert!(matches!(
            codec.decode_state("garbage"),
            Err(GiscoreError::StateMismatch)
        ));

        let expired = self::codec()
            .with_state_ttl(Duration::milliseconds(-1))
            .encode_state("https://blog.example")
            .unwrap();
        assert!(matches!(
            codec.decode_state(&expired),
            Err(GiscoreError::StateMismatch)
        ));
    }

    #[test]
    fn test_codec_session_round_trip() {
        let codec = codec();
        let session = codec
            .encode_session(&SecretString::from("gho_token"))
            .unwrap();
        let token = codec.decode_session(&session).unwrap();
        assert_eq!(token.expose_secret(), "gho_token");
    }

    #[test]
    fn test_codec_default_windows() {
        let codec = codec();
        assert_eq!(codec.ttl(TokenPolicy::State), Duration::minutes(10));
        assert_eq!(codec.ttl(TokenPolicy::Session), Duration::days(365));
    }

    #[test]
    fn test_policy_display() {
        assert_eq!(TokenPolicy::State.to_string(), "state");
        assert_eq!(TokenPolicy::Session.to_string(), "session");
    }
}

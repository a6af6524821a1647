// SPDX-License-Identifier: Apache-2.0

//! Cross-window messaging and the callback page.
//!
//! [`MessageBus`] stands in for `window.postMessage`: every message carries
//! the sender's origin next to an untrusted JSON payload, and receivers check
//! the origin before looking at the payload.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use url::Url;

/// `type` of the completion message posted by the callback page.
pub const CALLBACK_MESSAGE_TYPE: &str = "giscore-oauth-callback";

/// Query parameter carrying the session token.
pub const SESSION_PARAM: &str = "giscore";

/// Query parameter carrying an OAuth error code.
pub const ERROR_PARAM: &str = "giscore_error";

/// Error code the provider uses when the user declines.
pub const ACCESS_DENIED: &str = "access_denied";

const DEFAULT_BUS_CAPACITY: usize = 16;

/// A message as delivered to a window: sender origin plus raw payload.
#[derive(Debug, Clone)]
pub struct WindowMessage {
    /// `event.origin`
    pub origin: String,
    /// `event.data`
    pub data: serde_json::Value,
}

/// Payload of the completion message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackMessage {
    /// Always [`CALLBACK_MESSAGE_TYPE`].
    #[serde(rename = "type")]
    pub kind: String,
    /// Session token, when delivered by query parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// OAuth error code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CallbackMessage {
    /// Reads a completion message out of an untrusted payload.
    ///
    /// Returns `None` for anything that is not ours.
    #[must_use]
    pub fn from_payload(data: &serde_json::Value) -> Option<Self> {
        let message: Self = serde_json::from_value(data.clone()).ok()?;
        (message.kind == CALLBACK_MESSAGE_TYPE).then_some(message)
    }

    /// Reads `giscore` / `giscore_error` from a callback page URL.
    #[must_use]
    pub fn from_callback_url(url: &Url) -> Self {
        let mut message = Self {
            kind: CALLBACK_MESSAGE_TYPE.to_string(),
            session: None,
            error: None,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                SESSION_PARAM => message.session = Some(value.into_owned()),
                ERROR_PARAM => message.error = Some(value.into_owned()),
                _ => {}
            }
        }
        message
    }
}

/// In-process `postMessage` channel to one window.
#[derive(Debug, Clone)]
pub struct MessageBus {
    tx: broadcast::Sender<WindowMessage>,
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl MessageBus {
    /// Creates a bus buffering up to `capacity` undelivered messages.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Posts `data` as sent from `origin`. Dropped if nobody listens.
    pub fn post(&self, origin: impl Into<String>, data: serde_json::Value) {
        let message = WindowMessage {
            origin: origin.into(),
            data,
        };
        if self.tx.send(message).is_err() {
            debug!("Window message posted with no listener");
        }
    }

    /// Adds a listener.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<WindowMessage> {
        self.tx.subscribe()
    }
}

/// Durable client-side session storage for the non-popup path.
pub trait SessionStore: Send + Sync {
    /// Stores `session`, replacing any previous one.
    fn save(&self, session: &str);

    /// Returns the stored session.
    fn load(&self) -> Option<String>;

    /// Forgets the stored session (logout).
    fn clear(&self);
}

/// [`SessionStore`] held in memory.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: Mutex<Option<String>>,
}

impl MemorySessionStore {
    /// The slot holds a plain `Option`, so a panic elsewhere cannot leave it
    /// half-written and a poisoned lock is safe to reuse.
    fn slot(&self) -> MutexGuard<'_, Option<String>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for MemorySessionStore {
    fn save(&self, session: &str) {
        *self.slot() = Some(session.to_string());
    }

    fn load(&self) -> Option<String> {
        self.slot().clone()
    }

    fn clear(&self) {
        *self.slot() = None;
    }
}

/// What the callback page did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    /// Relayed to the opener; the popup should now close itself.
    PostedToOpener,
    /// No opener: the session was persisted locally.
    Persisted,
    /// No opener and no session: carries the error code.
    Failed(String),
}

/// Runs the callback page: relays the result to `opener` when there is
/// one, otherwise persists the session in `store`.
pub fn complete_callback(
    page_url: &Url,
    opener: Option<&MessageBus>,
    store: &dyn SessionStore,
) -> CallbackOutcome {
    let message = CallbackMessage::from_callback_url(page_url);

    if let Some(opener) = opener {
        let origin = page_url.origin().ascii_serialization();
        match serde_json::to_value(&message) {
            Ok(data) => {
                opener.post(origin, data);
                return CallbackOutcome::PostedToOpener;
            }
            Err(e) => {
                warn!(error = %e, "Failed to serialize callback message");
                return CallbackOutcome::Failed(e.to_string());
            }
        }
    }

    match (message.session, message.error) {
        (_, Some(error)) => CallbackOutcome::Failed(error),
        (Some(session), None) => {
            store.save(&session);
            CallbackOutcome::Persisted
        }
        (None, None) => CallbackOutcome::Failed("missing session".to_string()),
    }
}

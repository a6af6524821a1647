// SPDX-License-Identifier: Apache-2.0

//! Cross-window OAuth login handshake.
//!
//! ```text
//! Idle -> PopupOpening -> AwaitingCallback -> Resolved | Denied | Failed | PopupClosedByUser
//!              \-> Redirected (popup blocked)
//! ```
//!
//! The opener opens the backend's `/oauth/authorize` in a popup, then waits
//! for the callback page to post a completion message back. A poll on the
//! popup's `closed` flag ends the wait when the user closes it first; there
//! is no other timeout.

pub mod exchange;
pub mod message;
pub mod window;

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use exchange::{HttpSessionExchange, SessionExchange};
pub use message::{
    ACCESS_DENIED, CALLBACK_MESSAGE_TYPE, CallbackMessage, CallbackOutcome, MemorySessionStore,
    MessageBus, SessionStore, WindowMessage, complete_callback,
};
pub use window::{
    BrowserWindow, POPUP_NAME, PopupOptions, PopupPosition, PopupWindow, WindowGeometry,
    authorize_url, popup_features, popup_position,
};

/// How often the popup's `closed` flag is checked.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Where a login currently stands.
#[derive(Debug, Clone)]
pub enum HandshakeState {
    /// Not started.
    Idle,
    /// Popup requested from the browser.
    PopupOpening,
    /// Popup open, waiting for the callback message.
    AwaitingCallback,
    /// Login finished with a bearer token.
    Resolved(SecretString),
    /// The user declined on the provider's consent screen.
    Denied,
    /// The login failed; carries the reason.
    Failed(String),
    /// The popup closed before reporting back.
    PopupClosedByUser,
    /// The popup was blocked and the page navigated to this URL instead.
    Redirected(Url),
}

impl HandshakeState {
    /// Whether the handshake is over.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            HandshakeState::Idle | HandshakeState::PopupOpening | HandshakeState::AwaitingCallback
        )
    }
}

/// One login attempt, driven from the opener window.
pub struct LoginHandshake {
    window: Arc<dyn BrowserWindow>,
    exchange: Arc<dyn SessionExchange>,
    options: PopupOptions,
    poll_interval: Duration,
    popup: Option<Box<dyn PopupWindow>>,
    state: HandshakeState,
}

impl std::fmt::Debug for LoginHandshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginHandshake")
            .field("options", &self.options)
            .field("poll_interval", &self.poll_interval)
            .field("popup_open", &self.popup.is_some())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl LoginHandshake {
    /// Creates an idle handshake.
    #[must_use]
    pub fn new(
        window: Arc<dyn BrowserWindow>,
        exchange: Arc<dyn SessionExchange>,
        options: PopupOptions,
    ) -> Self {
        Self {
            window,
            exchange,
            options,
            poll_interval: DEFAULT_POLL_INTERVAL,
            popup: None,
            state: HandshakeState::Idle,
        }
    }

    /// Overrides the popup poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Consumes the handshake, returning its state.
    #[must_use]
    pub fn into_state(self) -> HandshakeState {
        self.state
    }

    fn finish(&mut self, state: HandshakeState) {
        if let Some(popup) = self.popup.take()
            && !popup.is_closed()
        {
            popup.close();
        }
        self.state = state;
    }

    /// Opens the login popup, or navigates away when it is blocked.
    ///
    /// Only acts from [`HandshakeState::Idle`].
    #[instrument(skip(self))]
    pub fn start(&mut self) -> &HandshakeState {
        if !matches!(self.state, HandshakeState::Idle) {
            warn!(state = ?self.state, "Login already started");
            return &self.state;
        }
        self.state = HandshakeState::PopupOpening;

        let origin = self.window.origin();
        let popup_url = match authorize_url(
            &self.options.server_url,
            &self.options.callback_uri(&origin),
        ) {
            Ok(url) => url,
            Err(e) => {
                self.finish(HandshakeState::Failed(e.to_string()));
                return &self.state;
            }
        };

        let position = popup_position(
            self.window.geometry(),
            self.options.width,
            self.options.height,
        );
        let features = popup_features(self.options.width, self.options.height, position);

        if let Some(popup) = self.window.open_popup(&popup_url, POPUP_NAME, &features) {
            debug!(url = %popup_url, "Login popup opened");
            self.popup = Some(popup);
            self.state = HandshakeState::AwaitingCallback;
            return &self.state;
        }

        // Blocked: the whole page goes through the flow and comes back here.
        match authorize_url(&self.options.server_url, &self.window.href()) {
            Ok(url) => {
                info!(url = %url, "Login popup blocked, redirecting");
                self.window.navigate(&url);
                self.finish(HandshakeState::Redirected(url));
            }
            Err(e) => self.finish(HandshakeState::Failed(e.to_string())),
        }
        &self.state
    }

    /// Feeds one window message to the handshake.
    ///
    /// Messages from another origin, messages of another type, and messages
    /// arriving outside [`HandshakeState::AwaitingCallback`] are ignored.
    /// Returns whether the message was consumed.
    pub async fn handle_message(&mut self, message: &WindowMessage) -> bool {
        if !matches!(self.state, HandshakeState::AwaitingCallback) {
            return false;
        }
        if message.origin != self.window.origin() {
            debug!(origin = %message.origin, "Ignoring message from foreign origin");
            return false;
        }
        let Some(callback) = CallbackMessage::from_payload(&message.data) else {
            return false;
        };

        if let Some(popup) = self.popup.take() {
            popup.close();
        }

        let state = match callback.error {
            Some(error) if error == ACCESS_DENIED => {
                info!("Login cancelled by user");
                HandshakeState::Denied
            }
            Some(error) => {
                warn!(error = %error, "Login failed at provider");
                HandshakeState::Failed(error)
            }
            None => match self.exchange.exchange(callback.session.as_deref()).await {
                Ok(token) => {
                    info!("Login completed");
                    HandshakeState::Resolved(token)
                }
                Err(e) => {
                    warn!(error = %e, "Session exchange failed");
                    HandshakeState::Failed(e.to_string())
                }
            },
        };
        self.finish(state);
        true
    }

    /// Checks the popup's `closed` flag. Returns whether the handshake ended.
    pub fn poll_popup(&mut self) -> bool {
        if !matches!(self.state, HandshakeState::AwaitingCallback) {
            return self.state.is_terminal();
        }
        let closed = self.popup.as_ref().is_none_or(|popup| popup.is_closed());
        if closed {
            info!("Login popup closed before completing");
            self.finish(HandshakeState::PopupClosedByUser);
        }
        closed
    }

    /// Runs the whole handshake, listening on `bus` for the callback.
    pub async fn run(mut self, bus: &MessageBus) -> HandshakeState {
        // Subscribe first so a fast callback cannot be missed.
        let mut rx = bus.subscribe();

        if self.start().is_terminal() {
            return self.state;
        }

        let mut poll = tokio::time::interval(self.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll.tick().await;

        while !self.state.is_terminal() {
            tokio::select! {
                biased;
                received = rx.recv() => match received {
                    Ok(message) => {
                        self.handle_message(&message).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Window message listener lagged");
                    }
                    Err(RecvError::Closed) => {
                        self.finish(HandshakeState::Failed("message channel closed".to_string()));
                    }
                },
                _ = poll.tick() => {
                    // The popup closes itself right after posting, so drain
                    // pending messages before trusting the closed flag.
                    loop {
                        match rx.try_recv() {
                            Ok(message) => {
                                self.handle_message(&message).await;
                            }
                            Err(TryRecvError::Lagged(_)) => {}
                            Err(_) => break,
                        }
                        if self.state.is_terminal() {
                            break;
                        }
                    }
                    self.poll_popup();
                }
            }
        }

        self.state
    }
}

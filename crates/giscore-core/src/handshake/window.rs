// SPDX-License-Identifier: Apache-2.0

//! Browser window seams and popup geometry.

use bon::Builder;
use url::Url;

use crate::Result;
use crate::error::GiscoreError;

/// Default popup width in CSS pixels.
pub const DEFAULT_POPUP_WIDTH: i32 = 500;

/// Default popup height in CSS pixels.
pub const DEFAULT_POPUP_HEIGHT: i32 = 700;

/// Target name of the login popup, so repeated logins reuse one window.
pub const POPUP_NAME: &str = "giscore-login";

/// Path of the same-origin callback page.
pub const CALLBACK_PATH: &str = "/oauth/callback";

/// Screen placement of the window that starts the login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowGeometry {
    /// `window.screenX`
    pub screen_x: i32,
    /// `window.screenY`
    pub screen_y: i32,
    /// `window.outerWidth`
    pub outer_width: i32,
    /// `window.outerHeight`
    pub outer_height: i32,
}

/// Top-left corner of the popup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopupPosition {
    /// Distance from the left screen edge.
    pub left: i32,
    /// Distance from the top screen edge.
    pub top: i32,
}

/// Centers a `width` x `height` popup over `geometry`.
#[must_use]
pub fn popup_position(geometry: WindowGeometry, width: i32, height: i32) -> PopupPosition {
    PopupPosition {
        left: geometry.screen_x + (geometry.outer_width - width) / 2,
        top: geometry.screen_y + (geometry.outer_height - height) / 2,
    }
}

/// `window.open` feature string.
#[must_use]
pub fn popup_features(width: i32, height: i32, position: PopupPosition) -> String {
    format!(
        "width={width},height={height},left={},top={},popup=yes",
        position.left, position.top
    )
}

/// The window that starts the login.
pub trait BrowserWindow: Send + Sync {
    /// `window.location.origin`
    fn origin(&self) -> String;

    /// `window.location.href`
    fn href(&self) -> String;

    /// Current screen placement.
    fn geometry(&self) -> WindowGeometry;

    /// `window.open`; `None` when a popup blocker refused it.
    fn open_popup(&self, url: &Url, name: &str, features: &str) -> Option<Box<dyn PopupWindow>>;

    /// Top-level navigation (`window.location.href = url`).
    fn navigate(&self, url: &Url);
}

/// Handle to an opened popup.
pub trait PopupWindow: Send + Sync {
    /// `popup.closed`
    fn is_closed(&self) -> bool;

    /// `popup.close()`
    fn close(&self);
}

/// Login popup settings.
#[derive(Debug, Clone, Builder)]
pub struct PopupOptions {
    /// Base URL of the Giscore backend.
    #[builder(into)]
    pub server_url: String,
    /// Callback page the backend returns to. Defaults to
    /// `{origin}/oauth/callback`.
    #[builder(into)]
    pub redirect_uri: Option<String>,
    /// Popup width.
    #[builder(default = DEFAULT_POPUP_WIDTH)]
    pub width: i32,
    /// Popup height.
    #[builder(default = DEFAULT_POPUP_HEIGHT)]
    pub height: i32,
}

impl PopupOptions {
    /// Resolves the callback page for a window at `origin`.
    #[must_use]
    pub fn callback_uri(&self, origin: &str) -> String {
        self.redirect_uri
            .clone()
            .unwrap_or_else(|| format!("{}{CALLBACK_PATH}", origin.trim_end_matches('/')))
    }
}

/// `{server}/oauth/authorize?redirect_uri=...`
pub fn authorize_url(server_url: &str, redirect_uri: &str) -> Result<Url> {
    let mut url = Url::parse(&format!(
        "{}/oauth/authorize",
        server_url.trim_end_matches('/')
    ))
    .map_err(|e| GiscoreError::Config {
        message: format!("invalid server URL '{server_url}': {e}"),
    })?;
    url.query_pairs_mut()
        .append_pair("redirect_uri", redirect_uri);
    Ok(url)
}

// SPDX-License-Identifier: Apache-2.0

//! Session cookie helpers.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

/// Name of the `HttpOnly` cookie carrying the session token.
pub const SESSION_COOKIE: &str = "giscore_session";

/// Builds the session cookie.
///
/// Cross-site embeds need `SameSite=None`, which browsers only accept with
/// `Secure`; without `secure` the cookie falls back to `Lax`.
pub fn session_cookie(session: &str, ttl: chrono::Duration, secure: bool) -> Cookie<'static> {
    let same_site = if secure { SameSite::None } else { SameSite::Lax };
    Cookie::build((SESSION_COOKIE, session.to_string()))
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .path("/")
        .max_age(Duration::seconds(ttl.num_seconds()))
        .build()
}

/// Removal cookie for the session.
pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Reads the session token from the jar.
pub fn session_from(jar: &CookieJar) -> Option<String> {
    jar.get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|value| !value.is_empty())
}

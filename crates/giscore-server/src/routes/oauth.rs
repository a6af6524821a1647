// SPDX-License-Identifier: Apache-2.0

//! OAuth login routes: authorize, callback, session token and logout.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::response::Redirect;
use axum_extra::extract::CookieJar;
use giscore_core::handshake::message::{ERROR_PARAM, SESSION_PARAM};
use giscore_core::{GiscoreError, SessionDelivery, TokenPolicy};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::cookies::{clear_session_cookie, session_cookie, session_from};
use crate::error::ApiError;
use crate::response::{ApiResponse, ok};
use crate::state::AppState;

/// Query of `GET /oauth/authorize`.
#[derive(Debug, Deserialize)]
pub struct AuthorizeParams {
    redirect_uri: Option<String>,
}

/// Query of `GET /oauth/callback`.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Body of `POST /oauth/token`.
#[derive(Debug, Default, Deserialize)]
pub struct TokenBody {
    session: Option<String>,
}

/// Payload of a successful session exchange.
#[derive(Debug, Serialize)]
pub struct TokenData {
    token: String,
}

/// Starts the login: seals the return URL into `state` and sends the
/// browser to the provider.
pub async fn authorize(
    State(state): State<AppState>,
    Query(params): Query<AuthorizeParams>,
) -> Result<Redirect, ApiError> {
    let redirect_uri = params
        .redirect_uri
        .ok_or_else(|| ApiError::BadRequest("redirect_uri is required".to_string()))?;

    let target = Url::parse(&redirect_uri)
        .map_err(|_| ApiError::BadRequest("redirect_uri must be an absolute URL".to_string()))?;

    if !state.allows_origin(&target) {
        warn!(origin = %target.origin().ascii_serialization(), "Rejected redirect_uri origin");
        return Err(ApiError::BadRequest(
            "redirect_uri origin is not allowed".to_string(),
        ));
    }

    let sealed = state.codec.encode_state(target.as_str())?;
    let url = state.provider.authorize_url(&sealed)?;

    debug!(origin = %target.origin().ascii_serialization(), "Redirecting to OAuth provider");
    Ok(Redirect::to(url.as_str()))
}

/// Provider redirect target: validates `state`, redeems the code and hands
/// the session back to the return URL.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect), ApiError> {
    let sealed = params.state.ok_or(GiscoreError::StateMismatch)?;
    let return_url = state.codec.decode_state(&sealed)?;
    let mut url = Url::parse(&return_url).map_err(|_| GiscoreError::StateMismatch)?;

    if let Some(error) = params.error {
        info!(error = %error, "OAuth provider returned an error");
        set_query_param(&mut url, ERROR_PARAM, &error);
        return Ok((jar, Redirect::to(url.as_str())));
    }

    let code = params
        .code
        .filter(|code| !code.is_empty())
        .ok_or_else(|| ApiError::BadRequest("Authorization code required".to_string()))?;

    let access_token = state.provider.exchange_code(&code).await?;
    let session = state.codec.encode_session(&access_token)?;

    let jar = match state.delivery {
        SessionDelivery::Query => {
            set_query_param(&mut url, SESSION_PARAM, &session);
            jar
        }
        SessionDelivery::Cookie => jar.add(session_cookie(
            &session,
            state.codec.ttl(TokenPolicy::Session),
            state.secure_cookies,
        )),
    };

    info!(delivery = ?state.delivery, "OAuth login completed");
    Ok((jar, Redirect::to(url.as_str())))
}

/// `GET /oauth/token`: opens the session held in the cookie.
pub async fn token_from_cookie(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<ApiResponse<TokenData>>, ApiError> {
    let session = session_from(&jar).ok_or_else(no_session)?;
    open_session(&state, &session)
}

/// `POST /oauth/token`: opens the session from the JSON body, falling back
/// to the cookie.
pub async fn token_from_body(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Bytes,
) -> Result<Json<ApiResponse<TokenData>>, ApiError> {
    let body: TokenBody = if body.is_empty() {
        TokenBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("Invalid request body: {e}")))?
    };

    let session = body
        .session
        .filter(|session| !session.is_empty())
        .or_else(|| session_from(&jar))
        .ok_or_else(no_session)?;
    open_session(&state, &session)
}

/// `POST /oauth/logout`: drops the session cookie.
pub async fn logout(jar: CookieJar) -> (CookieJar, Json<ApiResponse<()>>) {
    (jar.remove(clear_session_cookie()), ok(()))
}

fn open_session(state: &AppState, session: &str) -> Result<Json<ApiResponse<TokenData>>, ApiError> {
    let token = state.codec.decode_session(session)?;
    Ok(ok(TokenData {
        token: token.expose_secret().to_string(),
    }))
}

fn no_session() -> ApiError {
    GiscoreError::MissingSession.into()
}

/// Sets `key` on the query, replacing earlier values.
fn set_query_param(url: &mut Url, key: &str, value: &str) {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .into_owned()
        .filter(|(k, _)| k != key)
        .collect();

    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair(key, value);
}

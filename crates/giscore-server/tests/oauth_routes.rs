// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the HTTP routes, driven through the router.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use chrono::{Duration, Utc};
use giscore_core::crypto::token::encode_token_at;
use giscore_core::handshake::{HttpSessionExchange, SessionExchange};
use giscore_core::{
    AppApi, AppCredentials, AppIdentity, GiscoreError, InstallationToken, OAuthExchange, RepoKey,
    RepositoryApi, RepositoryInfo, SessionDelivery, TokenCache, TokenCodec,
};
use giscore_server::{AppState, app};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tower::ServiceExt;
use url::Url;
use url::form_urlencoded;

const PASSWORD: &str = "route-test-password";
const PKCS1_PEM: &str = include_str!("../../giscore-core/tests/fixtures/app_key_pkcs1.pem");
const SITE: &str = "https://blog.example";
const RETURN_URL: &str = "https://blog.example/posts/1";

#[derive(Default)]
struct MockProvider {
    refuse: bool,
    codes: Mutex<Vec<String>>,
}

impl MockProvider {
    fn codes(&self) -> Vec<String> {
        self.codes.lock().unwrap().clone()
    }
}

#[async_trait]
impl OAuthExchange for MockProvider {
    fn authorize_url(&self, state: &str) -> giscore_core::Result<Url> {
        let mut url = Url::parse("https://provider.test/login/oauth/authorize").unwrap();
        url.query_pairs_mut().append_pair("state", state);
        Ok(url)
    }

    async fn exchange_code(&self, code: &str) -> giscore_core::Result<SecretString> {
        self.codes.lock().unwrap().push(code.to_string());
        if self.refuse {
            return Err(GiscoreError::OAuth {
                message: "The code passed is incorrect or expired.".to_string(),
            });
        }
        Ok(SecretString::from("gho_user"))
    }
}

#[derive(Default)]
struct MockAppApi {
    not_installed: AtomicBool,
    issued: AtomicUsize,
}

#[async_trait]
impl AppApi for MockAppApi {
    async fn repository_installation_id(
        &self,
        _jwt: &SecretString,
        repo: &RepoKey,
    ) -> giscore_core::Result<u64> {
        if self.not_installed.load(Ordering::SeqCst) {
            return Err(GiscoreError::InstallationNotFound {
                owner: repo.owner().to_string(),
                repo: repo.repo().to_string(),
            });
        }
        Ok(7)
    }

    async fn create_installation_token(
        &self,
        _jwt: &SecretString,
        installation_id: u64,
    ) -> giscore_core::Result<InstallationToken> {
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(InstallationToken {
            token: SecretString::from(format!("ghs_secret_{installation_id}")),
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

/// Records which token each repository read was made with.
#[derive(Default)]
struct MockRepositories {
    tokens: Mutex<Vec<String>>,
}

impl MockRepositories {
    fn tokens(&self) -> Vec<String> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepositoryApi for MockRepositories {
    async fn repository(
        &self,
        token: &SecretString,
        repo: &RepoKey,
    ) -> giscore_core::Result<RepositoryInfo> {
        self.tokens
            .lock()
            .unwrap()
            .push(token.expose_secret().to_string());
        if repo.repo() == "gone" {
            return Err(GiscoreError::RepositoryNotFound {
                input: repo.to_string(),
            });
        }
        Ok(RepositoryInfo {
            full_name: repo.to_string(),
            node_id: Some("R_kgDOblog".to_string()),
            private: false,
        })
    }
}

struct Harness {
    provider: Arc<MockProvider>,
    api: Arc<MockAppApi>,
    repositories: Arc<MockRepositories>,
    state: AppState,
}

impl Harness {
    fn new() -> Self {
        Self::with_provider(MockProvider::default())
    }

    fn with_provider(provider: MockProvider) -> Self {
        let provider = Arc::new(provider);
        let api = Arc::new(MockAppApi::default());
        let repositories = Arc::new(MockRepositories::default());
        let identity = AppIdentity::new("12345", &SecretString::from(PKCS1_PEM)).unwrap();
        let credentials = AppCredentials::new(identity, api.clone(), TokenCache::default());

        let state = AppState::new(codec(), provider.clone(), credentials)
            .with_repositories(repositories.clone())
            .with_allowed_origins(vec![SITE.to_string()]);

        Self {
            provider,
            api,
            repositories,
            state,
        }
    }

    fn cookie_delivery(mut self) -> Self {
        self.state = self.state.with_delivery(SessionDelivery::Cookie);
        self
    }

    fn router(&self) -> Router {
        app(self.state.clone())
    }

    /// Serves the app on an ephemeral port and returns its base URL.
    async fn serve(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = self.router();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    async fn get(&self, uri: &str) -> Response<Body> {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        self.router().oneshot(request).await.unwrap()
    }
}

fn codec() -> TokenCodec {
    TokenCodec::new(SecretString::from(PASSWORD))
}

fn query(pairs: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn location(response: &Response<Body>) -> Url {
    let value = response.headers()[header::LOCATION].to_str().unwrap();
    Url::parse(value).unwrap()
}

fn set_cookie(response: &Response<Body>) -> String {
    response.headers()[header::SET_COOKIE]
        .to_str()
        .unwrap()
        .to_string()
}

fn query_value(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = Harness::new().get("/health").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"success": true, "msg": "ok", "data": null})
    );
}

#[tokio::test]
async fn test_authorize_redirects_with_sealed_state() {
    let harness = Harness::new();

    let response = harness
        .get(&format!(
            "/oauth/authorize?{}",
            query(&[("redirect_uri", RETURN_URL)])
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let target = location(&response);
    assert_eq!(target.host_str(), Some("provider.test"));
    let state = query_value(&target, "state").unwrap();
    assert_eq!(codec().decode_state(&state).unwrap(), RETURN_URL);
}

#[tokio::test]
async fn test_authorize_rejects_foreign_redirect() {
    let response = Harness::new()
        .get(&format!(
            "/oauth/authorize?{}",
            query(&[("redirect_uri", "https://evil.example/steal")])
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["msg"], json!("redirect_uri origin is not allowed"));
}

#[tokio::test]
async fn test_authorize_requires_absolute_redirect() {
    let harness = Harness::new();

    let relative = harness
        .get(&format!(
            "/oauth/authorize?{}",
            query(&[("redirect_uri", "/posts/1")])
        ))
        .await;
    let missing = harness.get("/oauth/authorize").await;

    assert_eq!(relative.status(), StatusCode::BAD_REQUEST);
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_access_denied_skips_exchange() {
    let harness = Harness::new();
    let state = codec().encode_state(RETURN_URL).unwrap();

    let response = harness
        .get(&format!(
            "/oauth/callback?{}",
            query(&[("error", "access_denied"), ("state", state.as_str())])
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&response).as_str(),
        "https://blog.example/posts/1?giscore_error=access_denied"
    );
    assert!(harness.provider.codes().is_empty());
}

#[tokio::test]
async fn test_callback_rejects_bad_state() {
    let harness = Harness::new();

    let response = harness
        .get(&format!(
            "/oauth/callback?{}",
            query(&[("code", "abc"), ("state", "forged")])
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["msg"], json!("Invalid state value"));
    assert!(harness.provider.codes().is_empty());
}

#[tokio::test]
async fn test_callback_rejects_expired_state() {
    let harness = Harness::new();
    let issued = Utc::now() - Duration::minutes(11);
    let state = encode_token_at(RETURN_URL, PASSWORD, Duration::minutes(10), issued).unwrap();

    let response = harness
        .get(&format!(
            "/oauth/callback?{}",
            query(&[("code", "abc"), ("state", state.as_str())])
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(harness.provider.codes().is_empty());
}

#[tokio::test]
async fn test_callback_requires_code() {
    let harness = Harness::new();
    let state = codec().encode_state(RETURN_URL).unwrap();

    let response = harness
        .get(&format!("/oauth/callback?{}", query(&[("state", state.as_str())])))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["msg"],
        json!("Authorization code required")
    );
}

#[tokio::test]
async fn test_callback_query_delivery() {
    let harness = Harness::new();
    let state = codec().encode_state(RETURN_URL).unwrap();

    let response = harness
        .get(&format!(
            "/oauth/callback?{}",
            query(&[("code", "abc"), ("state", state.as_str())])
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let target = location(&response);
    assert_eq!(target.path(), "/posts/1");
    let session = query_value(&target, "giscore").unwrap();
    assert_eq!(
        codec().decode_session(&session).unwrap().expose_secret(),
        "gho_user"
    );
    assert_eq!(harness.provider.codes(), vec!["abc".to_string()]);
}

#[tokio::test]
async fn test_callback_cookie_delivery() {
    let harness = Harness::new().cookie_delivery();
    let state = codec().encode_state(RETURN_URL).unwrap();

    let response = harness
        .get(&format!(
            "/oauth/callback?{}",
            query(&[("code", "abc"), ("state", state.as_str())])
        ))
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response).as_str(), RETURN_URL);

    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("giscore_session="));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Secure"));
    assert!(cookie.contains("SameSite=None"));
    assert!(cookie.contains("Path=/"));
    assert!(cookie.contains("Max-Age=31536000"));
}

#[tokio::test]
async fn test_callback_provider_refusal() {
    let harness = Harness::with_provider(MockProvider {
        refuse: true,
        ..MockProvider::default()
    });
    let state = codec().encode_state(RETURN_URL).unwrap();

    let response = harness
        .get(&format!(
            "/oauth/callback?{}",
            query(&[("code", "stale"), ("state", state.as_str())])
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert!(body["msg"].as_str().unwrap().contains("incorrect or expired"));
}

#[tokio::test]
async fn test_token_from_body() {
    let harness = Harness::new();
    let session = codec()
        .encode_session(&SecretString::from("gho_user"))
        .unwrap();

    let response = harness
        .router()
        .oneshot(post_json("/oauth/token", &json!({ "session": session })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await,
        json!({"success": true, "msg": "ok", "data": {"token": "gho_user"}})
    );
}

#[tokio::test]
async fn test_token_from_cookie() {
    let harness = Harness::new();
    let session = codec()
        .encode_session(&SecretString::from("gho_user"))
        .unwrap();

    let get = Request::builder()
        .uri("/oauth/token")
        .header(header::COOKIE, format!("giscore_session={session}"))
        .body(Body::empty())
        .unwrap();
    let post = Request::builder()
        .method("POST")
        .uri("/oauth/token")
        .header(header::COOKIE, format!("giscore_session={session}"))
        .body(Body::empty())
        .unwrap();

    let get = harness.router().oneshot(get).await.unwrap();
    let post = harness.router().oneshot(post).await.unwrap();

    assert_eq!(get.status(), StatusCode::OK);
    assert_eq!(json_body(get).await["data"]["token"], json!("gho_user"));
    assert_eq!(post.status(), StatusCode::OK);
    assert_eq!(json_body(post).await["data"]["token"], json!("gho_user"));
}

#[tokio::test]
async fn test_token_without_session_is_unauthorized() {
    let harness = Harness::new();

    let get = harness.get("/oauth/token").await;
    let post = harness
        .router()
        .oneshot(post_json("/oauth/token", &json!({})))
        .await
        .unwrap();

    assert_eq!(get.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        json_body(get).await,
        json!({"success": false, "msg": "No session"})
    );
    assert_eq!(post.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_session_is_unauthorized() {
    let harness = Harness::new();
    let issued = Utc::now() - Duration::days(2);
    let session = encode_token_at("gho_user", PASSWORD, Duration::days(1), issued).unwrap();

    let response = harness
        .router()
        .oneshot(post_json("/oauth/token", &json!({ "session": session })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(response).await["msg"], json!("Token expired"));
}

#[tokio::test]
async fn test_garbage_session_is_bad_request() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(post_json("/oauth/token", &json!({ "session": "not-a-session" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["msg"], json!("Invalid token"));
}

#[tokio::test]
async fn test_logout_clears_cookie() {
    let harness = Harness::new();

    let request = Request::builder()
        .method("POST")
        .uri("/oauth/logout")
        .header(header::COOKIE, "giscore_session=sealed")
        .body(Body::empty())
        .unwrap();
    let response = harness.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = set_cookie(&response);
    assert!(cookie.starts_with("giscore_session="));
    assert!(cookie.contains("Max-Age=0"));
    assert_eq!(
        json_body(response).await,
        json!({"success": true, "msg": "ok", "data": null})
    );
}

#[tokio::test]
async fn test_installation_verified_without_leaking_token() {
    let harness = Harness::new();

    let response = harness.get("/api/installation?repo=Octo/Blog").await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"], json!({"repo": "octo/blog", "installed": true}));
    assert!(!body.to_string().contains("ghs_secret"));
    assert_eq!(harness.api.issued.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_installation_not_found() {
    let harness = Harness::new();
    harness.api.not_installed.store(true, Ordering::SeqCst);

    let response = harness.get("/api/installation?repo=octo/blog").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert!(body["msg"].as_str().unwrap().contains("install it"));
}

#[tokio::test]
async fn test_installation_invalid_repo() {
    let harness = Harness::new();

    let malformed = harness.get("/api/installation?repo=octo").await;
    let missing = harness.get("/api/installation").await;

    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_repository_read_as_app_when_anonymous() {
    let harness = Harness::new();

    let response = harness.get("/api/repository?repo=octo/blog").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["data"],
        json!({
            "full_name": "octo/blog",
            "node_id": "R_kgDOblog",
            "private": false,
            "source": "app",
        })
    );
    assert_eq!(harness.repositories.tokens(), vec!["ghs_secret_7".to_string()]);
}

#[tokio::test]
async fn test_repository_read_as_user_with_bearer() {
    let harness = Harness::new();
    let request = Request::builder()
        .uri("/api/repository?repo=octo/blog")
        .header(header::AUTHORIZATION, "Bearer gho_reader")
        .body(Body::empty())
        .unwrap();

    let response = harness.router().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["data"]["source"], json!("user"));
    assert_eq!(harness.repositories.tokens(), vec!["gho_reader".to_string()]);
    assert_eq!(harness.api.issued.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_repository_read_errors() {
    let harness = Harness::new();

    let missing = harness.get("/api/repository").await;
    let gone = harness.get("/api/repository?repo=octo/gone").await;

    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_repository_read_not_installed_without_bearer() {
    let harness = Harness::new();
    harness.api.not_installed.store(true, Ordering::SeqCst);

    let response = harness.get("/api/repository?repo=octo/blog").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(harness.repositories.tokens().is_empty());
}

#[tokio::test]
async fn test_session_exchange_client_round_trip() {
    let harness = Harness::new();
    let exchange = HttpSessionExchange::new(&harness.serve().await).unwrap();
    let session = codec()
        .encode_session(&SecretString::from("gho_user"))
        .unwrap();

    let token = exchange.exchange(Some(&session)).await.unwrap();

    assert_eq!(token.expose_secret(), "gho_user");
}

#[tokio::test]
async fn test_session_exchange_client_reports_missing_session() {
    let harness = Harness::new();
    let exchange = HttpSessionExchange::new(&harness.serve().await).unwrap();

    let err = exchange.exchange(None).await.unwrap_err();

    assert!(matches!(err, GiscoreError::MissingSession), "got {err:?}");
}

#[tokio::test]
async fn test_session_exchange_client_reports_expiry() {
    let harness = Harness::new();
    let exchange = HttpSessionExchange::new(&harness.serve().await).unwrap();
    let issued = Utc::now() - Duration::days(2);
    let session = encode_token_at("gho_user", PASSWORD, Duration::days(1), issued).unwrap();

    let err = exchange.exchange(Some(&session)).await.unwrap_err();

    assert!(matches!(err, GiscoreError::Expired), "got {err:?}");
}

#[tokio::test]
async fn test_cors_allows_configured_origin_only() {
    let harness = Harness::new();
    let preflight = |origin: &str| {
        Request::builder()
            .method("OPTIONS")
            .uri("/oauth/token")
            .header(header::ORIGIN, origin)
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap()
    };

    let allowed = harness.router().oneshot(preflight(SITE)).await.unwrap();
    let foreign = harness
        .router()
        .oneshot(preflight("https://evil.example"))
        .await
        .unwrap();

    assert_eq!(
        allowed.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        SITE
    );
    assert_eq!(
        allowed.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS],
        "true"
    );
    assert!(
        foreign
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none()
    );
}

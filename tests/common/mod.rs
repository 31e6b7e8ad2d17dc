//! Shared fixtures for router-level tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use tower::ServiceExt;

use oauth_bridge::{
    bridge::{BridgeCore, create_router},
    config::Config,
    oauth::pkce::s256_challenge,
    provider::{ProviderAdapter, ProviderError, ProviderKey, ProviderRegistry, ProviderTokenRecord},
};

pub const CLIENT_ID: &str = "client-1";
pub const REDIRECT_URI: &str = "http://localhost:9000/cb";
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const ISSUER: &str = "http://bridge.test";

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

pub fn record(access: &str, refresh: Option<&str>, expires_in: u64) -> ProviderTokenRecord {
    ProviderTokenRecord {
        access_token: access.to_string(),
        refresh_token: refresh.map(ToString::to_string),
        expires_at: now() + expires_in,
        scope: "read".to_string(),
    }
}

/// Scripted provider adapter.
pub struct FakeProvider {
    pub key: ProviderKey,
    pub rotates: bool,
    pub scopes: Vec<String>,
    pub exchange_result: Mutex<Result<ProviderTokenRecord, ProviderError>>,
    pub refresh_result: Mutex<Result<ProviderTokenRecord, ProviderError>>,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub seen_verifier: Mutex<Option<String>>,
    pub seen_refresh_token: Mutex<Option<String>>,
}

impl FakeProvider {
    pub fn new(key: ProviderKey, rotates: bool) -> Arc<Self> {
        Arc::new(Self {
            key,
            rotates,
            scopes: vec!["read".to_string()],
            exchange_result: Mutex::new(Ok(record(
                &format!("{key}-at"),
                Some(format!("{key}-rt").as_str()),
                3600,
            ))),
            refresh_result: Mutex::new(Ok(record(
                &format!("{key}-at-2"),
                Some(format!("{key}-rt-2").as_str()),
                3600,
            ))),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            seen_verifier: Mutex::new(None),
            seen_refresh_token: Mutex::new(None),
        })
    }

    pub fn set_exchange(&self, result: Result<ProviderTokenRecord, ProviderError>) {
        *self.exchange_result.lock().unwrap() = result;
    }

    pub fn set_refresh(&self, result: Result<ProviderTokenRecord, ProviderError>) {
        *self.refresh_result.lock().unwrap() = result;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderAdapter for FakeProvider {
    fn key(&self) -> ProviderKey {
        self.key
    }

    fn refresh_token_rotates(&self) -> bool {
        self.rotates
    }

    fn supported_scopes(&self) -> &[String] {
        &self.scopes
    }

    async fn exchange_code(
        &self,
        _code: &str,
        verifier: Option<&str>,
    ) -> Result<ProviderTokenRecord, ProviderError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_verifier.lock().unwrap() = verifier.map(ToString::to_string);
        self.exchange_result.lock().unwrap().clone()
    }

    async fn refresh_access_token(
        &self,
        refresh_token: &str,
    ) -> Result<ProviderTokenRecord, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        *self.seen_refresh_token.lock().unwrap() = Some(refresh_token.to_string());
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        self.refresh_result.lock().unwrap().clone()
    }
}

/// A bridge core plus its router.
pub struct TestBridge {
    pub core: Arc<BridgeCore>,
    pub router: Router,
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.server.issuer = Some(ISSUER.to_string());
    config.tokens.signing_secret = "integration-test-secret".to_string();
    config.connect.ui_url = "http://ui.test/connect".to_string();
    config.scopes = vec!["read".to_string(), "write".to_string()];
    config
}

pub fn bridge_with(providers: &[Arc<FakeProvider>]) -> TestBridge {
    bridge_with_config(test_config(), providers)
}

pub fn bridge_with_config(config: Config, providers: &[Arc<FakeProvider>]) -> TestBridge {
    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(Arc::clone(provider) as Arc<dyn ProviderAdapter>);
    }
    let core = Arc::new(BridgeCore::new(&config, registry).unwrap());
    TestBridge {
        router: create_router(Arc::clone(&core)),
        core,
    }
}

impl TestBridge {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, cookie: Option<&str>) -> Response<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        cookie: Option<&str>,
        body: serde_json::Value,
    ) -> Response<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body.to_string())).unwrap()).await
    }

    pub async fn post_form(&self, uri: &str, params: &[(&str, &str)]) -> Response<Body> {
        let body = serde_urlencoded::to_string(params).unwrap();
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    /// `/authorize` with the standard client; returns the session cookie.
    pub async fn authorize(&self, challenge: Option<&str>, state: Option<&str>) -> String {
        let mut query = vec![
            ("client_id", CLIENT_ID.to_string()),
            ("redirect_uri", REDIRECT_URI.to_string()),
            ("response_type", "code".to_string()),
            ("scope", "read write".to_string()),
        ];
        if let Some(challenge) = challenge {
            query.push(("code_challenge", challenge.to_string()));
            query.push(("code_challenge_method", "S256".to_string()));
        }
        if let Some(state) = state {
            query.push(("state", state.to_string()));
        }
        let uri = format!("/authorize?{}", serde_urlencoded::to_string(&query).unwrap());

        let response = self.get(&uri, None).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        session_cookie(&response)
    }

    /// Connect every listed provider and complete; returns the `/callback` path.
    pub async fn connect_and_complete(&self, cookie: &str, providers: &[ProviderKey]) -> String {
        for key in providers {
            let response = self
                .post_json(
                    &format!("/connections/{key}"),
                    Some(cookie),
                    serde_json::json!({"code": format!("upstream-code-{key}")}),
                )
                .await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let response = self.get("/connect/complete", Some(cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        let location = location(&response);
        location
            .strip_prefix(ISSUER)
            .expect("callback on issuer")
            .to_string()
    }

    /// Relay-flow authorization through to a client code.
    pub async fn client_code(&self, providers: &[ProviderKey]) -> String {
        let cookie = self
            .authorize(Some(&s256_challenge(VERIFIER)), Some("client-state"))
            .await;
        let callback = self.connect_and_complete(&cookie, providers).await;
        let response = self.get(&callback, Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FOUND);
        query_param(&location(&response), "code").expect("code relayed")
    }

    /// Full relay flow through the token endpoint.
    pub async fn token_pair(&self, providers: &[ProviderKey]) -> serde_json::Value {
        let code = self.client_code(providers).await;
        let response = self
            .post_form(
                "/access-token",
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                    ("client_id", CLIENT_ID),
                    ("code_verifier", VERIFIER),
                    ("redirect_uri", REDIRECT_URI),
                ],
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        body_json(response).await
    }
}

pub fn session_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("session cookie")
        .to_string()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

pub fn query_param(url: &str, name: &str) -> Option<String> {
    let base = if url.starts_with('/') {
        format!("{ISSUER}{url}")
    } else {
        url.to_string()
    };
    url::Url::parse(&base)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

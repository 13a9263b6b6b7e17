//! Test helpers for auth-service integration tests.
//!
//! Wires the real services over the in-memory credential and revocation
//! stores, so nothing here needs PostgreSQL or Redis.

#![allow(dead_code)]

use auth_service::{
    build_router,
    config::{
        AuthConfig, AuthorizationConfig, DatabaseConfig, Environment, JwtConfig, PasswordConfig,
        RedisConfig, SecurityConfig,
    },
    models::{PermissionSelector, TokenClaims, TokenPair, TokenType, User, UserSelector},
    services::{metrics, MockCredentialStore, MockRevocationStore, RevocationPolicy},
    utils::Password,
    AppState,
};
use axum::{
    body::Body,
    http::{header, Method, Request, Response},
    Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "integration-test-secret-at-least-32-bytes";
pub const ADMIN: &str = "admin";

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MockCredentialStore>,
    pub revocation_store: Arc<MockRevocationStore>,
    pub router: Router,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::with_policy(RevocationPolicy::Permissive).await
    }

    pub async fn with_policy(policy: RevocationPolicy) -> Self {
        let _ = metrics::init_metrics();

        let store = Arc::new(MockCredentialStore::new());
        let revocation_store = Arc::new(MockRevocationStore::new());
        let state = AppState::new(test_config(policy), store.clone(), revocation_store.clone())
            .expect("Failed to build app state");
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        TestApp {
            state,
            store,
            revocation_store,
            router,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Router is infallible")
    }

    pub async fn register(&self, login: &str, password: &str) -> User {
        self.state
            .sessions
            .register(login, Password::new(password.to_string()))
            .await
            .expect("Failed to register user")
    }

    pub async fn login(&self, login: &str, password: &str) -> TokenPair {
        self.state
            .sessions
            .login(login, Password::new(password.to_string()))
            .await
            .expect("Failed to login")
    }

    pub async fn claims(&self, access_token: &str) -> TokenClaims {
        self.state
            .sessions
            .authenticate(access_token, TokenType::Access)
            .await
            .expect("Token should authenticate")
    }

    /// Grant `name` to `login`, creating the permission when missing.
    pub async fn grant(&self, name: &str, login: &str) {
        let selector = PermissionSelector::name(name);
        let exists = self
            .state
            .permissions
            .get_all()
            .await
            .expect("Failed to list permissions")
            .iter()
            .any(|p| p.name == name);
        if !exists {
            self.state
                .permissions
                .create(name, None)
                .await
                .expect("Failed to create permission");
        }
        self.state
            .permissions
            .assign(&selector, &UserSelector::login(login))
            .await
            .expect("Failed to assign permission");
    }

    /// Register `login` as an administrator and return a fresh session.
    pub async fn admin_session(&self, login: &str) -> TokenPair {
        self.register(login, "secret1").await;
        self.grant(ADMIN, login).await;
        self.login(login, "secret1").await
    }
}

pub fn test_config(policy: RevocationPolicy) -> AuthConfig {
    AuthConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "auth-service-test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: "postgres://unused".to_string(),
            max_connections: 1,
            min_connections: 1,
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
            max_retries: 0,
        },
        jwt: JwtConfig {
            secret_key: TEST_SECRET.to_string(),
            access_expires_seconds: 900,
            refresh_expires_seconds: 86400,
        },
        password: PasswordConfig {
            iterations: 1,
            memory_kib: 1024,
        },
        authorization: AuthorizationConfig {
            privileged_permissions: vec![ADMIN.to_string()],
            revocation_policy: policy,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            cookie_secure: false,
            cookie_domain: None,
        },
    }
}

/// JSON request, optionally with a bearer token.
pub fn json_request(
    method: Method,
    uri: &str,
    bearer: Option<&str>,
    body: serde_json::Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

/// Body-less request carrying the given raw `Cookie` header.
pub fn cookie_request(method: Method, uri: &str, cookies: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::COOKIE, cookies)
        .body(Body::empty())
        .expect("Failed to build request")
}

pub fn bearer_request(method: Method, uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .expect("Failed to build request")
}

pub fn session_cookies(pair: &TokenPair) -> String {
    format!(
        "access_token_cookie={}; refresh_token_cookie={}",
        pair.access_token, pair.refresh_token
    )
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::tracing::request_id_middleware;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AuthConfig, Environment};
use crate::handlers::cookies::CookieSettings;
use crate::services::{
    CredentialStore, JwtService, PermissionService, RevocationEngine, RevocationStore,
    SessionService,
};
use crate::utils::PasswordService;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::metrics::metrics,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::logout_all,
        handlers::auth::change_password,
        handlers::auth::delete_account,
        handlers::auth::refresh,
        handlers::auth::checkout_access,
        handlers::auth::get_payload,
        handlers::permission::create,
        handlers::permission::delete,
        handlers::permission::update,
        handlers::permission::get_all,
        handlers::permission::assign,
        handlers::permission::take_away,
        handlers::permission::get_user_permissions,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::LoginRequest,
            dtos::auth::TokenResponse,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::PayloadResponse,
            dtos::auth::CheckoutResponse,
            dtos::permission::CreatePermissionRequest,
            dtos::permission::PermissionSelectorBody,
            dtos::permission::UserSelectorBody,
            dtos::permission::PermissionChangesBody,
            dtos::permission::UpdatePermissionRequest,
            dtos::permission::GrantRequest,
            dtos::permission::PermissionResponse,
            dtos::permission::PermissionsResponse,
            dtos::permission::UserPermissionsResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Sessions, tokens and accounts"),
        (name = "Permissions", description = "Permission graph management"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub store: Arc<dyn CredentialStore>,
    pub revocation_store: Arc<dyn RevocationStore>,
    pub sessions: SessionService,
    pub permissions: PermissionService,
}

impl AppState {
    /// Wire the core services over the given stores.
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn CredentialStore>,
        revocation_store: Arc<dyn RevocationStore>,
    ) -> Result<Self, anyhow::Error> {
        let jwt = JwtService::new(&config.jwt);
        let passwords = PasswordService::new(&config.password)?;
        let revocation = RevocationEngine::new(
            revocation_store.clone(),
            config.authorization.revocation_policy,
            config.jwt.access_expires_seconds,
            config.jwt.refresh_expires_seconds,
        );

        let sessions = SessionService::new(store.clone(), revocation.clone(), jwt, passwords);
        let permissions = PermissionService::new(
            store.clone(),
            revocation,
            config.authorization.privileged_permissions.clone(),
        );

        Ok(Self {
            config,
            store,
            revocation_store,
            sessions,
            permissions,
        })
    }

    pub fn cookies(&self) -> CookieSettings {
        CookieSettings::from(&self.config.security)
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static(middleware::auth::REFRESH_TOKEN_HEADER),
        ]);

    // Credentials cannot be combined with a wildcard origin.
    if origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();

    layer.allow_origin(origins).allow_credentials(true)
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let auth_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/logout", get(handlers::auth::logout))
        .route("/auth/logout_all", get(handlers::auth::logout_all))
        .route("/auth/change_password", put(handlers::auth::change_password))
        .route("/auth/delete", delete(handlers::auth::delete_account))
        .route("/auth/refresh", get(handlers::auth::refresh))
        .route("/auth/checkout_access", get(handlers::auth::checkout_access))
        .route("/auth/get_payload", get(handlers::auth::get_payload));

    let permission_routes = Router::new()
        .route("/permission/create", post(handlers::permission::create))
        .route("/permission/delete", delete(handlers::permission::delete))
        .route("/permission/update", put(handlers::permission::update))
        .route("/permission/get_all", get(handlers::permission::get_all))
        .route("/permission/assign", post(handlers::permission::assign))
        .route("/permission/take_away", delete(handlers::permission::take_away))
        .route(
            "/permission/get_user_permissions",
            post(handlers::permission::get_user_permissions),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::require_privileged,
        ));

    let mut app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    app = match state.config.environment {
        Environment::Dev => {
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()))
        }
        Environment::Prod => app.route(
            "/.well-known/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        ),
    };

    let app = app
        .merge(auth_routes)
        .merge(permission_routes)
        .with_state(state.clone())
        .layer(from_fn(middleware::metrics_middleware))
        .layer(from_fn_with_state(
            state.cookies(),
            middleware::clear_session_middleware,
        ))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri().path(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(cors_layer(&state.config.security.allowed_origins));

    Ok(app)
}

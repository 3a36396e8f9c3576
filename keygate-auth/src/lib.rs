pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use keygate_core::middleware::rate_limit::{
    create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{AuthConfig, RateLimitConfig};
use crate::services::{AuthService, JwtService, MfaService};
use crate::store::DynStore;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::registration::register,
        handlers::auth::registration::verify_email,
        handlers::auth::registration::resend_verification,
        handlers::auth::session::login,
        handlers::auth::session::refresh,
        handlers::auth::session::logout,
        handlers::auth::password::forgot_password,
        handlers::auth::password::reset_password,
        handlers::mfa::begin_setup,
        handlers::mfa::confirm_setup,
        handlers::mfa::revoke,
        handlers::mfa::challenge_login,
        handlers::session::list_sessions,
        handlers::session::current_session,
        handlers::session::revoke_session,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::LoginRequest,
            dtos::auth::LoginResponse,
            dtos::auth::VerifyEmailRequest,
            dtos::auth::ResendVerificationRequest,
            dtos::auth::ForgotPasswordRequest,
            dtos::auth::ResetPasswordRequest,
            dtos::mfa::MfaConfirmRequest,
            dtos::mfa::MfaChallengeRequest,
            models::AccountResponse,
            models::SessionResponse,
            services::mfa::MfaSetup,
            services::mfa::MfaStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login, tokens and password recovery"),
        (name = "MFA", description = "TOTP second-factor enrollment and verification"),
        (name = "Sessions", description = "Per-device session management")
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
    pub config: Arc<AuthConfig>,
    pub store: DynStore,
    pub jwt: JwtService,
    pub auth: AuthService,
    pub mfa: MfaService,
}

/// Per-endpoint IP limiters for the abuse-prone routes.
pub struct RateLimiters {
    pub login: IpRateLimiter,
    pub register: IpRateLimiter,
    pub forgot_password: IpRateLimiter,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            login: create_ip_rate_limiter(config.login_attempts, config.login_window_seconds),
            register: create_ip_rate_limiter(
                config.register_attempts,
                config.register_window_seconds,
            ),
            forgot_password: create_ip_rate_limiter(
                config.forgot_password_attempts,
                config.forgot_password_window_seconds,
            ),
        }
    }
}

/// Service health
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "Authentication"
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": state.config.service_name,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

pub fn build_router(state: AppState, limiters: &RateLimiters) -> Router {
    // Abuse-prone endpoints each get their own IP limiter.
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route_layer(from_fn_with_state(
            limiters.login.clone(),
            ip_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route_layer(from_fn_with_state(
            limiters.register.clone(),
            ip_rate_limit_middleware,
        ));

    let forgot_route = Router::new()
        .route("/auth/password/forgot", post(handlers::auth::forgot_password))
        .route_layer(from_fn_with_state(
            limiters.forgot_password.clone(),
            ip_rate_limit_middleware,
        ));

    let public_routes = Router::new()
        .route("/auth/refresh", get(handlers::auth::refresh))
        .route("/auth/verify/email", post(handlers::auth::verify_email))
        .route(
            "/auth/verify/resend",
            post(handlers::auth::resend_verification),
        )
        .route("/auth/password/reset", post(handlers::auth::reset_password))
        .route("/auth/google", get(handlers::auth::google_login))
        .route("/auth/google/callback", get(handlers::auth::google_callback))
        .route("/mfa/verify-login", post(handlers::mfa::challenge_login))
        .route("/health", get(health_check));

    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/mfa/setup", get(handlers::mfa::begin_setup))
        .route("/mfa/verify", post(handlers::mfa::confirm_setup))
        .route("/mfa/revoke", put(handlers::mfa::revoke))
        .route("/session", get(handlers::session::current_session))
        .route("/session/all", get(handlers::session::list_sessions))
        .route("/session/:id", delete(handlers::session::revoke_session))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .merge(login_route)
        .merge(register_route)
        .merge(forgot_route)
        .merge(public_routes)
        .merge(protected_routes);

    let origins: Vec<HeaderValue> = state
        .config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true);

    Router::new()
        .nest(&state.config.base_path, api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

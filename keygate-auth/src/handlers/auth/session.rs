use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use axum_extra::extract::cookie::CookieJar;
use keygate_core::error::AppError;

use crate::{
    dtos::{
        auth::{LoginRequest, LoginResponse},
        ErrorResponse, MessageResponse,
    },
    middleware::AuthUser,
    services::LoginOutcome,
    utils::cookies::{clear_auth_cookies, set_access_cookie, set_auth_cookies, REFRESH_COOKIE},
    utils::ValidatedJson,
    AppState,
};

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

/// Login with email and password
///
/// When the account has MFA enabled, the response carries only
/// `mfa_required = true`; no session exists until the challenge endpoint
/// confirms the second factor.
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in, or second factor required", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.auth.login(req, user_agent(&headers)).await?;

    match outcome {
        LoginOutcome::MfaRequired => Ok((
            jar,
            (
                StatusCode::OK,
                Json(LoginResponse {
                    message: "Verify MFA authentication.".to_string(),
                    mfa_required: true,
                    account: None,
                }),
            ),
        )),
        LoginOutcome::LoggedIn(login) => {
            let jar = set_auth_cookies(
                jar,
                &state.config,
                login.tokens.access_token,
                login.tokens.refresh_token,
            );
            Ok((
                jar,
                (
                    StatusCode::OK,
                    Json(LoginResponse {
                        message: "Logged in successfully.".to_string(),
                        mfa_required: false,
                        account: Some(login.account),
                    }),
                ),
            ))
        }
    }
}

/// Redeem the refresh cookie for a fresh access token
///
/// The refresh cookie only travels to this path. A new refresh token is
/// set only when the sliding-window policy actually renewed the session.
#[utoipa::path(
    get,
    path = "/auth/refresh",
    responses(
        (status = 200, description = "Access token refreshed", body = MessageResponse),
        (status = 401, description = "Missing, invalid or expired refresh token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let refresh_token = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing refresh token")))?;

    let outcome = state.auth.refresh(&refresh_token).await?;

    let mut jar = set_access_cookie(jar, &state.config, outcome.access_token);
    if let Some(new_refresh_token) = outcome.new_refresh_token {
        jar = crate::utils::cookies::set_refresh_cookie(jar, &state.config, new_refresh_token);
    }

    Ok((
        jar,
        (
            StatusCode::OK,
            Json(MessageResponse::new("Access token refreshed successfully")),
        ),
    ))
}

/// Logout the current session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Session already gone", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.auth.logout(&claims).await?;

    let jar = clear_auth_cookies(jar, &state.config);
    Ok((
        jar,
        (
            StatusCode::OK,
            Json(MessageResponse::new("Logged out successfully")),
        ),
    ))
}

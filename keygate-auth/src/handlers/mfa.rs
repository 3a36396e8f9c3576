//! MFA enrollment, revocation and login-challenge handlers.

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
        auth::LoginResponse,
        mfa::{MfaChallengeRequest, MfaConfirmRequest},
        ErrorResponse,
    },
    middleware::AuthUser,
    services::{MfaSetup, MfaStatus},
    utils::cookies::set_auth_cookies,
    utils::ValidatedJson,
    AppState,
};

/// Begin MFA enrollment for the authenticated account
///
/// Idempotent: already-enabled accounts get an informative no-op, and
/// repeating the call before confirmation returns the same secret.
#[utoipa::path(
    get,
    path = "/mfa/setup",
    responses(
        (status = 200, description = "Setup secret and provisioning URI", body = MfaSetup),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn begin_setup(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let setup = state.mfa.begin_setup(&claims.sub).await?;
    Ok((StatusCode::OK, Json(setup)))
}

/// Confirm MFA enrollment with the first authenticator code
#[utoipa::path(
    post,
    path = "/mfa/verify",
    request_body = MfaConfirmRequest,
    responses(
        (status = 200, description = "MFA enabled", body = MfaStatus),
        (status = 400, description = "Invalid code", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn confirm_setup(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<MfaConfirmRequest>,
) -> Result<impl IntoResponse, AppError> {
    let status = state
        .mfa
        .confirm_setup(&claims.sub, &req.code, &req.secret_key)
        .await?;
    Ok((StatusCode::OK, Json(status)))
}

/// Disable MFA for the authenticated account
#[utoipa::path(
    put,
    path = "/mfa/revoke",
    responses(
        (status = 200, description = "MFA disabled", body = MfaStatus),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "MFA",
    security(("bearer_auth" = []))
)]
pub async fn revoke(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let status = state.mfa.revoke(&claims.sub).await?;
    Ok((StatusCode::OK, Json(status)))
}

/// Complete a login that answered `mfa_required`
///
/// This is the only endpoint that turns a correct password plus a valid
/// TOTP code into a session and tokens.
#[utoipa::path(
    post,
    path = "/mfa/verify-login",
    request_body = MfaChallengeRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 400, description = "Invalid code", body = ErrorResponse),
        (status = 401, description = "MFA not enabled", body = ErrorResponse),
        (status = 404, description = "Account not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "MFA"
)]
pub async fn challenge_login(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<MfaChallengeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let login = state
        .mfa
        .challenge_login(&req.code, &req.email, user_agent)
        .await?;

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

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use axum_extra::extract::cookie::CookieJar;
use keygate_core::error::AppError;

use crate::{
    dtos::{
        auth::{ForgotPasswordRequest, ResetPasswordRequest},
        ErrorResponse, MessageResponse,
    },
    utils::cookies::clear_auth_cookies,
    utils::ValidatedJson,
    AppState,
};

/// Request a password-reset email
///
/// Unknown addresses get the same success as known ones. A failure to
/// dispatch the email is surfaced, since the link is the only path to a
/// reset.
#[utoipa::path(
    post,
    path = "/auth/password/forgot",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset email sent if the address exists", body = MessageResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Email could not be sent", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.forgot_password(&req.email).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(
            "Password reset email has been sent, if the provided email exists.",
        )),
    ))
}

/// Reset the password with a mailed code
///
/// Consumes the code, stores the new password and revokes every session
/// for the account, so each device has to log in again.
#[utoipa::path(
    post,
    path = "/auth/password/reset",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.reset_password(&req.code, req.password).await?;

    // The caller's own cookies are dead along with every other session.
    let jar = clear_auth_cookies(jar, &state.config);
    Ok((
        jar,
        (
            StatusCode::OK,
            Json(MessageResponse::new(
                "Password reset successfully. Please log in again.",
            )),
        ),
    ))
}

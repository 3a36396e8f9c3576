use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use keygate_core::error::AppError;

use crate::{
    dtos::{
        auth::{RegisterRequest, RegisterResponse, ResendVerificationRequest, VerifyEmailRequest},
        ErrorResponse, MessageResponse,
    },
    utils::ValidatedJson,
    AppState,
};

/// Register a new account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account registered", body = RegisterResponse),
        (status = 409, description = "Email or name already taken", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state.auth.register(req).await?;

    let message = if outcome.email_sent {
        "Account registered. Please check your email to verify your address."
    } else {
        "Account registered, but the verification email could not be sent. \
         Request a new one from the login screen."
    };

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: message.to_string(),
            account: outcome.account,
            email_sent: outcome.email_sent,
        }),
    ))
}

/// Verify an email address with a mailed code
#[utoipa::path(
    post,
    path = "/auth/verify/email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid or expired code", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn verify_email(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<VerifyEmailRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.verify_email(&req.code).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Email verified successfully")),
    ))
}

/// Resend the verification email
///
/// Responds with the same success whether or not the email belongs to an
/// account, so the endpoint cannot be used to probe for registrations.
#[utoipa::path(
    post,
    path = "/auth/verify/resend",
    request_body = ResendVerificationRequest,
    responses(
        (status = 200, description = "Verification email sent if the address exists", body = MessageResponse),
        (status = 429, description = "Too many requests", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Authentication"
)]
pub async fn resend_verification(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<ResendVerificationRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.resend_verification(&req.email).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new(
            "Verification email has been sent, if the provided email exists.",
        )),
    ))
}

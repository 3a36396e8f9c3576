//! Device-management handlers over the session ledger.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use keygate_core::error::AppError;
use uuid::Uuid;

use crate::{
    dtos::{ErrorResponse, MessageResponse},
    middleware::AuthUser,
    models::{AccountResponse, SessionResponse},
    AppState,
};

/// List the caller's active sessions, newest first
#[utoipa::path(
    get,
    path = "/session/all",
    responses(
        (status = 200, description = "Active sessions", body = [SessionResponse]),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn list_sessions(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let sessions = state.auth.list_sessions(&claims).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "sessions": sessions })),
    ))
}

/// The account behind the current session
#[utoipa::path(
    get,
    path = "/session",
    responses(
        (status = 200, description = "Current account", body = AccountResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Session no longer active", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn current_session(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let account = state.auth.current_session(&claims).await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({ "user": account })),
    ))
}

/// Revoke one of the caller's sessions
///
/// Revoking a session that does not exist, or that belongs to someone
/// else, is a 404; the caller must never believe a live session died.
#[utoipa::path(
    delete,
    path = "/session/{id}",
    params(("id" = Uuid, Path, description = "Session id")),
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Sessions",
    security(("bearer_auth" = []))
)]
pub async fn revoke_session(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    state.auth.revoke_session(id, &claims).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse::new("Session revoked successfully")),
    ))
}

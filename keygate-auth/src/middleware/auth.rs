//! Access-token authentication middleware.
//!
//! Accepts the token from the `Authorization: Bearer` header or from the
//! access cookie. Verification is pure (signature + expiry + audience);
//! no store round-trip happens on this path.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use keygate_core::error::AppError;

use crate::services::AccessClaims;
use crate::utils::cookies::ACCESS_COOKIE;
use crate::AppState;

/// Middleware to require an authenticated caller.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let bearer = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|value| value.to_string());

    let token = match bearer {
        Some(token) => token,
        None => {
            let jar = CookieJar::from_headers(req.headers());
            jar.get(ACCESS_COOKIE)
                .map(|cookie| cookie.value().to_string())
                .ok_or_else(|| {
                    AppError::Unauthorized(anyhow::anyhow!("Missing access token"))
                })?
        }
    };

    let claims = state
        .jwt
        .verify_access(&token)
        .map_err(|e| AppError::Unauthorized(anyhow::anyhow!("{}", e)))?;

    // Store claims in request extensions so handlers can access them.
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

/// Extractor to easily get claims in handlers.
pub struct AuthUser(pub AccessClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<AccessClaims>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Auth claims missing from request extensions"
            ))
        })?;

        Ok(AuthUser(claims.clone()))
    }
}

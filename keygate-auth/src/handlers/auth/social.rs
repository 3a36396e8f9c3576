//! Google OAuth glue around the orchestrator's federated login.
//!
//! The authorization-code exchange uses PKCE; state and verifier ride
//! short-lived cookies. Once Google vouches for the subject id and email,
//! the orchestrator takes over.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use keygate_core::error::AppError;
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::{
    dtos::auth::GoogleCallbackQuery,
    models::Provider,
    services::FederatedIdentity,
    utils::cookies::set_auth_cookies,
    AppState,
};

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    verified_email: bool,
    name: Option<String>,
}

/// Redirect the browser into Google's consent screen.
pub async fn google_login(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Response) {
    let state_val = uuid::Uuid::new_v4().to_string();
    let code_verifier = {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    };

    let code_challenge = {
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    };

    let google_url = format!(
        "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&state={}&code_challenge={}&code_challenge_method=S256",
        state.config.google.client_id,
        state.config.google.redirect_uri,
        state_val,
        code_challenge
    );

    let updated_jar = jar
        .add(
            Cookie::build(("oauth_state", state_val))
                .path("/")
                .http_only(true)
                .secure(state.config.is_prod())
                .max_age(time::Duration::minutes(5))
                .build(),
        )
        .add(
            Cookie::build(("code_verifier", code_verifier))
                .path("/")
                .http_only(true)
                .secure(state.config.is_prod())
                .max_age(time::Duration::minutes(5))
                .build(),
        );

    (updated_jar, Redirect::to(&google_url).into_response())
}

/// Handle Google's redirect back: validate state, exchange the code,
/// fetch the profile, find-or-create the account, set auth cookies.
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<GoogleCallbackQuery>,
) -> Result<(CookieJar, Response), AppError> {
    // 1. Validate state
    let stored_state = jar.get("oauth_state").map(|c| c.value());
    if stored_state != Some(query.state.as_str()) {
        return Err(AppError::BadRequest(anyhow::anyhow!("Invalid OAuth state")));
    }

    // 2. Get code verifier
    let code_verifier = jar
        .get("code_verifier")
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing code verifier")))?;

    // 3. Exchange code for an access token
    let client = reqwest::Client::new();
    let token_res = client
        .post("https://oauth2.googleapis.com/token")
        .form(&[
            ("client_id", state.config.google.client_id.as_str()),
            ("client_secret", state.config.google.client_secret.as_str()),
            ("code", query.code.as_str()),
            ("code_verifier", code_verifier.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", state.config.google.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to exchange Google code");
            AppError::Unauthorized(anyhow::anyhow!("Authentication failed"))
        })?;

    if !token_res.status().is_success() {
        let status = token_res.status();
        let err_body = token_res.text().await.unwrap_or_default();
        tracing::error!(status = %status, body = %err_body, "Google token exchange error");
        return Err(AppError::Unauthorized(anyhow::anyhow!(
            "Authentication failed"
        )));
    }

    let token_data: GoogleTokenResponse = token_res.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse Google token response");
        AppError::InternalError(anyhow::anyhow!("Internal server error"))
    })?;

    // 4. Get the profile from Google
    let user_info_res = client
        .get("https://www.googleapis.com/oauth2/v2/userinfo")
        .bearer_auth(token_data.access_token)
        .send()
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch Google user info");
            AppError::Unauthorized(anyhow::anyhow!("Authentication failed"))
        })?;

    let user_info: GoogleUserInfo = user_info_res.json().await.map_err(|e| {
        tracing::error!(error = %e, "Failed to parse Google user info");
        AppError::InternalError(anyhow::anyhow!("Internal server error"))
    })?;

    if !user_info.verified_email {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Google account email not verified"
        )));
    }

    // 5. Find-or-create the account and mint a session
    let user_agent = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    let display_name = user_info
        .name
        .unwrap_or_else(|| user_info.email.split('@').next().unwrap_or("user").to_string());

    let login = state
        .auth
        .federated_login(
            FederatedIdentity {
                provider: Provider::Google,
                subject_id: user_info.id,
                email: user_info.email,
                name: display_name,
            },
            user_agent,
        )
        .await?;

    tracing::info!(account_id = %login.account.id, "Logged in via Google");

    // 6. Hand the tokens over as cookies and send the browser home
    let jar = jar
        .remove(Cookie::build(("oauth_state", "")).path("/").build())
        .remove(Cookie::build(("code_verifier", "")).path("/").build());
    let jar = set_auth_cookies(
        jar,
        &state.config,
        login.tokens.access_token,
        login.tokens.refresh_token,
    );

    let redirect = Redirect::to(&state.config.frontend_base_url).into_response();
    Ok((jar, redirect))
}

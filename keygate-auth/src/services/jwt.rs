//! Token codec: stateless signed bearer tokens.
//!
//! Access tokens carry identity + session linkage and die on their own
//! short TTL; refresh tokens carry only the session id and are signed with
//! a different secret, so a leaked access-signing key cannot mint them.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::JwtConfig;

/// Fixed audience claim stamped into every token.
pub const TOKEN_AUDIENCE: &str = "user";

/// Claims for access tokens (short-lived).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject (account id)
    pub sub: String,
    /// Session id
    pub sid: Uuid,
    /// Role snapshot
    pub role: String,
    /// Audience
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Claims for refresh tokens (long-lived). Identity is deliberately absent;
/// the live session row supplies it at redemption time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Session id
    pub sid: Uuid,
    /// Audience
    pub aud: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// Token verification failures, typed for control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("bad signature")]
    BadSignature,
}

/// Access + refresh token pair handed to a client at login.
#[derive(Debug, Serialize)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct JwtService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            access_ttl_secs: config.access_ttl_secs,
            refresh_ttl_secs: config.refresh_ttl_secs,
        }
    }

    pub fn sign_access(
        &self,
        account_id: &str,
        session_id: Uuid,
        role: &str,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = AccessClaims {
            sub: account_id.to_string(),
            sid: session_id,
            role: role.to_string(),
            aud: TOKEN_AUDIENCE.to_string(),
            exp: (now + Duration::seconds(self.access_ttl_secs)).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.access_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))
    }

    pub fn sign_refresh(&self, session_id: Uuid) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = RefreshClaims {
            sid: session_id,
            aud: TOKEN_AUDIENCE.to_string(),
            exp: (now + Duration::seconds(self.refresh_ttl_secs)).timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.refresh_encoding)
            .map_err(|e| anyhow::anyhow!("Failed to encode refresh token: {}", e))
    }

    /// Sign both tokens for a freshly created session.
    pub fn issue_pair(
        &self,
        account_id: &str,
        session_id: Uuid,
        role: &str,
    ) -> Result<IssuedTokens, anyhow::Error> {
        Ok(IssuedTokens {
            access_token: self.sign_access(account_id, session_id, role)?,
            refresh_token: self.sign_refresh(session_id)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        decode::<AccessClaims>(token, &self.access_decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(Self::map_error)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        decode::<RefreshClaims>(token, &self.refresh_decoding, &Self::validation())
            .map(|data| data.claims)
            .map_err(Self::map_error)
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    fn validation() -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_audience(&[TOKEN_AUDIENCE]);
        validation
    }

    fn map_error(err: jsonwebtoken::errors::Error) -> TokenError {
        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::BadSignature,
            _ => TokenError::Malformed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;

    fn service() -> JwtService {
        JwtService::new(&AuthConfig::for_tests().jwt)
    }

    #[test]
    fn access_token_roundtrip() {
        let jwt = service();
        let session_id = Uuid::new_v4();

        let token = jwt.sign_access("a1b2c3d4e5", session_id, "USER").unwrap();
        let claims = jwt.verify_access(&token).unwrap();

        assert_eq!(claims.sub, "a1b2c3d4e5");
        assert_eq!(claims.sid, session_id);
        assert_eq!(claims.role, "USER");
        assert_eq!(claims.aud, TOKEN_AUDIENCE);
    }

    #[test]
    fn refresh_token_roundtrip() {
        let jwt = service();
        let session_id = Uuid::new_v4();

        let token = jwt.sign_refresh(session_id).unwrap();
        let claims = jwt.verify_refresh(&token).unwrap();
        assert_eq!(claims.sid, session_id);
    }

    #[test]
    fn secrets_are_separated() {
        let jwt = service();
        let session_id = Uuid::new_v4();

        // A refresh token must not validate as an access token.
        let refresh = jwt.sign_refresh(session_id).unwrap();
        assert_eq!(
            jwt.verify_access(&refresh).unwrap_err(),
            TokenError::BadSignature
        );

        // And an access token must not redeem as a refresh token.
        let access = jwt.sign_access("a1b2c3d4e5", session_id, "USER").unwrap();
        assert_eq!(
            jwt.verify_refresh(&access).unwrap_err(),
            TokenError::BadSignature
        );
    }

    #[test]
    fn expired_token_is_typed() {
        let mut config = AuthConfig::for_tests().jwt;
        config.access_ttl_secs = -120;
        let jwt = JwtService::new(&config);

        let token = jwt.sign_access("a1b2c3d4e5", Uuid::new_v4(), "USER").unwrap();
        assert_eq!(jwt.verify_access(&token).unwrap_err(), TokenError::Expired);
    }

    #[test]
    fn garbage_is_malformed() {
        let jwt = service();
        assert_eq!(
            jwt.verify_access("not-a-token").unwrap_err(),
            TokenError::Malformed
        );
    }
}

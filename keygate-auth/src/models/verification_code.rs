//! Single-use, time-limited verification codes.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CodePurpose {
    EmailVerification,
    PasswordReset,
}

impl CodePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodePurpose::EmailVerification => "EMAIL_VERIFICATION",
            CodePurpose::PasswordReset => "PASSWORD_RESET",
        }
    }
}

/// Honored at most once: the row is deleted in the same statement that
/// consumes it, and expired rows are never honored.
#[derive(Debug, Clone, FromRow)]
pub struct VerificationCode {
    pub id: Uuid,
    pub code: String,
    pub account_id: String,
    pub purpose: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl VerificationCode {
    pub fn new(account_id: String, purpose: CodePurpose, code: String, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            code,
            account_id,
            purpose: purpose.as_str().to_string(),
            created_at: now,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

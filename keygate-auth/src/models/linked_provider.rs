//! LinkedProvider model - how an account authenticates.
//!
//! One row per account. A local account has `provider = EMAIL` and no
//! `external_id`; a federated account carries the issuer plus the subject
//! id handed back by that issuer, and never a password hash.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Provider {
    Email,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Email => "EMAIL",
            Provider::Google => "GOOGLE",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct LinkedProvider {
    pub account_id: String,
    pub provider: String,
    pub external_id: Option<String>,
    pub mfa_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LinkedProvider {
    /// Provider record for a password-based account.
    pub fn local(account_id: String) -> Self {
        Self {
            account_id,
            provider: Provider::Email.as_str().to_string(),
            external_id: None,
            mfa_secret: None,
            created_at: Utc::now(),
        }
    }

    /// Provider record for a federated account.
    pub fn federated(account_id: String, provider: Provider, external_id: String) -> Self {
        Self {
            account_id,
            provider: provider.as_str().to_string(),
            external_id: Some(external_id),
            mfa_secret: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_local(&self) -> bool {
        self.provider == Provider::Email.as_str()
    }
}

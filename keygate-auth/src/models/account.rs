//! Account model - the identity record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

/// Account roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

/// Membership tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Membership {
    Regular,
    Pro,
}

impl Membership {
    pub fn as_str(&self) -> &'static str {
        match self {
            Membership::Regular => "REGULAR",
            Membership::Pro => "PRO",
        }
    }
}

/// Account entity.
///
/// `id` is a compact 10-hex-char identifier, not a UUID. `password_hash` is
/// absent for federated accounts.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub role: String,
    pub membership: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: String, name: String, email: String, password_hash: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            name,
            email,
            password_hash,
            role: Role::User.as_str().to_string(),
            membership: Membership::Regular.as_str().to_string(),
            email_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Convert to sanitized response (no password hash).
    pub fn sanitized(&self) -> AccountResponse {
        AccountResponse {
            id: self.id.clone(),
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            membership: self.membership.clone(),
            email_verified: self.email_verified,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Account response for the API (without sensitive fields).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    pub membership: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

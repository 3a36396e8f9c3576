//! Per-account preferences.

use sqlx::FromRow;

/// Invariant: `mfa_enabled` is true only while the account's provider row
/// holds a TOTP secret. Both are flipped together by the MFA engine.
#[derive(Debug, Clone, FromRow)]
pub struct Preferences {
    pub account_id: String,
    pub mfa_enabled: bool,
    pub email_notifications: bool,
}

impl Preferences {
    pub fn new(account_id: String) -> Self {
        Self {
            account_id,
            mfa_enabled: false,
            email_notifications: true,
        }
    }
}

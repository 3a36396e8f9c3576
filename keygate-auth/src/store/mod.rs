//! Repository boundary over the relational store.
//!
//! The store is an explicitly constructed, injected instance: `PgStore` in
//! production, `MemoryStore` in tests. Expiry of sessions and verification
//! codes is lazy — every read filters on `expires_at`, nothing sweeps rows.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keygate_core::error::AppError;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{
    Account, AccountDetail, LinkedProvider, Preferences, Session, VerificationCode,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type DynStore = Arc<dyn AuthStore>;

#[async_trait]
pub trait AuthStore: Send + Sync {
    // ==================== Accounts ====================

    async fn find_account_by_id(&self, id: &str) -> Result<Option<Account>, AppError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError>;

    async fn find_account_by_name(&self, name: &str) -> Result<Option<Account>, AppError>;

    async fn find_account_detail_by_id(&self, id: &str)
        -> Result<Option<AccountDetail>, AppError>;

    async fn find_account_detail_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountDetail>, AppError>;

    /// Create an account with its provider record, preferences and optional
    /// initial verification code in one transaction. A partial failure
    /// leaves no orphan rows.
    async fn create_account(
        &self,
        account: &Account,
        provider: &LinkedProvider,
        preferences: &Preferences,
        initial_code: Option<&VerificationCode>,
    ) -> Result<(), AppError>;

    async fn update_password(&self, account_id: &str, password_hash: &str)
        -> Result<(), AppError>;

    /// Returns false when no such account exists.
    async fn set_email_verified(&self, account_id: &str) -> Result<bool, AppError>;

    // ==================== MFA ====================

    /// Persist `secret` only if the account has none yet, and return the
    /// secret that is now stored. Under concurrent enrollment exactly one
    /// caller's secret wins and both observe it.
    async fn store_mfa_secret_if_absent(
        &self,
        account_id: &str,
        secret: &str,
    ) -> Result<String, AppError>;

    async fn enable_mfa(&self, account_id: &str) -> Result<(), AppError>;

    /// Clear the MFA flag and the stored secret in one transaction.
    async fn clear_mfa(&self, account_id: &str) -> Result<(), AppError>;

    // ==================== Sessions ====================

    async fn insert_session(&self, session: &Session) -> Result<(), AppError>;

    /// Logically-active lookup: an expired row is NOT returned.
    async fn find_active_session(&self, id: Uuid) -> Result<Option<Session>, AppError>;

    async fn extend_session(&self, id: Uuid, expires_at: DateTime<Utc>) -> Result<(), AppError>;

    /// Active sessions for an account, newest first.
    async fn active_sessions_for_account(
        &self,
        account_id: &str,
    ) -> Result<Vec<Session>, AppError>;

    /// Scoped delete; the ownership check lives in the predicate so it
    /// cannot race a separate read. Returns the number of rows removed.
    async fn delete_session(&self, id: Uuid, account_id: &str) -> Result<u64, AppError>;

    async fn delete_sessions_for_account(&self, account_id: &str) -> Result<u64, AppError>;

    // ==================== Verification codes ====================

    async fn insert_verification_code(&self, code: &VerificationCode) -> Result<(), AppError>;

    async fn code_exists(&self, code: &str) -> Result<bool, AppError>;

    async fn count_recent_codes(
        &self,
        account_id: &str,
        purpose: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError>;

    /// Atomically remove and return an unexpired code matching `code` and
    /// `purpose`. The delete and the read are one statement, so a code can
    /// be honored at most once even under concurrent consumption.
    async fn take_verification_code(
        &self,
        code: &str,
        purpose: &str,
    ) -> Result<Option<VerificationCode>, AppError>;

    async fn delete_codes_for_account(
        &self,
        account_id: &str,
        purpose: &str,
    ) -> Result<u64, AppError>;
}

//! Verification-code registry: durable, single-use, time-limited codes for
//! email verification and password reset, with a per-account issue limit.

use chrono::{Duration, Utc};

use crate::config::AuthConfig;
use crate::models::{CodePurpose, VerificationCode};
use crate::services::ServiceError;
use crate::store::DynStore;
use crate::utils::ids::{generate_code, MAX_UNIQUE_ATTEMPTS};

#[derive(Clone)]
pub struct VerificationService {
    store: DynStore,
    window: Duration,
    max_attempts: i64,
}

impl VerificationService {
    pub fn new(store: DynStore, config: &AuthConfig) -> Self {
        Self {
            store,
            window: Duration::seconds(config.verification.rate_limit_window_secs),
            max_attempts: config.verification.rate_limit_max_attempts,
        }
    }

    /// Build a code row with a globally-unique value without persisting it.
    /// Used when the insert must ride someone else's transaction (the
    /// account-creation bundle).
    pub async fn mint(
        &self,
        account_id: &str,
        purpose: CodePurpose,
        ttl: Duration,
    ) -> Result<VerificationCode, ServiceError> {
        for _ in 0..MAX_UNIQUE_ATTEMPTS {
            let code = generate_code();
            if !self.store.code_exists(&code).await? {
                return Ok(VerificationCode::new(
                    account_id.to_string(),
                    purpose,
                    code,
                    ttl,
                ));
            }
        }
        Err(ServiceError::Internal(anyhow::anyhow!(
            "could not generate a unique verification code"
        )))
    }

    /// Issue and persist a new code.
    pub async fn issue(
        &self,
        account_id: &str,
        purpose: CodePurpose,
        ttl: Duration,
    ) -> Result<VerificationCode, ServiceError> {
        let code = self.mint(account_id, purpose, ttl).await?;
        self.store.insert_verification_code(&code).await?;

        tracing::debug!(account_id = %account_id, purpose = %code.purpose, "Verification code issued");
        Ok(code)
    }

    /// Whether the account has hit the issue limit for `purpose`. Checked
    /// before issuing, so a burst cannot run past the cap.
    pub async fn rate_limited(
        &self,
        account_id: &str,
        purpose: CodePurpose,
    ) -> Result<bool, ServiceError> {
        let since = Utc::now() - self.window;
        let count = self
            .store
            .count_recent_codes(account_id, purpose.as_str(), since)
            .await?;
        Ok(count >= self.max_attempts)
    }

    /// Seconds a limited caller should wait before retrying.
    pub fn retry_after_secs(&self) -> u64 {
        self.window.num_seconds().max(0) as u64
    }

    /// Redeem a code. Miss and expiry are indistinguishable to the caller.
    ///
    /// Consuming a password-reset code also deletes the account's other
    /// reset codes: once one of them has changed the password, the stale
    /// siblings are no longer safe to honor.
    pub async fn consume(
        &self,
        code: &str,
        purpose: CodePurpose,
    ) -> Result<String, ServiceError> {
        let taken = self
            .store
            .take_verification_code(code, purpose.as_str())
            .await?
            .ok_or(ServiceError::InvalidOrExpiredCode)?;

        if purpose == CodePurpose::PasswordReset {
            self.store
                .delete_codes_for_account(&taken.account_id, purpose.as_str())
                .await?;
        }

        Ok(taken.account_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::store::{AuthStore, MemoryStore};
    use std::sync::Arc;

    fn service_with_store() -> (VerificationService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = VerificationService::new(store.clone(), &AuthConfig::for_tests());
        (service, store)
    }

    #[tokio::test]
    async fn issued_codes_are_distinct_rows() {
        let (service, _) = service_with_store();
        let first = service
            .issue("acct", CodePurpose::EmailVerification, Duration::minutes(45))
            .await
            .unwrap();
        let second = service
            .issue("acct", CodePurpose::EmailVerification, Duration::minutes(45))
            .await
            .unwrap();
        assert_ne!(first.code, second.code);
        assert_ne!(first.id, second.id);
    }

    #[tokio::test]
    async fn code_is_single_use() {
        let (service, _) = service_with_store();
        let code = service
            .issue("acct", CodePurpose::EmailVerification, Duration::minutes(45))
            .await
            .unwrap();

        let account_id = service
            .consume(&code.code, CodePurpose::EmailVerification)
            .await
            .unwrap();
        assert_eq!(account_id, "acct");

        let err = service
            .consume(&code.code, CodePurpose::EmailVerification)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOrExpiredCode));
    }

    #[tokio::test]
    async fn purpose_must_match() {
        let (service, _) = service_with_store();
        let code = service
            .issue("acct", CodePurpose::EmailVerification, Duration::minutes(45))
            .await
            .unwrap();

        let err = service
            .consume(&code.code, CodePurpose::PasswordReset)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOrExpiredCode));
    }

    #[tokio::test]
    async fn expired_code_reports_like_a_miss() {
        let (service, _) = service_with_store();
        let code = service
            .issue("acct", CodePurpose::PasswordReset, Duration::seconds(-1))
            .await
            .unwrap();

        let err = service
            .consume(&code.code, CodePurpose::PasswordReset)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOrExpiredCode));
    }

    #[tokio::test]
    async fn nth_issue_allowed_nth_plus_one_limited() {
        let (service, _) = service_with_store();
        let max = AuthConfig::for_tests().verification.rate_limit_max_attempts;

        for _ in 0..max {
            assert!(!service
                .rate_limited("acct", CodePurpose::EmailVerification)
                .await
                .unwrap());
            service
                .issue("acct", CodePurpose::EmailVerification, Duration::minutes(45))
                .await
                .unwrap();
        }

        assert!(service
            .rate_limited("acct", CodePurpose::EmailVerification)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn rate_limit_window_slides() {
        let (service, store) = service_with_store();

        // Two codes issued outside the window no longer count.
        for _ in 0..2 {
            let mut code = service
                .mint("acct", CodePurpose::EmailVerification, Duration::minutes(45))
                .await
                .unwrap();
            code.created_at = Utc::now() - Duration::minutes(11);
            store.insert_verification_code(&code).await.unwrap();
        }

        assert!(!service
            .rate_limited("acct", CodePurpose::EmailVerification)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn reset_consumption_deletes_sibling_codes() {
        let (service, store) = service_with_store();
        let first = service
            .issue("acct", CodePurpose::PasswordReset, Duration::hours(1))
            .await
            .unwrap();
        let second = service
            .issue("acct", CodePurpose::PasswordReset, Duration::hours(1))
            .await
            .unwrap();

        service
            .consume(&first.code, CodePurpose::PasswordReset)
            .await
            .unwrap();

        // The sibling is gone as well.
        assert!(!store.code_exists(&second.code).await.unwrap());
    }

    #[tokio::test]
    async fn rate_limit_is_per_purpose() {
        let (service, _) = service_with_store();
        for _ in 0..2 {
            service
                .issue("acct", CodePurpose::EmailVerification, Duration::minutes(45))
                .await
                .unwrap();
        }

        assert!(service
            .rate_limited("acct", CodePurpose::EmailVerification)
            .await
            .unwrap());
        assert!(!service
            .rate_limited("acct", CodePurpose::PasswordReset)
            .await
            .unwrap());
    }
}

//! MFA enrollment and verification engine.
//!
//! Per-account state machine: DISABLED -> secret persisted but unconfirmed
//! -> ENABLED, and back to DISABLED via revoke. The TOTP parameters (SHA1,
//! 6 digits, 30-second step, one step of clock-skew tolerance) match what
//! authenticator apps expect.

use serde::Serialize;
use totp_rs::{Algorithm, Secret, TOTP};
use utoipa::ToSchema;

use crate::services::auth::CompletedLogin;
use crate::services::{JwtService, ServiceError, SessionService};
use crate::store::DynStore;

#[derive(Clone)]
pub struct MfaService {
    store: DynStore,
    sessions: SessionService,
    jwt: JwtService,
    issuer: String,
}

/// Result of `begin_setup`. `secret` and `otpauth_url` are absent when the
/// call was a no-op because MFA is already enabled.
#[derive(Debug, Serialize, ToSchema)]
pub struct MfaSetup {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otpauth_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MfaStatus {
    pub message: String,
    pub mfa_enabled: bool,
}

impl MfaService {
    pub fn new(store: DynStore, sessions: SessionService, jwt: JwtService, issuer: String) -> Self {
        Self {
            store,
            sessions,
            jwt,
            issuer,
        }
    }

    fn totp(&self, secret_base32: &str, label: &str) -> Result<TOTP, ServiceError> {
        let secret_bytes = Secret::Encoded(secret_base32.to_string())
            .to_bytes()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Bad TOTP secret: {:?}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret_bytes,
            Some(self.issuer.clone()),
            label.to_string(),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP init error: {}", e)))
    }

    fn code_matches(&self, secret_base32: &str, label: &str, code: &str) -> Result<bool, ServiceError> {
        let totp = self.totp(secret_base32, label)?;
        Ok(totp.check_current(code).unwrap_or(false))
    }

    /// Start (or resume) enrollment.
    ///
    /// Idempotent in both directions: already-enabled accounts get an
    /// informative no-op, and an unconfirmed secret from an earlier call is
    /// returned again rather than regenerated, so two concurrent setups
    /// converge on one persisted secret.
    pub async fn begin_setup(&self, account_id: &str) -> Result<MfaSetup, ServiceError> {
        let detail = self
            .store
            .find_account_detail_by_id(account_id)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;

        if detail.preferences.mfa_enabled {
            return Ok(MfaSetup {
                message: "MFA is already enabled".to_string(),
                secret: None,
                otpauth_url: None,
            });
        }

        let secret = match detail.provider.mfa_secret {
            Some(secret) => secret,
            None => {
                let raw = Secret::generate_secret().to_bytes().map_err(|e| {
                    ServiceError::Internal(anyhow::anyhow!("Secret gen error: {:?}", e))
                })?;
                let generated = TOTP::new(
                    Algorithm::SHA1,
                    6,
                    1,
                    30,
                    raw,
                    Some(self.issuer.clone()),
                    detail.account.name.clone(),
                )
                .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP init error: {}", e)))?
                .get_secret_base32();

                self.store
                    .store_mfa_secret_if_absent(account_id, &generated)
                    .await?
            }
        };

        let totp = self.totp(&secret, &detail.account.name)?;
        tracing::info!(account_id = %account_id, "MFA enrollment started");

        Ok(MfaSetup {
            message: "Scan the QR code or use the setup key".to_string(),
            otpauth_url: Some(totp.get_url()),
            secret: Some(secret),
        })
    }

    /// Confirm enrollment with the first code from the authenticator.
    pub async fn confirm_setup(
        &self,
        account_id: &str,
        code: &str,
        secret_key: &str,
    ) -> Result<MfaStatus, ServiceError> {
        let detail = self
            .store
            .find_account_detail_by_id(account_id)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;

        if detail.preferences.mfa_enabled {
            return Ok(MfaStatus {
                message: "MFA is already enabled".to_string(),
                mfa_enabled: true,
            });
        }

        // Enabling the flag without a persisted secret would break the
        // mfa_enabled => secret invariant.
        if detail.provider.mfa_secret.is_none() {
            return Err(ServiceError::MfaSetupNotStarted);
        }

        if !self.code_matches(secret_key, &detail.account.name, code)? {
            return Err(ServiceError::InvalidMfaCode);
        }

        self.store.enable_mfa(account_id).await?;
        tracing::info!(account_id = %account_id, "MFA enabled");

        Ok(MfaStatus {
            message: "MFA setup completed successfully".to_string(),
            mfa_enabled: true,
        })
    }

    /// Disable MFA: flag and secret are cleared in one transaction, so a
    /// partial failure can never leave a disabled flag with a live secret.
    pub async fn revoke(&self, account_id: &str) -> Result<MfaStatus, ServiceError> {
        let detail = self
            .store
            .find_account_detail_by_id(account_id)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;

        if !detail.preferences.mfa_enabled {
            return Ok(MfaStatus {
                message: "MFA is not enabled".to_string(),
                mfa_enabled: false,
            });
        }

        self.store.clear_mfa(account_id).await?;
        tracing::info!(account_id = %account_id, "MFA revoked");

        Ok(MfaStatus {
            message: "MFA revoked successfully".to_string(),
            mfa_enabled: false,
        })
    }

    /// Complete a login that the password step answered with
    /// `mfa_required`. The only path that turns a correct password plus an
    /// enabled second factor into a session.
    pub async fn challenge_login(
        &self,
        code: &str,
        email: &str,
        user_agent: Option<String>,
    ) -> Result<CompletedLogin, ServiceError> {
        let detail = self
            .store
            .find_account_detail_by_email(email)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;

        if !detail.mfa_enabled() {
            return Err(ServiceError::MfaNotEnabled);
        }

        let secret = detail.provider.mfa_secret.as_deref().unwrap_or_default();
        if !self.code_matches(secret, &detail.account.name, code)? {
            return Err(ServiceError::InvalidMfaCode);
        }

        let account = detail.account;
        let session = self
            .sessions
            .create(&account.id, user_agent, &account.role)
            .await?;
        let tokens = self.jwt.issue_pair(&account.id, session.id, &session.role)?;

        tracing::info!(account_id = %account.id, "MFA login completed");

        Ok(CompletedLogin {
            account: account.sanitized(),
            tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::models::{Account, LinkedProvider, Preferences};
    use crate::store::{AuthStore, MemoryStore};
    use std::sync::Arc;

    async fn seeded() -> (MfaService, Arc<MemoryStore>) {
        let config = AuthConfig::for_tests();
        let store = Arc::new(MemoryStore::new());
        let account = Account::new(
            "a1b2c3d4e5".to_string(),
            "alice".to_string(),
            "alice@x.com".to_string(),
            Some("$argon2$fake".to_string()),
        );
        store
            .create_account(
                &account,
                &LinkedProvider::local(account.id.clone()),
                &Preferences::new(account.id.clone()),
                None,
            )
            .await
            .unwrap();

        let sessions = SessionService::new(store.clone(), &config);
        let jwt = JwtService::new(&config.jwt);
        let mfa = MfaService::new(store.clone(), sessions, jwt, config.mfa.issuer.clone());
        (mfa, store)
    }

    fn current_code(secret_base32: &str) -> String {
        let secret = Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap();
        let totp = TOTP::new(
            Algorithm::SHA1,
            6,
            1,
            30,
            secret,
            Some("keygate".to_string()),
            "alice".to_string(),
        )
        .unwrap();
        totp.generate_current().unwrap()
    }

    #[tokio::test]
    async fn full_enrollment_flow() {
        let (mfa, store) = seeded().await;

        let setup = mfa.begin_setup("a1b2c3d4e5").await.unwrap();
        let secret = setup.secret.expect("setup returns the secret");
        let url = setup.otpauth_url.expect("setup returns the otpauth url");
        assert!(url.starts_with("otpauth://totp/"));
        assert!(url.contains("keygate"));

        let code = current_code(&secret);
        let status = mfa.confirm_setup("a1b2c3d4e5", &code, &secret).await.unwrap();
        assert!(status.mfa_enabled);

        let detail = store
            .find_account_detail_by_id("a1b2c3d4e5")
            .await
            .unwrap()
            .unwrap();
        assert!(detail.preferences.mfa_enabled);
        assert_eq!(detail.provider.mfa_secret.as_deref(), Some(secret.as_str()));
    }

    #[tokio::test]
    async fn begin_setup_is_idempotent_on_the_secret() {
        let (mfa, _) = seeded().await;

        let first = mfa.begin_setup("a1b2c3d4e5").await.unwrap();
        let second = mfa.begin_setup("a1b2c3d4e5").await.unwrap();
        assert_eq!(first.secret, second.secret);
    }

    #[tokio::test]
    async fn concurrent_begin_setups_persist_one_secret() {
        let (mfa, store) = seeded().await;

        let (first, second) = tokio::join!(
            mfa.begin_setup("a1b2c3d4e5"),
            mfa.begin_setup("a1b2c3d4e5")
        );
        let first = first.unwrap().secret.unwrap();
        let second = second.unwrap().secret.unwrap();

        // Exactly one secret won the race, and both callers observe it.
        let stored = store
            .find_account_detail_by_id("a1b2c3d4e5")
            .await
            .unwrap()
            .unwrap()
            .provider
            .mfa_secret
            .unwrap();
        assert_eq!(first, stored);
        assert_eq!(second, stored);
    }

    #[tokio::test]
    async fn begin_setup_after_enable_is_a_noop() {
        let (mfa, _) = seeded().await;

        let setup = mfa.begin_setup("a1b2c3d4e5").await.unwrap();
        let secret = setup.secret.unwrap();
        mfa.confirm_setup("a1b2c3d4e5", &current_code(&secret), &secret)
            .await
            .unwrap();

        let again = mfa.begin_setup("a1b2c3d4e5").await.unwrap();
        assert!(again.secret.is_none());
        assert!(again.otpauth_url.is_none());
    }

    #[tokio::test]
    async fn wrong_code_changes_nothing() {
        let (mfa, store) = seeded().await;
        let secret = mfa.begin_setup("a1b2c3d4e5").await.unwrap().secret.unwrap();

        let err = mfa
            .confirm_setup("a1b2c3d4e5", "0000000", &secret)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidMfaCode));

        let detail = store
            .find_account_detail_by_id("a1b2c3d4e5")
            .await
            .unwrap()
            .unwrap();
        assert!(!detail.preferences.mfa_enabled);
    }

    #[tokio::test]
    async fn confirm_before_begin_is_rejected() {
        let (mfa, _) = seeded().await;
        let err = mfa
            .confirm_setup("a1b2c3d4e5", "0000000", "JBSWY3DPEHPK3PXP")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MfaSetupNotStarted));
    }

    #[tokio::test]
    async fn revoke_clears_flag_and_secret_together() {
        let (mfa, store) = seeded().await;
        let secret = mfa.begin_setup("a1b2c3d4e5").await.unwrap().secret.unwrap();
        mfa.confirm_setup("a1b2c3d4e5", &current_code(&secret), &secret)
            .await
            .unwrap();

        let status = mfa.revoke("a1b2c3d4e5").await.unwrap();
        assert!(!status.mfa_enabled);

        let detail = store
            .find_account_detail_by_id("a1b2c3d4e5")
            .await
            .unwrap()
            .unwrap();
        assert!(!detail.preferences.mfa_enabled);
        assert!(detail.provider.mfa_secret.is_none());
    }

    #[tokio::test]
    async fn revoke_when_disabled_is_a_noop() {
        let (mfa, _) = seeded().await;
        let status = mfa.revoke("a1b2c3d4e5").await.unwrap();
        assert_eq!(status.message, "MFA is not enabled");
        assert!(!status.mfa_enabled);
    }

    #[tokio::test]
    async fn challenge_login_mints_a_session() {
        let (mfa, store) = seeded().await;
        let secret = mfa.begin_setup("a1b2c3d4e5").await.unwrap().secret.unwrap();
        mfa.confirm_setup("a1b2c3d4e5", &current_code(&secret), &secret)
            .await
            .unwrap();

        let login = mfa
            .challenge_login(
                &current_code(&secret),
                "alice@x.com",
                Some("test-agent".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(login.account.id, "a1b2c3d4e5");
        assert!(!login.tokens.access_token.is_empty());
        assert_eq!(
            store
                .active_sessions_for_account("a1b2c3d4e5")
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn challenge_login_requires_enabled_mfa() {
        let (mfa, store) = seeded().await;

        let err = mfa
            .challenge_login("0000000", "alice@x.com", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::MfaNotEnabled));
        assert!(store
            .active_sessions_for_account("a1b2c3d4e5")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn challenge_login_rejects_wrong_code() {
        let (mfa, store) = seeded().await;
        let secret = mfa.begin_setup("a1b2c3d4e5").await.unwrap().secret.unwrap();
        mfa.confirm_setup("a1b2c3d4e5", &current_code(&secret), &secret)
            .await
            .unwrap();

        let err = mfa
            .challenge_login("0000000", "alice@x.com", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidMfaCode));
        assert!(store
            .active_sessions_for_account("a1b2c3d4e5")
            .await
            .unwrap()
            .is_empty());
    }
}

//! Auth orchestrator: composes the credential store, token codec, session
//! ledger, verification-code registry and mailer into the user-facing
//! flows. The MFA engine intercepts login before session creation when a
//! second factor is enabled.

use std::sync::Arc;

use serde::Serialize;

use crate::config::AuthConfig;
use crate::dtos::auth::{LoginRequest, RegisterRequest};
use crate::models::{
    Account, AccountResponse, CodePurpose, LinkedProvider, Preferences, Provider, SessionResponse,
};
use crate::services::email::Mailer;
use crate::services::jwt::{AccessClaims, IssuedTokens, JwtService};
use crate::services::sessions::SessionService;
use crate::services::verification::VerificationService;
use crate::services::ServiceError;
use crate::store::DynStore;
use crate::utils::ids::{generate_account_id, suffixed_name, MAX_UNIQUE_ATTEMPTS};
use crate::utils::{hash_password, verify_password, Password, PasswordHashString};
use chrono::Duration;
use uuid::Uuid;

/// A finished login: sanitized account plus both tokens.
#[derive(Debug, Serialize)]
pub struct CompletedLogin {
    pub account: AccountResponse,
    pub tokens: IssuedTokens,
}

/// Outcome of the password step.
#[derive(Debug)]
pub enum LoginOutcome {
    /// Password was correct but a second factor is required. No session
    /// and no tokens exist yet.
    MfaRequired,
    LoggedIn(CompletedLogin),
}

#[derive(Debug)]
pub struct RegisterOutcome {
    pub account: AccountResponse,
    pub email_sent: bool,
}

#[derive(Debug)]
pub struct RefreshOutcome {
    pub access_token: String,
    /// Present only when the sliding-window policy renewed the session.
    pub new_refresh_token: Option<String>,
}

/// What an identity provider asserts about a federated login. The subject
/// id and email are taken as verified by the provider.
pub struct FederatedIdentity {
    pub provider: Provider,
    pub subject_id: String,
    pub email: String,
    pub name: String,
}

#[derive(Clone)]
pub struct AuthService {
    store: DynStore,
    mailer: Arc<dyn Mailer>,
    jwt: JwtService,
    sessions: SessionService,
    verification: VerificationService,
    config: Arc<AuthConfig>,
}

impl AuthService {
    pub fn new(
        store: DynStore,
        mailer: Arc<dyn Mailer>,
        jwt: JwtService,
        sessions: SessionService,
        verification: VerificationService,
        config: Arc<AuthConfig>,
    ) -> Self {
        Self {
            store,
            mailer,
            jwt,
            sessions,
            verification,
            config,
        }
    }

    fn email_code_ttl(&self) -> Duration {
        Duration::seconds(self.config.verification.email_code_ttl_secs)
    }

    fn reset_code_ttl(&self) -> Duration {
        Duration::seconds(self.config.verification.reset_code_ttl_secs)
    }

    fn verify_email_link(&self, code: &str) -> String {
        format!("{}/verify-email?code={}", self.config.frontend_base_url, code)
    }

    async fn generate_unique_account_id(&self) -> Result<String, ServiceError> {
        for _ in 0..MAX_UNIQUE_ATTEMPTS {
            let id = generate_account_id();
            if self.store.find_account_by_id(&id).await?.is_none() {
                return Ok(id);
            }
        }
        Err(ServiceError::Internal(anyhow::anyhow!(
            "could not allocate a unique account id"
        )))
    }

    async fn unique_display_name(&self, base: &str) -> Result<String, ServiceError> {
        if self.store.find_account_by_name(base).await?.is_none() {
            return Ok(base.to_string());
        }
        for _ in 0..MAX_UNIQUE_ATTEMPTS {
            let candidate = suffixed_name(base);
            if self.store.find_account_by_name(&candidate).await?.is_none() {
                return Ok(candidate);
            }
        }
        Err(ServiceError::Internal(anyhow::anyhow!(
            "could not allocate a unique display name for {}",
            base
        )))
    }

    // ==================== Register ====================

    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterOutcome, ServiceError> {
        let email = req.email.trim().to_lowercase();

        if self.store.find_account_by_email(&email).await?.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }
        if self.store.find_account_by_name(&req.name).await?.is_some() {
            return Err(ServiceError::NameAlreadyTaken);
        }

        let id = self.generate_unique_account_id().await?;
        let password_hash = hash_password(&Password::new(req.password))?;

        let account = Account::new(id, req.name, email, Some(password_hash.into_string()));
        let provider = LinkedProvider::local(account.id.clone());
        let preferences = Preferences::new(account.id.clone());
        let code = self
            .verification
            .mint(&account.id, CodePurpose::EmailVerification, self.email_code_ttl())
            .await?;

        // Account, provider, preferences and the initial code land together
        // or not at all.
        self.store
            .create_account(&account, &provider, &preferences, Some(&code))
            .await?;

        tracing::info!(account_id = %account.id, "Account registered");

        // Best-effort dispatch: a failed email must not roll back the
        // account, but the caller gets a distinguishable warning.
        let link = self.verify_email_link(&code.code);
        let email_sent = match self.mailer.send_verification_email(&account.email, &link).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(account_id = %account.id, error = %e, "Verification email failed");
                false
            }
        };

        Ok(RegisterOutcome {
            account: account.sanitized(),
            email_sent,
        })
    }

    // ==================== Login ====================

    pub async fn login(
        &self,
        req: LoginRequest,
        user_agent: Option<String>,
    ) -> Result<LoginOutcome, ServiceError> {
        let detail = self
            .store
            .find_account_detail_by_email(req.email.trim())
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        // Unknown account, federated account and wrong password all fail
        // identically, so the response cannot be used to enumerate emails.
        if !detail.provider.is_local() {
            return Err(ServiceError::InvalidCredentials);
        }
        let Some(stored_hash) = detail.account.password_hash.clone() else {
            return Err(ServiceError::InvalidCredentials);
        };

        let matches = verify_password(
            &Password::new(req.password),
            &PasswordHashString::new(stored_hash),
        )?;
        if !matches {
            return Err(ServiceError::InvalidCredentials);
        }

        // Second factor gates session creation entirely.
        if detail.preferences.mfa_enabled {
            return Ok(LoginOutcome::MfaRequired);
        }

        let account = detail.account;
        let session = self
            .sessions
            .create(&account.id, user_agent, &account.role)
            .await?;
        let tokens = self.jwt.issue_pair(&account.id, session.id, &session.role)?;

        tracing::info!(account_id = %account.id, "Login successful");

        Ok(LoginOutcome::LoggedIn(CompletedLogin {
            account: account.sanitized(),
            tokens,
        }))
    }

    // ==================== Refresh ====================

    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshOutcome, ServiceError> {
        let claims = self
            .jwt
            .verify_refresh(refresh_token)
            .map_err(|_| ServiceError::InvalidToken)?;

        let session = self
            .sessions
            .find_active(claims.sid)
            .await?
            .ok_or(ServiceError::SessionExpired)?;

        let (session, renewed) = self.sessions.renew_if_near(session).await?;

        let new_refresh_token = if renewed {
            Some(self.jwt.sign_refresh(session.id)?)
        } else {
            None
        };
        // The access token is always fresh, bound to the role snapshot the
        // session was created with.
        let access_token =
            self.jwt
                .sign_access(&session.account_id, session.id, &session.role)?;

        Ok(RefreshOutcome {
            access_token,
            new_refresh_token,
        })
    }

    // ==================== Logout ====================

    pub async fn logout(&self, claims: &AccessClaims) -> Result<(), ServiceError> {
        self.sessions.revoke(claims.sid, &claims.sub).await
    }

    // ==================== Email verification ====================

    pub async fn verify_email(&self, code: &str) -> Result<(), ServiceError> {
        let account_id = self
            .verification
            .consume(code, CodePurpose::EmailVerification)
            .await?;

        if !self.store.set_email_verified(&account_id).await? {
            return Err(ServiceError::AccountNotFound);
        }

        tracing::info!(account_id = %account_id, "Email verified");
        Ok(())
    }

    /// Anti-enumeration: unknown and already-verified emails return the
    /// same success as the real thing.
    pub async fn resend_verification(&self, email: &str) -> Result<(), ServiceError> {
        let Some(detail) = self.store.find_account_detail_by_email(email).await? else {
            tracing::debug!("Resend verification for unknown email");
            return Ok(());
        };
        if detail.account.email_verified {
            return Ok(());
        }

        if self
            .verification
            .rate_limited(&detail.account.id, CodePurpose::EmailVerification)
            .await?
        {
            return Err(ServiceError::TooManyRequests {
                retry_after_secs: self.verification.retry_after_secs(),
            });
        }

        let code = self
            .verification
            .issue(
                &detail.account.id,
                CodePurpose::EmailVerification,
                self.email_code_ttl(),
            )
            .await?;

        let link = self.verify_email_link(&code.code);
        if let Err(e) = self
            .mailer
            .send_verification_email(&detail.account.email, &link)
            .await
        {
            tracing::warn!(account_id = %detail.account.id, error = %e, "Resend verification email failed");
        }
        Ok(())
    }

    // ==================== Password reset ====================

    /// Unknown and federated emails get the generic success; for real local
    /// accounts the rate limit and mailer outcomes are reported distinctly,
    /// and a failed dispatch is fatal since the email is the only way the
    /// reset link reaches the user.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ServiceError> {
        let Some(detail) = self.store.find_account_detail_by_email(email).await? else {
            tracing::debug!("Password reset for unknown email");
            return Ok(());
        };
        if !detail.provider.is_local() || detail.account.password_hash.is_none() {
            tracing::debug!(account_id = %detail.account.id, "Password reset for federated account");
            return Ok(());
        }

        if self
            .verification
            .rate_limited(&detail.account.id, CodePurpose::PasswordReset)
            .await?
        {
            return Err(ServiceError::TooManyRequests {
                retry_after_secs: self.verification.retry_after_secs(),
            });
        }

        let code = self
            .verification
            .issue(
                &detail.account.id,
                CodePurpose::PasswordReset,
                self.reset_code_ttl(),
            )
            .await?;

        let link = format!(
            "{}/reset-password?code={}&exp={}",
            self.config.frontend_base_url,
            code.code,
            code.expires_at.timestamp_millis()
        );
        self.mailer
            .send_password_reset_email(&detail.account.email, &link)
            .await?;

        tracing::info!(account_id = %detail.account.id, "Password reset requested");
        Ok(())
    }

    pub async fn reset_password(&self, code: &str, password: String) -> Result<(), ServiceError> {
        let account_id = self
            .verification
            .consume(code, CodePurpose::PasswordReset)
            .await?;

        let password_hash = hash_password(&Password::new(password))?;
        self.store
            .update_password(&account_id, password_hash.as_str())
            .await?;

        // Stolen-password mitigation: every device has to log in again.
        self.sessions.revoke_all(&account_id).await?;

        tracing::info!(account_id = %account_id, "Password reset completed");
        Ok(())
    }

    // ==================== Federated login ====================

    pub async fn federated_login(
        &self,
        identity: FederatedIdentity,
        user_agent: Option<String>,
    ) -> Result<CompletedLogin, ServiceError> {
        let email = identity.email.trim().to_lowercase();

        let account = match self.store.find_account_by_email(&email).await? {
            Some(existing) => existing,
            None => {
                let id = self.generate_unique_account_id().await?;
                let name = self.unique_display_name(&identity.name).await?;

                let mut account = Account::new(id, name, email, None);
                // The identity provider vouched for the address.
                account.email_verified = true;

                let provider = LinkedProvider::federated(
                    account.id.clone(),
                    identity.provider,
                    identity.subject_id,
                );
                let preferences = Preferences::new(account.id.clone());
                self.store
                    .create_account(&account, &provider, &preferences, None)
                    .await?;

                tracing::info!(
                    account_id = %account.id,
                    provider = identity.provider.as_str(),
                    "Federated account created"
                );
                account
            }
        };

        let session = self
            .sessions
            .create(&account.id, user_agent, &account.role)
            .await?;
        let tokens = self.jwt.issue_pair(&account.id, session.id, &session.role)?;

        Ok(CompletedLogin {
            account: account.sanitized(),
            tokens,
        })
    }

    // ==================== Session introspection ====================

    pub async fn list_sessions(
        &self,
        claims: &AccessClaims,
    ) -> Result<Vec<SessionResponse>, ServiceError> {
        let sessions = self.sessions.list_active(&claims.sub).await?;
        Ok(sessions
            .iter()
            .map(|s| SessionResponse::from_session(s, claims.sid))
            .collect())
    }

    pub async fn current_session(
        &self,
        claims: &AccessClaims,
    ) -> Result<AccountResponse, ServiceError> {
        let session = self
            .sessions
            .find_active(claims.sid)
            .await?
            .ok_or(ServiceError::SessionNotFound)?;

        let account = self
            .store
            .find_account_by_id(&session.account_id)
            .await?
            .ok_or(ServiceError::AccountNotFound)?;

        Ok(account.sanitized())
    }

    pub async fn revoke_session(
        &self,
        session_id: Uuid,
        claims: &AccessClaims,
    ) -> Result<(), ServiceError> {
        self.sessions.revoke(session_id, &claims.sub).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::email::MockMailer;
    use crate::store::{AuthStore, MemoryStore};
    use chrono::Utc;

    struct Harness {
        auth: AuthService,
        store: Arc<MemoryStore>,
        mailer: Arc<MockMailer>,
        jwt: JwtService,
    }

    fn harness_with_mailer(mailer: MockMailer) -> Harness {
        let config = Arc::new(AuthConfig::for_tests());
        let store = Arc::new(MemoryStore::new());
        let mailer = Arc::new(mailer);
        let jwt = JwtService::new(&config.jwt);
        let sessions = SessionService::new(store.clone(), &config);
        let verification = VerificationService::new(store.clone(), &config);
        let auth = AuthService::new(
            store.clone(),
            mailer.clone(),
            jwt.clone(),
            sessions,
            verification,
            config,
        );
        Harness {
            auth,
            store,
            mailer,
            jwt,
        }
    }

    fn harness() -> Harness {
        harness_with_mailer(MockMailer::new())
    }

    fn register_request() -> RegisterRequest {
        RegisterRequest {
            name: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password: "Passw0rd1".to_string(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    /// Pull the verification/reset code out of the last emailed link.
    fn code_from_link(link: &str) -> String {
        link.split("code=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn register_then_login_owns_a_session() {
        let h = harness();

        let outcome = h.auth.register(register_request()).await.unwrap();
        assert!(outcome.email_sent);
        assert!(!outcome.account.email_verified);

        let login = h
            .auth
            .login(login_request("alice@x.com", "Passw0rd1"), None)
            .await
            .unwrap();
        let LoginOutcome::LoggedIn(login) = login else {
            panic!("expected a completed login");
        };
        assert_eq!(login.account.id, outcome.account.id);

        let sessions = h
            .store
            .active_sessions_for_account(&outcome.account.id)
            .await
            .unwrap();
        assert_eq!(sessions.len(), 1);

        // The access token binds account, session and role.
        let claims = h.jwt.verify_access(&login.tokens.access_token).unwrap();
        assert_eq!(claims.sub, outcome.account.id);
        assert_eq!(claims.sid, sessions[0].id);
        assert_eq!(claims.role, "USER");
    }

    #[tokio::test]
    async fn duplicate_email_and_name_are_conflicts() {
        let h = harness();
        h.auth.register(register_request()).await.unwrap();

        let mut dup = register_request();
        dup.name = "someone-else".to_string();
        assert!(matches!(
            h.auth.register(dup).await.unwrap_err(),
            ServiceError::EmailAlreadyRegistered
        ));

        let mut dup = register_request();
        dup.email = "other@x.com".to_string();
        assert!(matches!(
            h.auth.register(dup).await.unwrap_err(),
            ServiceError::NameAlreadyTaken
        ));
    }

    #[tokio::test]
    async fn registration_survives_mailer_outage() {
        let h = harness_with_mailer(MockMailer::failing());

        let outcome = h.auth.register(register_request()).await.unwrap();
        assert!(!outcome.email_sent);

        // The account and its verification code still exist.
        assert!(h
            .store
            .find_account_by_email("alice@x.com")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn wrong_password_is_generic_and_creates_nothing() {
        let h = harness();
        let outcome = h.auth.register(register_request()).await.unwrap();

        let err = h
            .auth
            .login(login_request("alice@x.com", "WrongPass1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));

        let err = h
            .auth
            .login(login_request("nobody@x.com", "Passw0rd1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));

        assert!(h
            .store
            .active_sessions_for_account(&outcome.account.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn federated_account_cannot_password_login() {
        let h = harness();
        h.auth
            .federated_login(
                FederatedIdentity {
                    provider: Provider::Google,
                    subject_id: "google-sub-1".to_string(),
                    email: "fed@x.com".to_string(),
                    name: "fred".to_string(),
                },
                None,
            )
            .await
            .unwrap();

        let err = h
            .auth
            .login(login_request("fed@x.com", "whatever1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn mfa_enabled_login_yields_only_mfa_required() {
        let h = harness();
        let outcome = h.auth.register(register_request()).await.unwrap();

        h.store
            .store_mfa_secret_if_absent(&outcome.account.id, "JBSWY3DPEHPK3PXP")
            .await
            .unwrap();
        h.store.enable_mfa(&outcome.account.id).await.unwrap();

        let login = h
            .auth
            .login(login_request("alice@x.com", "Passw0rd1"), None)
            .await
            .unwrap();
        assert!(matches!(login, LoginOutcome::MfaRequired));

        // No session, no tokens.
        assert!(h
            .store
            .active_sessions_for_account(&outcome.account.id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn refresh_far_from_expiry_reuses_the_token() {
        let h = harness();
        h.auth.register(register_request()).await.unwrap();
        let LoginOutcome::LoggedIn(login) = h
            .auth
            .login(login_request("alice@x.com", "Passw0rd1"), None)
            .await
            .unwrap()
        else {
            panic!("expected login");
        };

        let claims = h.jwt.verify_refresh(&login.tokens.refresh_token).unwrap();
        let before = h.store.find_active_session(claims.sid).await.unwrap().unwrap();

        let outcome = h.auth.refresh(&login.tokens.refresh_token).await.unwrap();
        assert!(outcome.new_refresh_token.is_none());
        assert!(!outcome.access_token.is_empty());

        let after = h.store.find_active_session(claims.sid).await.unwrap().unwrap();
        assert_eq!(before.expires_at, after.expires_at);
    }

    #[tokio::test]
    async fn refresh_near_expiry_renews_session_and_token() {
        let h = harness();
        h.auth.register(register_request()).await.unwrap();
        let LoginOutcome::LoggedIn(login) = h
            .auth
            .login(login_request("alice@x.com", "Passw0rd1"), None)
            .await
            .unwrap()
        else {
            panic!("expected login");
        };

        let claims = h.jwt.verify_refresh(&login.tokens.refresh_token).unwrap();
        h.store
            .extend_session(claims.sid, Utc::now() + Duration::hours(1))
            .await
            .unwrap();

        let before = Utc::now();
        let outcome = h.auth.refresh(&login.tokens.refresh_token).await.unwrap();
        let new_refresh = outcome.new_refresh_token.expect("renewal issues a new token");
        assert_ne!(new_refresh, login.tokens.refresh_token);

        let session = h.store.find_active_session(claims.sid).await.unwrap().unwrap();
        let expected = before + Duration::seconds(AuthConfig::for_tests().jwt.refresh_ttl_secs);
        assert!((session.expires_at - expected).num_seconds().abs() <= 5);
    }

    #[tokio::test]
    async fn refresh_rejects_access_tokens_and_dead_sessions() {
        let h = harness();
        h.auth.register(register_request()).await.unwrap();
        let LoginOutcome::LoggedIn(login) = h
            .auth
            .login(login_request("alice@x.com", "Passw0rd1"), None)
            .await
            .unwrap()
        else {
            panic!("expected login");
        };

        // Secret separation: an access token is not a refresh token.
        let err = h.auth.refresh(&login.tokens.access_token).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidToken));

        // A logged-out session cannot be refreshed.
        let claims = h.jwt.verify_access(&login.tokens.access_token).unwrap();
        h.auth.logout(&claims).await.unwrap();
        let err = h.auth.refresh(&login.tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, ServiceError::SessionExpired));
    }

    #[tokio::test]
    async fn logout_deletes_exactly_the_one_session() {
        let h = harness();
        h.auth.register(register_request()).await.unwrap();
        let LoginOutcome::LoggedIn(first) = h
            .auth
            .login(login_request("alice@x.com", "Passw0rd1"), None)
            .await
            .unwrap()
        else {
            panic!("expected login");
        };
        let LoginOutcome::LoggedIn(_second) = h
            .auth
            .login(login_request("alice@x.com", "Passw0rd1"), None)
            .await
            .unwrap()
        else {
            panic!("expected login");
        };

        let claims = h.jwt.verify_access(&first.tokens.access_token).unwrap();
        h.auth.logout(&claims).await.unwrap();

        let remaining = h
            .store
            .active_sessions_for_account(&claims.sub)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_ne!(remaining[0].id, claims.sid);

        // Logging out the same session twice reports the miss.
        let err = h.auth.logout(&claims).await.unwrap_err();
        assert!(matches!(err, ServiceError::SessionNotFound));
    }

    #[tokio::test]
    async fn email_verification_scenario() {
        let h = harness();
        let outcome = h.auth.register(register_request()).await.unwrap();
        assert!(!outcome.account.email_verified);

        let code = code_from_link(&h.mailer.links()[0]);
        h.auth.verify_email(&code).await.unwrap();

        let account = h
            .store
            .find_account_by_id(&outcome.account.id)
            .await
            .unwrap()
            .unwrap();
        assert!(account.email_verified);

        // Single-use: the code cannot be consumed again.
        let err = h.auth.verify_email(&code).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidOrExpiredCode));
    }

    #[tokio::test]
    async fn resend_is_generic_for_unknown_and_verified() {
        let h = harness();
        h.auth.resend_verification("nobody@x.com").await.unwrap();

        let _ = h.auth.register(register_request()).await.unwrap();
        let code = code_from_link(&h.mailer.links()[0]);
        h.auth.verify_email(&code).await.unwrap();

        let sent_before = h.mailer.links().len();
        h.auth.resend_verification("alice@x.com").await.unwrap();
        // Already verified: generic success, nothing dispatched.
        assert_eq!(h.mailer.links().len(), sent_before);
    }

    #[tokio::test]
    async fn resend_hits_the_issue_limit() {
        let h = harness();
        h.auth.register(register_request()).await.unwrap();

        // Registration already issued one code; the second fills the
        // window of two.
        h.auth.resend_verification("alice@x.com").await.unwrap();

        let err = h
            .auth
            .resend_verification("alice@x.com")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::TooManyRequests { .. }));
    }

    #[tokio::test]
    async fn forgot_password_mailer_failure_is_fatal() {
        let h = harness_with_mailer(MockMailer::failing());
        // Registration tolerates the outage...
        h.auth.register(register_request()).await.unwrap();

        // ...forgot-password must not.
        let err = h.auth.forgot_password("alice@x.com").await.unwrap_err();
        assert!(matches!(err, ServiceError::Store(_)));
    }

    #[tokio::test]
    async fn forgot_password_link_carries_code_and_expiry() {
        let h = harness();
        h.auth.register(register_request()).await.unwrap();
        h.auth.forgot_password("alice@x.com").await.unwrap();

        let link = h.mailer.links().last().unwrap().clone();
        assert!(link.contains("/reset-password?code="));
        assert!(link.contains("&exp="));
    }

    #[tokio::test]
    async fn forgot_password_is_generic_for_unknown_and_federated() {
        let h = harness();
        h.auth.forgot_password("nobody@x.com").await.unwrap();

        h.auth
            .federated_login(
                FederatedIdentity {
                    provider: Provider::Google,
                    subject_id: "google-sub-2".to_string(),
                    email: "fed@x.com".to_string(),
                    name: "fred".to_string(),
                },
                None,
            )
            .await
            .unwrap();
        h.auth.forgot_password("fed@x.com").await.unwrap();
        assert!(h.mailer.links().is_empty());
    }

    #[tokio::test]
    async fn reset_password_rotates_credentials_and_sessions() {
        let h = harness();
        let outcome = h.auth.register(register_request()).await.unwrap();
        h.auth
            .login(login_request("alice@x.com", "Passw0rd1"), None)
            .await
            .unwrap();
        h.auth
            .login(login_request("alice@x.com", "Passw0rd1"), None)
            .await
            .unwrap();

        h.auth.forgot_password("alice@x.com").await.unwrap();
        let code = code_from_link(&h.mailer.links().last().unwrap().clone());

        h.auth
            .reset_password(&code, "NewPassw0rd2".to_string())
            .await
            .unwrap();

        // Every session is gone.
        assert!(h
            .store
            .active_sessions_for_account(&outcome.account.id)
            .await
            .unwrap()
            .is_empty());

        // Old password dead, new one works, code is spent.
        assert!(matches!(
            h.auth
                .login(login_request("alice@x.com", "Passw0rd1"), None)
                .await
                .unwrap_err(),
            ServiceError::InvalidCredentials
        ));
        assert!(matches!(
            h.auth
                .login(login_request("alice@x.com", "NewPassw0rd2"), None)
                .await
                .unwrap(),
            LoginOutcome::LoggedIn(_)
        ));
        assert!(matches!(
            h.auth
                .reset_password(&code, "Another0ne3".to_string())
                .await
                .unwrap_err(),
            ServiceError::InvalidOrExpiredCode
        ));
    }

    #[tokio::test]
    async fn federated_login_creates_then_reuses_the_account() {
        let h = harness();
        let identity = || FederatedIdentity {
            provider: Provider::Google,
            subject_id: "google-sub-3".to_string(),
            email: "carol@x.com".to_string(),
            name: "carol".to_string(),
        };

        let first = h.auth.federated_login(identity(), None).await.unwrap();
        let second = h.auth.federated_login(identity(), None).await.unwrap();
        assert_eq!(first.account.id, second.account.id);

        // Federated accounts never get a password hash.
        let account = h
            .store
            .find_account_by_id(&first.account.id)
            .await
            .unwrap()
            .unwrap();
        assert!(account.password_hash.is_none());
        assert!(account.email_verified);

        // One session per federated login.
        assert_eq!(
            h.store
                .active_sessions_for_account(&first.account.id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn federated_name_collision_gets_a_suffix() {
        let h = harness();
        h.auth.register(register_request()).await.unwrap();

        let login = h
            .auth
            .federated_login(
                FederatedIdentity {
                    provider: Provider::Google,
                    subject_id: "google-sub-4".to_string(),
                    email: "alice.other@x.com".to_string(),
                    name: "alice".to_string(),
                },
                None,
            )
            .await
            .unwrap();

        assert_ne!(login.account.name, "alice");
        assert!(login.account.name.starts_with("alice"));
    }

    #[tokio::test]
    async fn session_introspection_and_scoped_revoke() {
        let h = harness();
        h.auth.register(register_request()).await.unwrap();
        let LoginOutcome::LoggedIn(login) = h
            .auth
            .login(
                login_request("alice@x.com", "Passw0rd1"),
                Some("firefox".to_string()),
            )
            .await
            .unwrap()
        else {
            panic!("expected login");
        };
        let claims = h.jwt.verify_access(&login.tokens.access_token).unwrap();

        let listed = h.auth.list_sessions(&claims).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].is_current);
        assert_eq!(listed[0].user_agent.as_deref(), Some("firefox"));

        let me = h.auth.current_session(&claims).await.unwrap();
        assert_eq!(me.id, claims.sub);

        // A stranger cannot revoke it.
        let mut stranger = claims.clone();
        stranger.sub = "0000000000".to_string();
        let err = h
            .auth
            .revoke_session(claims.sid, &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::SessionNotFound));
        assert_eq!(h.auth.list_sessions(&claims).await.unwrap().len(), 1);

        // The owner can.
        h.auth.revoke_session(claims.sid, &claims).await.unwrap();
        assert!(h.auth.list_sessions(&claims).await.unwrap().is_empty());
    }
}

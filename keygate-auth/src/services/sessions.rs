//! Session ledger: the durable record of logins per device.

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::models::Session;
use crate::services::ServiceError;
use crate::store::DynStore;

#[derive(Clone)]
pub struct SessionService {
    store: DynStore,
    refresh_ttl: Duration,
    renewal_threshold: Duration,
}

impl SessionService {
    pub fn new(store: DynStore, config: &AuthConfig) -> Self {
        Self {
            store,
            refresh_ttl: Duration::seconds(config.jwt.refresh_ttl_secs),
            renewal_threshold: Duration::seconds(config.session.renewal_threshold_secs),
        }
    }

    /// Record a new login.
    pub async fn create(
        &self,
        account_id: &str,
        user_agent: Option<String>,
        role: &str,
    ) -> Result<Session, ServiceError> {
        let session = Session::new(
            account_id.to_string(),
            user_agent,
            role.to_string(),
            self.refresh_ttl,
        );
        self.store.insert_session(&session).await?;

        tracing::info!(account_id = %account_id, session_id = %session.id, "Session created");
        Ok(session)
    }

    /// Logically-active lookup; expired rows are treated as absent.
    pub async fn find_active(&self, id: Uuid) -> Result<Option<Session>, ServiceError> {
        Ok(self.store.find_active_session(id).await?)
    }

    /// Sliding-window renewal: only a session close to expiry is extended,
    /// so routine refreshes don't churn the row or mint new refresh tokens.
    ///
    /// Returns the (possibly updated) session and whether it was renewed.
    pub async fn renew_if_near(&self, session: Session) -> Result<(Session, bool), ServiceError> {
        let now = Utc::now();
        if session.expires_at - now >= self.renewal_threshold {
            return Ok((session, false));
        }

        let expires_at = now + self.refresh_ttl;
        self.store.extend_session(session.id, expires_at).await?;

        tracing::debug!(session_id = %session.id, "Session renewed");
        Ok((
            Session {
                expires_at,
                ..session
            },
            true,
        ))
    }

    /// Active sessions for the device-management UI, newest first.
    pub async fn list_active(&self, account_id: &str) -> Result<Vec<Session>, ServiceError> {
        Ok(self.store.active_sessions_for_account(account_id).await?)
    }

    /// Delete exactly one session owned by `account_id`. The ownership
    /// check is part of the delete predicate, not a separate read.
    pub async fn revoke(&self, id: Uuid, account_id: &str) -> Result<(), ServiceError> {
        let deleted = self.store.delete_session(id, account_id).await?;
        if deleted == 0 {
            return Err(ServiceError::SessionNotFound);
        }

        tracing::info!(account_id = %account_id, session_id = %id, "Session revoked");
        Ok(())
    }

    /// Drop every session for the account (password reset).
    pub async fn revoke_all(&self, account_id: &str) -> Result<u64, ServiceError> {
        let deleted = self.store.delete_sessions_for_account(account_id).await?;
        tracing::info!(account_id = %account_id, count = deleted, "All sessions revoked");
        Ok(deleted)
    }
}

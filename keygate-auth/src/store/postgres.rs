//! PostgreSQL implementation of [`AuthStore`] on a sqlx pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keygate_core::error::AppError;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    Account, AccountDetail, LinkedProvider, Preferences, Session, VerificationCode,
};
use crate::store::AuthStore;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }

    async fn load_detail(&self, account: Account) -> Result<Option<AccountDetail>, AppError> {
        let provider = sqlx::query_as::<_, LinkedProvider>(
            "SELECT * FROM linked_providers WHERE account_id = $1",
        )
        .bind(&account.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let preferences =
            sqlx::query_as::<_, Preferences>("SELECT * FROM preferences WHERE account_id = $1")
                .bind(&account.id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        match (provider, preferences) {
            (Some(provider), Some(preferences)) => Ok(Some(AccountDetail {
                account,
                provider,
                preferences,
            })),
            // Bundle creation is transactional, so a missing side row means
            // the database was modified outside this service.
            _ => Err(AppError::DatabaseError(anyhow::anyhow!(
                "account {} is missing its provider or preferences row",
                account.id
            ))),
        }
    }
}

#[async_trait]
impl AuthStore for PgStore {
    async fn find_account_by_id(&self, id: &str) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_account_by_name(&self, name: &str) -> Result<Option<Account>, AppError> {
        sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE name = $1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn find_account_detail_by_id(
        &self,
        id: &str,
    ) -> Result<Option<AccountDetail>, AppError> {
        match self.find_account_by_id(id).await? {
            Some(account) => self.load_detail(account).await,
            None => Ok(None),
        }
    }

    async fn find_account_detail_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountDetail>, AppError> {
        match self.find_account_by_email(email).await? {
            Some(account) => self.load_detail(account).await,
            None => Ok(None),
        }
    }

    async fn create_account(
        &self,
        account: &Account,
        provider: &LinkedProvider,
        preferences: &Preferences,
        initial_code: Option<&VerificationCode>,
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, email, password_hash, role, membership, email_verified, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.role)
        .bind(&account.membership)
        .bind(account.email_verified)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query(
            r#"
            INSERT INTO linked_providers (account_id, provider, external_id, mfa_secret, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&provider.account_id)
        .bind(&provider.provider)
        .bind(&provider.external_id)
        .bind(&provider.mfa_secret)
        .bind(provider.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query(
            r#"
            INSERT INTO preferences (account_id, mfa_enabled, email_notifications)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&preferences.account_id)
        .bind(preferences.mfa_enabled)
        .bind(preferences.email_notifications)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        if let Some(code) = initial_code {
            sqlx::query(
                r#"
                INSERT INTO verification_codes (id, code, account_id, purpose, created_at, expires_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(code.id)
            .bind(&code.code)
            .bind(&code.account_id)
            .bind(&code.purpose)
            .bind(code.created_at)
            .bind(code.expires_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn update_password(
        &self,
        account_id: &str,
        password_hash: &str,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE accounts SET password_hash = $1, updated_at = now() WHERE id = $2")
            .bind(password_hash)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn set_email_verified(&self, account_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE accounts SET email_verified = TRUE, updated_at = now() WHERE id = $1",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected() > 0)
    }

    async fn store_mfa_secret_if_absent(
        &self,
        account_id: &str,
        secret: &str,
    ) -> Result<String, AppError> {
        // Conditional write: the first enrollment wins, later calls read
        // back the stored secret.
        sqlx::query(
            "UPDATE linked_providers SET mfa_secret = $1 WHERE account_id = $2 AND mfa_secret IS NULL",
        )
        .bind(secret)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        let stored: Option<String> =
            sqlx::query_scalar("SELECT mfa_secret FROM linked_providers WHERE account_id = $1")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        stored.ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!(
                "mfa secret missing after conditional write for account {}",
                account_id
            ))
        })
    }

    async fn enable_mfa(&self, account_id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE preferences SET mfa_enabled = TRUE WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn clear_mfa(&self, account_id: &str) -> Result<(), AppError> {
        // Both-or-neither: a disabled flag with a live secret (or the
        // reverse) is a security defect.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query("UPDATE preferences SET mfa_enabled = FALSE WHERE account_id = $1")
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        sqlx::query("UPDATE linked_providers SET mfa_secret = NULL WHERE account_id = $1")
            .bind(account_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, account_id, user_agent, role, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(session.id)
        .bind(&session.account_id)
        .bind(&session.user_agent)
        .bind(&session.role)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn find_active_session(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        sqlx::query_as::<_, Session>(
            "SELECT * FROM sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn extend_session(&self, id: Uuid, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        sqlx::query("UPDATE sessions SET expires_at = $1 WHERE id = $2")
            .bind(expires_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn active_sessions_for_account(
        &self,
        account_id: &str,
    ) -> Result<Vec<Session>, AppError> {
        sqlx::query_as::<_, Session>(
            r#"
            SELECT * FROM sessions
            WHERE account_id = $1 AND expires_at > now()
            ORDER BY created_at DESC
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn delete_session(&self, id: Uuid, account_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = $1 AND account_id = $2")
            .bind(id)
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected())
    }

    async fn delete_sessions_for_account(&self, account_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE account_id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected())
    }

    async fn insert_verification_code(&self, code: &VerificationCode) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO verification_codes (id, code, account_id, purpose, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(code.id)
        .bind(&code.code)
        .bind(&code.account_id)
        .bind(&code.purpose)
        .bind(code.created_at)
        .bind(code.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(())
    }

    async fn code_exists(&self, code: &str) -> Result<bool, AppError> {
        let found: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM verification_codes WHERE code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(found.is_some())
    }

    async fn count_recent_codes(
        &self,
        account_id: &str,
        purpose: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM verification_codes
            WHERE account_id = $1 AND purpose = $2 AND created_at > $3
            "#,
        )
        .bind(account_id)
        .bind(purpose)
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn take_verification_code(
        &self,
        code: &str,
        purpose: &str,
    ) -> Result<Option<VerificationCode>, AppError> {
        sqlx::query_as::<_, VerificationCode>(
            r#"
            DELETE FROM verification_codes
            WHERE code = $1 AND purpose = $2 AND expires_at > now()
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(purpose)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))
    }

    async fn delete_codes_for_account(
        &self,
        account_id: &str,
        purpose: &str,
    ) -> Result<u64, AppError> {
        let result =
            sqlx::query("DELETE FROM verification_codes WHERE account_id = $1 AND purpose = $2")
                .bind(account_id)
                .bind(purpose)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(anyhow::anyhow!(e)))?;
        Ok(result.rows_affected())
    }
}

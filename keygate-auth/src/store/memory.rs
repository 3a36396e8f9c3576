//! In-memory implementation of [`AuthStore`] for unit tests.
//!
//! A single mutex guards all tables, which makes every trait method — the
//! transactional ones included — atomic from a caller's point of view.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keygate_core::error::AppError;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    Account, AccountDetail, LinkedProvider, Preferences, Session, VerificationCode,
};
use crate::store::AuthStore;

#[derive(Default)]
struct Tables {
    accounts: HashMap<String, Account>,
    providers: HashMap<String, LinkedProvider>,
    preferences: HashMap<String, Preferences>,
    sessions: HashMap<Uuid, Session>,
    codes: HashMap<String, VerificationCode>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn conflict(what: &str) -> AppError {
        AppError::Conflict(anyhow::anyhow!("{} already exists", what))
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    async fn find_account_by_id(&self, id: &str) -> Result<Option<Account>, AppError> {
        Ok(self.tables.lock().unwrap().accounts.get(id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_account_by_name(&self, name: &str) -> Result<Option<Account>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.accounts.values().find(|a| a.name == name).cloned())
    }

    async fn find_account_detail_by_id(
        &self,
        id: &str,
    ) -> Result<Option<AccountDetail>, AppError> {
        let tables = self.tables.lock().unwrap();
        let Some(account) = tables.accounts.get(id).cloned() else {
            return Ok(None);
        };
        Ok(Some(AccountDetail {
            provider: tables.providers.get(id).cloned().expect("provider row"),
            preferences: tables.preferences.get(id).cloned().expect("prefs row"),
            account,
        }))
    }

    async fn find_account_detail_by_email(
        &self,
        email: &str,
    ) -> Result<Option<AccountDetail>, AppError> {
        let id = {
            let tables = self.tables.lock().unwrap();
            tables
                .accounts
                .values()
                .find(|a| a.email.eq_ignore_ascii_case(email))
                .map(|a| a.id.clone())
        };
        match id {
            Some(id) => self.find_account_detail_by_id(&id).await,
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
        let mut tables = self.tables.lock().unwrap();

        // Mirror the unique constraints the relational schema enforces.
        if tables.accounts.contains_key(&account.id) {
            return Err(Self::conflict("account id"));
        }
        if tables
            .accounts
            .values()
            .any(|a| a.email.eq_ignore_ascii_case(&account.email))
        {
            return Err(Self::conflict("email"));
        }
        if tables.accounts.values().any(|a| a.name == account.name) {
            return Err(Self::conflict("name"));
        }

        tables.accounts.insert(account.id.clone(), account.clone());
        tables
            .providers
            .insert(account.id.clone(), provider.clone());
        tables
            .preferences
            .insert(account.id.clone(), preferences.clone());
        if let Some(code) = initial_code {
            tables.codes.insert(code.code.clone(), code.clone());
        }
        Ok(())
    }

    async fn update_password(
        &self,
        account_id: &str,
        password_hash: &str,
    ) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(account) = tables.accounts.get_mut(account_id) {
            account.password_hash = Some(password_hash.to_string());
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_email_verified(&self, account_id: &str) -> Result<bool, AppError> {
        let mut tables = self.tables.lock().unwrap();
        match tables.accounts.get_mut(account_id) {
            Some(account) => {
                account.email_verified = true;
                account.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn store_mfa_secret_if_absent(
        &self,
        account_id: &str,
        secret: &str,
    ) -> Result<String, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let provider = tables.providers.get_mut(account_id).ok_or_else(|| {
            AppError::DatabaseError(anyhow::anyhow!("no provider row for {}", account_id))
        })?;
        match &provider.mfa_secret {
            Some(existing) => Ok(existing.clone()),
            None => {
                provider.mfa_secret = Some(secret.to_string());
                Ok(secret.to_string())
            }
        }
    }

    async fn enable_mfa(&self, account_id: &str) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(prefs) = tables.preferences.get_mut(account_id) {
            prefs.mfa_enabled = true;
        }
        Ok(())
    }

    async fn clear_mfa(&self, account_id: &str) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(prefs) = tables.preferences.get_mut(account_id) {
            prefs.mfa_enabled = false;
        }
        if let Some(provider) = tables.providers.get_mut(account_id) {
            provider.mfa_secret = None;
        }
        Ok(())
    }

    async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        tables.sessions.insert(session.id, session.clone());
        Ok(())
    }

    async fn find_active_session(&self, id: Uuid) -> Result<Option<Session>, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .sessions
            .get(&id)
            .filter(|s| s.expires_at > Utc::now())
            .cloned())
    }

    async fn extend_session(&self, id: Uuid, expires_at: DateTime<Utc>) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(session) = tables.sessions.get_mut(&id) {
            session.expires_at = expires_at;
        }
        Ok(())
    }

    async fn active_sessions_for_account(
        &self,
        account_id: &str,
    ) -> Result<Vec<Session>, AppError> {
        let tables = self.tables.lock().unwrap();
        let now = Utc::now();
        let mut sessions: Vec<Session> = tables
            .sessions
            .values()
            .filter(|s| s.account_id == account_id && s.expires_at > now)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn delete_session(&self, id: Uuid, account_id: &str) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let owned = tables
            .sessions
            .get(&id)
            .map(|s| s.account_id == account_id)
            .unwrap_or(false);
        if owned {
            tables.sessions.remove(&id);
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn delete_sessions_for_account(&self, account_id: &str) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.sessions.len();
        tables.sessions.retain(|_, s| s.account_id != account_id);
        Ok((before - tables.sessions.len()) as u64)
    }

    async fn insert_verification_code(&self, code: &VerificationCode) -> Result<(), AppError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.codes.contains_key(&code.code) {
            return Err(Self::conflict("verification code"));
        }
        tables.codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    async fn code_exists(&self, code: &str) -> Result<bool, AppError> {
        Ok(self.tables.lock().unwrap().codes.contains_key(code))
    }

    async fn count_recent_codes(
        &self,
        account_id: &str,
        purpose: &str,
        since: DateTime<Utc>,
    ) -> Result<i64, AppError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .codes
            .values()
            .filter(|c| {
                c.account_id == account_id && c.purpose == purpose && c.created_at > since
            })
            .count() as i64)
    }

    async fn take_verification_code(
        &self,
        code: &str,
        purpose: &str,
    ) -> Result<Option<VerificationCode>, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let matches = tables
            .codes
            .get(code)
            .map(|c| c.purpose == purpose && c.expires_at > Utc::now())
            .unwrap_or(false);
        if matches {
            Ok(tables.codes.remove(code))
        } else {
            Ok(None)
        }
    }

    async fn delete_codes_for_account(
        &self,
        account_id: &str,
        purpose: &str,
    ) -> Result<u64, AppError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.codes.len();
        tables
            .codes
            .retain(|_, c| !(c.account_id == account_id && c.purpose == purpose));
        Ok((before - tables.codes.len()) as u64)
    }
}

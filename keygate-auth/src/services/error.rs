use keygate_core::error::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Store-layer failure, carried through unchanged.
    #[error(transparent)]
    Store(#[from] AppError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Name already taken")]
    NameAlreadyTaken,

    #[error("Invalid or expired verification code")]
    InvalidOrExpiredCode,

    #[error("Invalid MFA code")]
    InvalidMfaCode,

    #[error("MFA not enabled for this account")]
    MfaNotEnabled,

    #[error("MFA setup has not been started")]
    MfaSetupNotStarted,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Session does not exist or has expired")]
    SessionExpired,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Too many requests. Try again later")]
    TooManyRequests { retry_after_secs: u64 },

    #[error("Email error: {0}")]
    EmailError(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(e) => e,
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::NameAlreadyTaken => {
                AppError::Conflict(anyhow::anyhow!("Name already taken"))
            }
            ServiceError::InvalidOrExpiredCode => {
                AppError::InvalidCode(anyhow::anyhow!("Invalid or expired verification code"))
            }
            ServiceError::InvalidMfaCode => {
                AppError::InvalidCode(anyhow::anyhow!("Invalid MFA code"))
            }
            ServiceError::MfaNotEnabled => {
                AppError::Unauthorized(anyhow::anyhow!("MFA not enabled for this account"))
            }
            ServiceError::MfaSetupNotStarted => {
                AppError::BadRequest(anyhow::anyhow!("MFA setup has not been started"))
            }
            ServiceError::InvalidToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
            }
            ServiceError::SessionExpired => {
                AppError::Unauthorized(anyhow::anyhow!("Session does not exist or has expired"))
            }
            ServiceError::SessionNotFound => {
                AppError::NotFound(anyhow::anyhow!("Session not found"))
            }
            ServiceError::AccountNotFound => {
                AppError::NotFound(anyhow::anyhow!("Account not found"))
            }
            ServiceError::TooManyRequests { retry_after_secs } => AppError::TooManyRequests(
                "Too many requests. Try again later".to_string(),
                Some(retry_after_secs),
            ),
            ServiceError::EmailError(e) => AppError::EmailError(e),
        }
    }
}

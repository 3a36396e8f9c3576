use keygate_core::config::{get_env, get_env_parse};
use keygate_core::error::AppError;
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub port: u16,
    pub database_url: String,
    pub frontend_base_url: String,
    /// Prefix every route is nested under, e.g. `/api/v1`.
    pub base_path: String,
    pub allowed_origins: Vec<String>,
    pub jwt: JwtConfig,
    pub session: SessionConfig,
    pub verification: VerificationConfig,
    pub mfa: MfaConfig,
    pub smtp: SmtpConfig,
    pub google: GoogleOAuthConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret for access tokens. Deliberately distinct from the refresh
    /// secret so a leaked access-signing key cannot mint refresh tokens.
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// A refresh inside this trailing window extends the session; outside
    /// it the session row is left untouched.
    pub renewal_threshold_secs: i64,
}

#[derive(Debug, Clone)]
pub struct VerificationConfig {
    pub email_code_ttl_secs: i64,
    pub reset_code_ttl_secs: i64,
    pub rate_limit_window_secs: i64,
    pub rate_limit_max_attempts: i64,
}

#[derive(Debug, Clone)]
pub struct MfaConfig {
    /// Issuer label shown in authenticator apps.
    pub issuer: String,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub register_attempts: u32,
    pub register_window_seconds: u64,
    pub forgot_password_attempts: u32,
    pub forgot_password_window_seconds: u64,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        Ok(AuthConfig {
            environment,
            service_name: get_env("SERVICE_NAME", Some("keygate-auth"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            port: get_env_parse("PORT", Some("3000"), is_prod)?,
            database_url: get_env("DATABASE_URL", None, is_prod)?,
            frontend_base_url: get_env(
                "FRONTEND_BASE_URL",
                Some("http://localhost:5173"),
                is_prod,
            )?,
            base_path: get_env("BASE_PATH", Some("/api/v1"), is_prod)?,
            allowed_origins: get_env("ALLOWED_ORIGINS", Some("http://localhost:5173"), is_prod)?
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            jwt: JwtConfig {
                access_secret: get_env("JWT_SECRET", None, is_prod)?,
                refresh_secret: get_env("JWT_REFRESH_SECRET", None, is_prod)?,
                access_ttl_secs: get_env_parse("JWT_ACCESS_TTL_SECONDS", Some("3600"), is_prod)?,
                refresh_ttl_secs: get_env_parse(
                    "JWT_REFRESH_TTL_SECONDS",
                    Some("2592000"),
                    is_prod,
                )?,
            },
            session: SessionConfig {
                renewal_threshold_secs: get_env_parse(
                    "SESSION_RENEWAL_THRESHOLD_SECONDS",
                    Some("86400"),
                    is_prod,
                )?,
            },
            verification: VerificationConfig {
                email_code_ttl_secs: get_env_parse(
                    "EMAIL_CODE_TTL_SECONDS",
                    Some("2700"),
                    is_prod,
                )?,
                reset_code_ttl_secs: get_env_parse(
                    "RESET_CODE_TTL_SECONDS",
                    Some("3600"),
                    is_prod,
                )?,
                rate_limit_window_secs: get_env_parse(
                    "CODE_RATE_LIMIT_WINDOW_SECONDS",
                    Some("600"),
                    is_prod,
                )?,
                rate_limit_max_attempts: get_env_parse(
                    "CODE_RATE_LIMIT_MAX_ATTEMPTS",
                    Some("2"),
                    is_prod,
                )?,
            },
            mfa: MfaConfig {
                issuer: get_env("MFA_ISSUER", Some("keygate"), is_prod)?,
            },
            smtp: SmtpConfig {
                host: get_env("SMTP_HOST", Some("smtp.gmail.com"), is_prod)?,
                port: get_env_parse("SMTP_PORT", Some("587"), is_prod)?,
                user: get_env("SMTP_USER", None, is_prod)?,
                password: get_env("SMTP_PASSWORD", None, is_prod)?,
                from: get_env("MAILER_SENDER", None, is_prod)?,
            },
            google: GoogleOAuthConfig {
                client_id: get_env("GOOGLE_CLIENT_ID", None, is_prod)?,
                client_secret: get_env("GOOGLE_CLIENT_SECRET", None, is_prod)?,
                redirect_uri: get_env("GOOGLE_REDIRECT_URI", None, is_prod)?,
            },
            rate_limit: RateLimitConfig {
                login_attempts: get_env_parse("RATE_LIMIT_LOGIN_ATTEMPTS", Some("5"), is_prod)?,
                login_window_seconds: get_env_parse(
                    "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
                register_attempts: get_env_parse(
                    "RATE_LIMIT_REGISTER_ATTEMPTS",
                    Some("3"),
                    is_prod,
                )?,
                register_window_seconds: get_env_parse(
                    "RATE_LIMIT_REGISTER_WINDOW_SECONDS",
                    Some("3600"),
                    is_prod,
                )?,
                forgot_password_attempts: get_env_parse(
                    "RATE_LIMIT_FORGOT_PASSWORD_ATTEMPTS",
                    Some("3"),
                    is_prod,
                )?,
                forgot_password_window_seconds: get_env_parse(
                    "RATE_LIMIT_FORGOT_PASSWORD_WINDOW_SECONDS",
                    Some("900"),
                    is_prod,
                )?,
            },
        })
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }
}

#[cfg(test)]
impl AuthConfig {
    /// Fixed configuration for unit tests; no env access.
    pub fn for_tests() -> Self {
        AuthConfig {
            environment: Environment::Dev,
            service_name: "keygate-auth".to_string(),
            log_level: "debug".to_string(),
            port: 3000,
            database_url: "postgres://localhost/keygate_test".to_string(),
            frontend_base_url: "http://localhost:5173".to_string(),
            base_path: "/api/v1".to_string(),
            allowed_origins: vec!["http://localhost:5173".to_string()],
            jwt: JwtConfig {
                access_secret: "access-test-secret".to_string(),
                refresh_secret: "refresh-test-secret".to_string(),
                access_ttl_secs: 3600,
                refresh_ttl_secs: 30 * 24 * 3600,
            },
            session: SessionConfig {
                renewal_threshold_secs: 86400,
            },
            verification: VerificationConfig {
                email_code_ttl_secs: 2700,
                reset_code_ttl_secs: 3600,
                rate_limit_window_secs: 600,
                rate_limit_max_attempts: 2,
            },
            mfa: MfaConfig {
                issuer: "keygate".to_string(),
            },
            smtp: SmtpConfig {
                host: "localhost".to_string(),
                port: 587,
                user: "test@example.com".to_string(),
                password: "password".to_string(),
                from: "keygate <test@example.com>".to_string(),
            },
            google: GoogleOAuthConfig {
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
                redirect_uri: "http://localhost:3000/api/v1/auth/google/callback".to_string(),
            },
            rate_limit: RateLimitConfig {
                login_attempts: 5,
                login_window_seconds: 900,
                register_attempts: 3,
                register_window_seconds: 3600,
                forgot_password_attempts: 3,
                forgot_password_window_seconds: 900,
            },
        }
    }
}

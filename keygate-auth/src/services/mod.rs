pub mod auth;
pub mod email;
pub mod error;
pub mod jwt;
pub mod mfa;
pub mod sessions;
pub mod verification;

pub use auth::{AuthService, CompletedLogin, FederatedIdentity, LoginOutcome};
pub use email::{Mailer, MockMailer, SmtpMailer};
pub use error::ServiceError;
pub use jwt::{AccessClaims, IssuedTokens, JwtService, RefreshClaims, TokenError};
pub use mfa::{MfaService, MfaSetup, MfaStatus};
pub use sessions::SessionService;
pub use verification::VerificationService;

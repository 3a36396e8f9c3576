pub mod account;
pub mod linked_provider;
pub mod preferences;
pub mod session;
pub mod verification_code;

pub use account::{Account, AccountResponse, Membership, Role};
pub use linked_provider::{LinkedProvider, Provider};
pub use preferences::Preferences;
pub use session::{Session, SessionResponse};
pub use verification_code::{CodePurpose, VerificationCode};

/// An account joined with its provider record and preferences.
///
/// Most flows need all three rows together (login checks the provider and
/// the MFA flag, MFA setup reads the secret), so the store returns them as
/// one unit.
#[derive(Debug, Clone)]
pub struct AccountDetail {
    pub account: Account,
    pub provider: LinkedProvider,
    pub preferences: Preferences,
}

impl AccountDetail {
    /// Whether the MFA state machine is in the ENABLED state.
    ///
    /// The flag alone is not trusted: a secret must actually be present.
    pub fn mfa_enabled(&self) -> bool {
        self.preferences.mfa_enabled && self.provider.mfa_secret.is_some()
    }
}

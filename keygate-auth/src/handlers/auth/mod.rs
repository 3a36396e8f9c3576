pub mod password;
pub mod registration;
pub mod session;
pub mod social;

pub use password::{forgot_password, reset_password};
pub use registration::{register, resend_verification, verify_email};
pub use session::{login, logout, refresh};
pub use social::{google_callback, google_login};

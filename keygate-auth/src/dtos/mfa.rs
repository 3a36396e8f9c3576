//! Request DTOs for the MFA endpoints.

use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MfaConfirmRequest {
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,

    #[validate(length(min = 16, message = "Invalid secret key"))]
    pub secret_key: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MfaChallengeRequest {
    #[validate(length(equal = 6, message = "Code must be 6 digits"))]
    pub code: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

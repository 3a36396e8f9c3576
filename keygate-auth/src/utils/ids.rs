//! Random identifier generation.
//!
//! Account ids are deliberately short (5 random bytes, hex-encoded) so they
//! stay readable in URLs and support tickets; verification codes are long
//! enough to be unguessable. Both are collision-checked by their callers
//! against the store's uniqueness constraints.

use rand::Rng;

/// Attempt cap for every repeat-until-unique loop (account id, display name
/// suffix, verification code). Exceeding it is an internal error, not a
/// spin.
pub const MAX_UNIQUE_ATTEMPTS: usize = 8;

/// Compact 10-hex-char account id.
pub fn generate_account_id() -> String {
    let bytes: [u8; 5] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Opaque 32-hex-char verification code.
pub fn generate_code() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}

/// Display name with a random numeric suffix, used to break federated
/// display-name collisions.
pub fn suffixed_name(base: &str) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("{}{}", base, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_is_ten_hex_chars() {
        let id = generate_account_id();
        assert_eq!(id.len(), 10);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn codes_are_distinct() {
        assert_ne!(generate_code(), generate_code());
        assert_eq!(generate_code().len(), 32);
    }

    #[test]
    fn suffixed_name_keeps_base() {
        let name = suffixed_name("alice");
        assert!(name.starts_with("alice"));
        assert!(name.len() > "alice".len());
    }
}

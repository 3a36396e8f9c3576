use argon2::{
    password_hash::{rand_core::OsRng, Error as HashError, PasswordHash, PasswordHasher,
        PasswordVerifier, SaltString},
    Argon2,
};

/// Newtype for a plaintext password to prevent accidental logging.
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Newtype for a password hash in PHC string format.
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Hash a password using Argon2id with a random salt.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash.
///
/// A mismatch is `Ok(false)`; only a malformed hash or an internal hasher
/// failure is an error.
pub fn verify_password(
    password: &Password,
    password_hash: &PasswordHashString,
) -> Result<bool, anyhow::Error> {
    let parsed_hash = PasswordHash::new(password_hash.as_str())
        .map_err(|e| anyhow::anyhow!("Invalid password hash format: {}", e))?;

    match Argon2::default().verify_password(password.as_str().as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(HashError::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_produces_argon2_phc_string() {
        let password = Password::new("Sup3rSecret!".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(hash.as_str().starts_with("$argon2"));
    }

    #[test]
    fn correct_password_verifies() {
        let password = Password::new("Sup3rSecret!".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(verify_password(&password, &hash).unwrap());
    }

    #[test]
    fn wrong_password_is_false_not_error() {
        let password = Password::new("Sup3rSecret!".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        let wrong = Password::new("nope".to_string());
        assert!(!verify_password(&wrong, &hash).unwrap());
    }

    #[test]
    fn same_password_hashes_differently() {
        let password = Password::new("Sup3rSecret!".to_string());
        let first = hash_password(&password).unwrap();
        let second = hash_password(&password).unwrap();

        // Random salt per hash.
        assert_ne!(first.as_str(), second.as_str());
        assert!(verify_password(&password, &first).unwrap());
        assert!(verify_password(&password, &second).unwrap());
    }

    #[test]
    fn debug_does_not_leak_plaintext() {
        let password = Password::new("Sup3rSecret!".to_string());
        assert!(!format!("{:?}", password).contains("Sup3rSecret"));
    }
}

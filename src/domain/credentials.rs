//! Fund password hashing.

use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHasher, Version};
use rand::rngs::OsRng;

use crate::domain::error::StsError;

/// Hash a fund password into an argon2id PHC string.
pub fn hash_password(password: &str) -> Result<String, StsError> {
    if password.is_empty() {
        return Err(StsError::validation("fundPassword", "must not be empty"));
    }
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default());
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StsError::validation("fundPassword", e.to_string()))
}

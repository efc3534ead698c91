//! Salted adaptive password hashing (Argon2id, PHC string format).

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

use crate::error::{Error, Result};

/// Hashes `secret` with a fresh random salt.
///
/// The returned bytes are the UTF-8 PHC string, which carries the salt and the
/// cost parameters alongside the hash.
pub fn hash(secret: &[u8]) -> Result<Vec<u8>> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret, &salt)
        .map(|hash| hash.to_string().into_bytes())
        .map_err(|e| Error::Hash(e.to_string()))
}

/// Checks `secret` against a hash produced by [`hash`].
///
/// Returns `Ok(false)` on mismatch and an error only when the stored hash
/// itself cannot be parsed. The comparison is done by the hashing library in
/// constant time.
pub fn verify(hash: &[u8], secret: &[u8]) -> Result<bool> {
    let encoded = std::str::from_utf8(hash).map_err(|e| Error::Hash(e.to_string()))?;
    let parsed = PasswordHash::new(encoded).map_err(|e| Error::Hash(e.to_string()))?;
    Ok(Argon2::default().verify_password(secret, &parsed).is_ok())
}

//! Secret hashing and opaque token material.
//!
//! Client secrets are stored as Argon2id PHC strings. Tokens, codes and request
//! ids are 32 random bytes, URL-safe base64 without padding; tokens and codes are
//! stored only as their SHA-256 digest.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};

/// Hash of a random throwaway secret, verified against when a client is unknown
/// so that lookups of unknown and known clients cost the same.
static DUMMY_SECRET_HASH: Lazy<String> = Lazy::new(|| {
    hash_secret(&generate_token()).unwrap_or_default()
});

/// Hash a client secret using Argon2id.
///
/// Returns the PHC-formatted hash string suitable for storage.
pub fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Constant-time verification of a secret against a stored PHC hash.
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Burn the same verification cost as a real client check. Always false.
pub fn verify_dummy_secret(secret: &str) -> bool {
    verify_secret(secret, &DUMMY_SECRET_HASH);
    false
}

/// Generate an unguessable opaque value (token, code or request id).
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).expect("Failed to generate random bytes");
    URL_SAFE_NO_PAD.encode(bytes)
}

/// At-rest form of a token or code.
pub fn hash_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

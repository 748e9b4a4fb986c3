//! Password hashing and credential verification.
//!
//! Verification is deliberately uniform: an unknown email and a wrong password
//! produce the same error kind and message, and the unknown-email path still
//! runs an Argon2 verification against a throwaway hash so the two failures
//! take comparable time.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use once_cell::sync::Lazy;
use password_hash::{PasswordHash, SaltString};

use crate::error::AppError;
use crate::identity::User;
use crate::store::SharedStore;

/// The one user-facing message for every credential failure.
pub const INVALID_CREDENTIALS: &str = "Invalid email/password combination";

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes)
        .map_err(|e| AppError::internal("rng", e.to_string().as_str()))?;
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::internal("salt", e.to_string().as_str()))?;
    let argon2 = Argon2::default();
    let phc = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::internal("hash", e.to_string().as_str()))?
        .to_string();
    Ok(phc)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    if let Ok(parsed) = PasswordHash::new(hash) {
        let argon2 = Argon2::default();
        argon2.verify_password(password.as_bytes(), &parsed).is_ok()
    } else { false }
}

// Burned on the unknown-identifier path so it costs the same as a real check.
static DUMMY_PHC: Lazy<String> =
    Lazy::new(|| hash_password("gatehouse-dummy-credential").unwrap_or_default());

fn invalid() -> AppError {
    AppError::verification("invalid_credentials", INVALID_CREDENTIALS)
}

/// Verify a submitted identifier/secret pair against the store.
///
/// Returns the matching user, or a `Verification` error that never reveals
/// whether the identifier or the secret was the failing half.
pub fn verify(store: &SharedStore, email: &str, password: &str) -> Result<User, AppError> {
    match store.find_by_email(email) {
        Some(user) => {
            if verify_password(&user.password_hash, password) {
                Ok(user)
            } else {
                Err(invalid())
            }
        }
        None => {
            let _ = verify_password(&DUMMY_PHC, password);
            Err(invalid())
        }
    }
}

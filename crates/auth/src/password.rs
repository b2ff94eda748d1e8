//! Password hash verification (Argon2, PHC string format).

use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier as _};

use crate::error::AuthError;

/// Stored hash assigned when no password is configured; it never verifies.
pub const UNUSABLE_PASSWORD_HASH: &str = "!";

/// Verifies a presented password against a stored hash.
pub trait PasswordVerifier: Send + Sync {
    /// `false` for a wrong password *and* for an unparseable stored hash.
    fn verify(&self, password: &str, stored_hash: &str) -> bool;

    /// Do the work of a `verify` for an account that does not exist, so the
    /// caller pays the same cost either way. The result is discarded.
    fn verify_absent(&self, password: &str) {
        let _ = self.verify(password, UNUSABLE_PASSWORD_HASH);
    }
}

const ABSENT_ACCOUNT_PASSWORD: &str = "absent-account-placeholder";

/// Argon2id verifier/hasher with the crate's default parameters.
#[derive(Default, Clone)]
pub struct Argon2Passwords {
    argon2: Argon2<'static>,
    absent_hash: OnceLock<String>,
}

impl Argon2Passwords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash a password into a PHC string.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::invalid_argument(format!("cannot hash password: {e}")))
    }

    /// A real hash with this hasher's parameters, made on first use.
    fn absent_hash(&self) -> &str {
        self.absent_hash.get_or_init(|| {
            self.hash(ABSENT_ACCOUNT_PASSWORD).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "cannot build placeholder password hash");
                UNUSABLE_PASSWORD_HASH.to_string()
            })
        })
    }
}

impl PasswordVerifier for Argon2Passwords {
    fn verify(&self, password: &str, stored_hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        self.argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    }

    fn verify_absent(&self, password: &str) {
        let _ = self.verify(password, self.absent_hash());
    }
}

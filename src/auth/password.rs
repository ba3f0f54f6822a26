//! Password hashing
//! Slow, salted one-way hashing behind a small trait so the authority can be tested
//! with a cheap cost factor.

use bcrypt::{hash, verify};
use thiserror::Error;
use tracing::warn;

pub const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    HashingFailed(#[from] bcrypt::BcryptError),

    #[error("password must be at least 8 characters")]
    TooShort,
}

/// Checks plaintext passwords against stored hashes and produces new hashes.
pub trait PasswordVerifier: Send + Sync {
    /// `false` on mismatch and on malformed stored hashes.
    fn verify(&self, plaintext: &str, hash: &str) -> bool;

    fn hash(&self, plaintext: &str) -> Result<String, PasswordError>;
}

/// bcrypt with a configurable work factor
#[derive(Debug, Clone)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordVerifier for BcryptHasher {
    fn verify(&self, plaintext: &str, hash_str: &str) -> bool {
        match verify(plaintext, hash_str) {
            Ok(valid) => valid,
            Err(e) => {
                warn!("Stored password hash could not be parsed: {}", e);
                false
            }
        }
    }

    fn hash(&self, plaintext: &str) -> Result<String, PasswordError> {
        Ok(hash(plaintext, self.cost)?)
    }
}

/// Minimum strength rule shared by registration, updates and superuser seeding.
pub fn check_strength(plaintext: &str) -> Result<(), PasswordError> {
    if plaintext.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PasswordError::TooShort);
    }
    Ok(())
}

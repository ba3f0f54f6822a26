//! Authentication errors
//!
//! The closed set of failures the Token Authority reports. None of them carry the
//! plaintext password, a token, or the signing secret.

use thiserror::Error;

use super::password::PasswordError;
use super::user_store::StoreError;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown identifier or wrong password; the two are deliberately indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("inactive user account")]
    InactiveAccount,

    #[error("token missing")]
    TokenMissing,

    /// Malformed, wrong signature or algorithm, or wrong token type.
    #[error("token invalid")]
    TokenInvalid,

    #[error("token expired")]
    TokenExpired,

    #[error("insufficient permissions")]
    Forbidden,

    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AuthError {
    /// True for failures caused by the caller's credentials or token, as opposed to
    /// internal faults.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            AuthError::Signing(_) | AuthError::Password(_) | AuthError::Store(_)
        )
    }
}

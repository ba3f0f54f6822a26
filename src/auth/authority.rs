//! Token Authority
//! Credential checks and token lifecycle (issue, verify, refresh) over the credential
//! store and password verifier.

use crate::auth::errors::AuthError;
use crate::auth::jwt::JwtHandler;
use crate::auth::models::{Claims, TokenPair, TokenType, User, UserRole};
use crate::auth::password::PasswordVerifier;
use crate::auth::user_store::CredentialStore;
use crate::config::TokenSettings;
use std::sync::Arc;
use tracing::{info, warn};

pub struct TokenAuthority {
    jwt: JwtHandler,
    store: Arc<dyn CredentialStore>,
    passwords: Arc<dyn PasswordVerifier>,
    /// Compared against when the identifier is unknown so both failure paths cost one
    /// slow-hash verification.
    dummy_hash: String,
}

impl TokenAuthority {
    pub fn new(
        settings: &TokenSettings,
        store: Arc<dyn CredentialStore>,
        passwords: Arc<dyn PasswordVerifier>,
    ) -> Result<Self, AuthError> {
        let dummy_hash = passwords.hash(&uuid::Uuid::new_v4().to_string())?;

        Ok(Self {
            jwt: JwtHandler::new(settings),
            store,
            passwords,
            dummy_hash,
        })
    }

    pub fn passwords(&self) -> &dyn PasswordVerifier {
        self.passwords.as_ref()
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.jwt.access_ttl_seconds()
    }

    /// Issue an access + refresh pair. The caller must already have authenticated
    /// `subject`.
    pub fn issue(&self, subject: &str, role: UserRole) -> Result<TokenPair, AuthError> {
        let pair = self.jwt.issue(subject, role)?;
        info!("🔑 Issued token pair: {} ({})", subject, role);
        Ok(pair)
    }

    pub fn verify(&self, token: Option<&str>, expected: TokenType) -> Result<Claims, AuthError> {
        self.jwt.verify(token, expected)
    }

    /// Check an identifier/password pair.
    ///
    /// Unknown identifiers and wrong passwords both yield `InvalidCredentials`. Inactive
    /// accounts are returned as-is; the caller decides whether to issue tokens.
    pub fn authenticate(&self, identifier: &str, password: &str) -> Result<User, AuthError> {
        let Some(user) = self.store.find_by_identifier(identifier)? else {
            let _ = self.passwords.verify(password, &self.dummy_hash);
            warn!("❌ Failed login attempt: {}", identifier);
            return Err(AuthError::InvalidCredentials);
        };

        if !self.passwords.verify(password, &user.hashed_password) {
            warn!("❌ Failed login attempt: {}", identifier);
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Load the live account behind a verified token.
    ///
    /// A deleted account yields `TokenInvalid`, a deactivated one `InactiveAccount`.
    pub fn current_user(&self, claims: &Claims) -> Result<User, AuthError> {
        let Some(user) = self.store.find_by_identifier(&claims.sub)? else {
            warn!("Token for unknown subject: {}", claims.sub);
            return Err(AuthError::TokenInvalid);
        };
        if !user.is_active {
            warn!("Token for inactive account: {}", user.email);
            return Err(AuthError::InactiveAccount);
        }
        Ok(user)
    }

    /// Exchange a refresh token for a new pair carrying the subject's current role.
    ///
    /// The presented refresh token stays valid until its own expiry.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthError> {
        let claims = self.verify(Some(refresh_token), TokenType::Refresh)?;
        let user = self.current_user(&claims)?;

        if user.role != claims.role {
            info!(
                "Role for {} changed since issue: {} -> {}",
                user.email, claims.role, user.role
            );
        }

        self.issue(&user.email, user.role)
    }
}

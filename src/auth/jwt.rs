//! JWT Token Handler
//! Signs and verifies HMAC tokens carrying the access/refresh claim set

use crate::auth::errors::AuthError;
use crate::auth::models::{Claims, TokenPair, TokenType, UserRole};
use crate::config::TokenSettings;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// JWT Handler for token operations
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    access_ttl_seconds: i64,
    refresh_ttl_seconds: i64,
    /// Structure-only pass used to classify expiry before the signature check.
    unverified: Validation,
    verified: Validation,
}

impl JwtHandler {
    pub fn new(settings: &TokenSettings) -> Self {
        let secret = settings.secret_bytes();

        // Expiry is compared against `exp` directly below, with no leeway.
        let mut verified = Validation::new(settings.algorithm);
        verified.validate_exp = false;
        verified.leeway = 0;
        verified.set_required_spec_claims(&["exp", "sub"]);

        let mut unverified = verified.clone();
        unverified.insecure_disable_signature_validation();

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            algorithm: settings.algorithm,
            access_ttl_seconds: settings.access_ttl_seconds(),
            refresh_ttl_seconds: settings.refresh_ttl_seconds(),
            unverified,
            verified,
        }
    }

    pub fn access_ttl_seconds(&self) -> i64 {
        self.access_ttl_seconds
    }

    /// Sign an arbitrary claim set with the configured algorithm
    pub fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        Ok(encode(&Header::new(self.algorithm), claims, &self.encoding_key)?)
    }

    /// Generate an access + refresh pair for an already-authenticated subject
    pub fn issue(&self, subject: &str, role: UserRole) -> Result<TokenPair, AuthError> {
        let now = Utc::now().timestamp();

        let access = Claims::new(subject, role, TokenType::Access, now, self.access_ttl_seconds);
        let refresh = Claims::new(subject, role, TokenType::Refresh, now, self.refresh_ttl_seconds);

        debug!(
            "Generating token pair for {} ({}), access expires in {}s",
            subject, role, self.access_ttl_seconds
        );

        Ok(TokenPair {
            access_token: self.sign(&access)?,
            refresh_token: self.sign(&refresh)?,
            token_type: "bearer".to_string(),
            expires_in: self.access_ttl_seconds,
        })
    }

    /// Validate a token of the expected type and extract its claims.
    ///
    /// Order: missing, structure, expiry, signature/algorithm, type.
    pub fn verify(&self, token: Option<&str>, expected: TokenType) -> Result<Claims, AuthError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::TokenMissing)?;

        let unverified = decode::<Claims>(token, &self.decoding_key, &self.unverified)
            .map_err(|e| {
                debug!("Rejected malformed token: {}", e);
                AuthError::TokenInvalid
            })?;

        if unverified.claims.is_expired_at(Utc::now().timestamp()) {
            debug!("Rejected expired {} token", unverified.claims.token_type.as_str());
            return Err(AuthError::TokenExpired);
        }

        let claims = decode::<Claims>(token, &self.decoding_key, &self.verified)
            .map_err(|e| {
                debug!("Rejected token signature: {}", e);
                AuthError::TokenInvalid
            })?
            .claims;

        if claims.token_type != expected {
            debug!(
                "Rejected {} token presented as {}",
                claims.token_type.as_str(),
                expected.as_str()
            );
            return Err(AuthError::TokenInvalid);
        }

        Ok(claims)
    }
}

//! End-to-end Token Authority scenarios against the SQLite store and bcrypt.

use authgate_backend::auth::{
    models::{Claims, TokenType, UserRole},
    user_store::UserChanges,
    AuthError, BcryptHasher, CredentialStore, PasswordVerifier, TokenAuthority, UserStore,
};
use authgate_backend::config::TokenSettings;
use chrono::Utc;
use std::sync::Arc;
use tempfile::NamedTempFile;

struct Harness {
    authority: TokenAuthority,
    store: Arc<UserStore>,
    hasher: Arc<BcryptHasher>,
    _db: NamedTempFile,
}

fn harness() -> Harness {
    let db = NamedTempFile::new().unwrap();
    let store = Arc::new(UserStore::new(db.path().to_str().unwrap()).unwrap());
    let hasher = Arc::new(BcryptHasher::new(4));
    let authority = TokenAuthority::new(
        &TokenSettings::with_secret("integration-test-secret-0123456789abcdef"),
        store.clone(),
        hasher.clone(),
    )
    .unwrap();

    Harness {
        authority,
        store,
        hasher,
        _db: db,
    }
}

fn register(h: &Harness, email: &str, password: &str, role: UserRole) -> i64 {
    let hashed = h.hasher.hash(password).unwrap();
    h.store.create_user(email, &hashed, None, role).unwrap().id
}

#[test]
fn alice_logs_in_and_gets_a_user_token() {
    let h = harness();
    register(&h, "alice", "correct-password", UserRole::User);

    assert!(matches!(
        h.authority.authenticate("alice", "wrong"),
        Err(AuthError::InvalidCredentials)
    ));

    let user = h.authority.authenticate("alice", "correct-password").unwrap();
    let pair = h.authority.issue(&user.email, user.role).unwrap();

    let claims = h
        .authority
        .verify(Some(&pair.access_token), TokenType::Access)
        .unwrap();
    assert_eq!(claims.sub, "alice");
    assert_eq!(claims.role, UserRole::User);
}

#[test]
fn unknown_user_and_wrong_password_look_the_same() {
    let h = harness();
    register(&h, "alice", "correct-password", UserRole::User);

    let unknown = h.authority.authenticate("mallory", "correct-password").unwrap_err();
    let wrong = h.authority.authenticate("alice", "nope-nope").unwrap_err();

    assert!(matches!(unknown, AuthError::InvalidCredentials));
    assert!(matches!(wrong, AuthError::InvalidCredentials));
    assert_eq!(unknown.to_string(), wrong.to_string());
}

#[test]
fn role_change_takes_effect_on_refresh() {
    let h = harness();
    let alice_id = register(&h, "alice", "correct-password", UserRole::User);

    let user = h.authority.authenticate("alice", "correct-password").unwrap();
    let pair = h.authority.issue(&user.email, user.role).unwrap();

    // An admin promotes alice while her refresh token is still live.
    let changes = UserChanges {
        role: Some(UserRole::Moderator),
        ..Default::default()
    };
    h.store.update_user(alice_id, &changes).unwrap().unwrap();
    assert_eq!(h.store.get_role("alice").unwrap(), Some(UserRole::Moderator));

    let renewed = h.authority.refresh(&pair.refresh_token).unwrap();
    let claims = h
        .authority
        .verify(Some(&renewed.access_token), TokenType::Access)
        .unwrap();
    assert_eq!(claims.role, UserRole::Moderator);

    // The old access token still carries the old role until it expires.
    let stale = h
        .authority
        .verify(Some(&pair.access_token), TokenType::Access)
        .unwrap();
    assert_eq!(stale.role, UserRole::User);
}

#[test]
fn access_token_expired_one_second_ago() {
    let h = harness();
    let settings = TokenSettings::with_secret("integration-test-secret-0123456789abcdef");
    let signer = authgate_backend::auth::JwtHandler::new(&settings);

    let now = Utc::now().timestamp();
    let claims = Claims::new("alice", UserRole::User, TokenType::Access, now - 1801, 1800);
    assert_eq!(claims.exp, now - 1);

    let token = signer.sign(&claims).unwrap();
    assert!(matches!(
        h.authority.verify(Some(&token), TokenType::Access),
        Err(AuthError::TokenExpired)
    ));
}

#[test]
fn token_types_are_not_interchangeable() {
    let h = harness();
    register(&h, "bob", "bob-password", UserRole::Admin);
    let pair = h.authority.issue("bob", UserRole::Admin).unwrap();

    assert!(matches!(
        h.authority.verify(Some(&pair.refresh_token), TokenType::Access),
        Err(AuthError::TokenInvalid)
    ));
    assert!(matches!(
        h.authority.refresh(&pair.access_token),
        Err(AuthError::TokenInvalid)
    ));
    assert!(matches!(
        h.authority.verify(None, TokenType::Access),
        Err(AuthError::TokenMissing)
    ));
}

#[test]
fn issued_claims_round_trip_for_every_role() {
    let h = harness();

    for role in UserRole::ALL {
        let subject = format!("{}@example.com", role);
        let pair = h.authority.issue(&subject, role).unwrap();
        let claims = h
            .authority
            .verify(Some(&pair.access_token), TokenType::Access)
            .unwrap();

        assert_eq!(claims.sub, subject);
        assert_eq!(claims.role, role);
        assert_eq!(claims.exp - claims.iat, h.authority.access_ttl_seconds());
    }
}

#[test]
fn deactivated_account_cannot_refresh() {
    let h = harness();
    let id = register(&h, "carol", "carol-password", UserRole::User);
    let pair = h.authority.issue("carol", UserRole::User).unwrap();

    let changes = UserChanges {
        is_active: Some(false),
        ..Default::default()
    };
    h.store.update_user(id, &changes).unwrap();

    assert!(matches!(
        h.authority.refresh(&pair.refresh_token),
        Err(AuthError::InactiveAccount)
    ));
}

//! User Storage
//! Credential lookups for the Token Authority plus the CRUD plumbing behind the user
//! routes, backed by SQLite

use crate::auth::models::{User, UserRole};
use crate::auth::password::{check_strength, PasswordVerifier};
use crate::config::SuperuserSettings;
use anyhow::Context;
use chrono::Utc;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use secrecy::ExposeSecret;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("identifier already registered: {0}")]
    DuplicateIdentifier(String),

    #[error("corrupt user record: {0}")]
    CorruptRecord(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::FromSqlConversionFailure(_, _, inner) => {
                StoreError::CorruptRecord(inner.to_string())
            }
            other => StoreError::Database(other),
        }
    }
}

/// Read side consumed by the Token Authority.
pub trait CredentialStore: Send + Sync {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError>;

    fn get_role(&self, identifier: &str) -> Result<Option<UserRole>, StoreError> {
        Ok(self.find_by_identifier(identifier)?.map(|user| user.role))
    }
}

/// Field changes applied by `UserStore::update_user`. `None` leaves a field untouched.
#[derive(Debug, Default, Clone)]
pub struct UserChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub hashed_password: Option<String>,
    pub is_active: Option<bool>,
    pub role: Option<UserRole>,
}

const USER_COLUMNS: &str =
    "id, email, hashed_password, full_name, is_active, role, created_at, updated_at";

/// User storage with SQLite backend
pub struct UserStore {
    db_path: String,
}

impl UserStore {
    /// Create a new user store and initialize database
    pub fn new(db_path: &str) -> Result<Self, StoreError> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// Initialize database schema
    fn init_db(&self) -> Result<(), StoreError> {
        let conn = self.connect()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT UNIQUE NOT NULL,
                hashed_password TEXT NOT NULL,
                full_name TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                role TEXT NOT NULL DEFAULT 'user'
                    CHECK (role IN ('user', 'moderator', 'admin')),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    /// Create the configured superuser if that email is not registered yet.
    ///
    /// Returns `true` when an account was created.
    pub fn ensure_superuser(
        &self,
        settings: &SuperuserSettings,
        passwords: &dyn PasswordVerifier,
    ) -> anyhow::Result<bool> {
        if self.find_by_identifier(&settings.email)?.is_some() {
            info!("First superuser already exists: {}", settings.email);
            return Ok(false);
        }

        let password = settings.password.expose_secret();
        if check_strength(password).is_err() {
            warn!("⚠️  FIRST_SUPERUSER_PASSWORD is shorter than the registration minimum");
        }

        let hashed = passwords
            .hash(password)
            .context("Failed to hash superuser password")?;
        let admin = self
            .create_user(
                &settings.email,
                &hashed,
                Some(&settings.full_name),
                UserRole::Admin,
            )
            .context("Failed to insert superuser")?;

        info!("🔐 Created first superuser: {}", admin.email);
        Ok(true)
    }

    /// Get user by primary key
    pub fn get_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let conn = self.connect()?;
        query_by_id(&conn, id)
    }

    /// Get user by email
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let conn = self.connect()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                row_to_user,
            )
            .optional()?;
        Ok(user)
    }

    /// List users ordered by id
    pub fn list_users(&self, skip: u32, limit: u32) -> Result<Vec<User>, StoreError> {
        let conn = self.connect()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT ?1 OFFSET ?2"
        ))?;

        let users = stmt
            .query_map(params![limit, skip], row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    /// Create a new user from an already-hashed password
    pub fn create_user(
        &self,
        email: &str,
        hashed_password: &str,
        full_name: Option<&str>,
        role: UserRole,
    ) -> Result<User, StoreError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.connect()?;

        conn.execute(
            "INSERT INTO users (email, hashed_password, full_name, is_active, role, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?5, ?5)",
            params![email, hashed_password, full_name, role, now],
        )
        .map_err(|e| duplicate_or(e, email))?;

        let user = User {
            id: conn.last_insert_rowid(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
            full_name: full_name.map(str::to_string),
            is_active: true,
            role,
            created_at: now.clone(),
            updated_at: now,
        };

        info!("✅ Created user: {} ({})", user.email, user.role);

        Ok(user)
    }

    /// Apply partial changes; `Ok(None)` when the id does not exist
    pub fn update_user(&self, id: i64, changes: &UserChanges) -> Result<Option<User>, StoreError> {
        let conn = self.connect()?;
        let Some(mut user) = query_by_id(&conn, id)? else {
            return Ok(None);
        };

        if let Some(email) = &changes.email {
            user.email = email.clone();
        }
        if let Some(full_name) = &changes.full_name {
            user.full_name = Some(full_name.clone());
        }
        if let Some(hashed) = &changes.hashed_password {
            user.hashed_password = hashed.clone();
        }
        if let Some(is_active) = changes.is_active {
            user.is_active = is_active;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        user.updated_at = Utc::now().to_rfc3339();

        conn.execute(
            "UPDATE users
             SET email = ?1, hashed_password = ?2, full_name = ?3, is_active = ?4, role = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                user.email,
                user.hashed_password,
                user.full_name,
                user.is_active,
                user.role,
                user.updated_at,
                id,
            ],
        )
        .map_err(|e| duplicate_or(e, &user.email))?;

        Ok(Some(user))
    }

    /// Delete a user by id; `false` when nothing was deleted
    pub fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let rows_affected = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;

        if rows_affected > 0 {
            info!("🗑️  Deleted user: {}", id);
        }
        Ok(rows_affected > 0)
    }
}

impl CredentialStore for UserStore {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<User>, StoreError> {
        self.get_user_by_email(identifier)
    }
}

fn query_by_id(conn: &Connection, id: i64) -> Result<Option<User>, StoreError> {
    let user = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        hashed_password: row.get(2)?,
        full_name: row.get(3)?,
        is_active: row.get(4)?,
        role: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn duplicate_or(err: rusqlite::Error, email: &str) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::DuplicateIdentifier(email.to_string())
        }
        _ => err.into(),
    }
}

impl ToSql for UserRole {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for UserRole {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::BcryptHasher;
    use secrecy::SecretString;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (UserStore, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        let store = UserStore::new(db_path).unwrap();
        (store, temp_file)
    }

    #[test]
    fn test_create_and_retrieve_user() {
        let (store, _temp) = create_test_store();

        let created = store
            .create_user("mod@example.com", "hash", Some("Mod"), UserRole::Moderator)
            .unwrap();
        assert!(created.is_active);
        assert_eq!(created.role, UserRole::Moderator);

        let by_email = store.get_user_by_email("mod@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, created.id);
        assert_eq!(by_email.full_name.as_deref(), Some("Mod"));

        let by_id = store.get_user(created.id).unwrap().unwrap();
        assert_eq!(by_id.email, "mod@example.com");

        assert!(store.get_user(created.id + 100).unwrap().is_none());
        assert!(store.find_by_identifier("nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let (store, _temp) = create_test_store();

        store
            .create_user("dup@example.com", "hash", None, UserRole::User)
            .unwrap();
        let err = store
            .create_user("dup@example.com", "hash2", None, UserRole::User)
            .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateIdentifier(email) if email == "dup@example.com"));
    }

    #[test]
    fn test_get_role_reflects_updates() {
        let (store, _temp) = create_test_store();
        let user = store
            .create_user("alice@example.com", "hash", None, UserRole::User)
            .unwrap();

        assert_eq!(store.get_role("alice@example.com").unwrap(), Some(UserRole::User));

        let changes = UserChanges {
            role: Some(UserRole::Moderator),
            ..Default::default()
        };
        let updated = store.update_user(user.id, &changes).unwrap().unwrap();
        assert_eq!(updated.role, UserRole::Moderator);
        assert_eq!(
            store.get_role("alice@example.com").unwrap(),
            Some(UserRole::Moderator)
        );
        assert_eq!(store.get_role("ghost@example.com").unwrap(), None);

        // The role lookup reads through the same record the authority authenticates against.
        let record = store.find_by_identifier("alice@example.com").unwrap().unwrap();
        assert_eq!(store.get_role(&record.email).unwrap(), Some(record.role));
    }

    #[test]
    fn test_update_user_partial_fields() {
        let (store, _temp) = create_test_store();
        let user = store
            .create_user("carol@example.com", "hash", Some("Carol"), UserRole::User)
            .unwrap();

        let changes = UserChanges {
            full_name: Some("Carol Smith".to_string()),
            is_active: Some(false),
            ..Default::default()
        };
        let updated = store.update_user(user.id, &changes).unwrap().unwrap();

        assert_eq!(updated.email, "carol@example.com");
        assert_eq!(updated.full_name.as_deref(), Some("Carol Smith"));
        assert!(!updated.is_active);
        assert_eq!(updated.hashed_password, "hash");

        let missing = store.update_user(9_999, &changes).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_update_to_taken_email_rejected() {
        let (store, _temp) = create_test_store();
        store
            .create_user("first@example.com", "hash", None, UserRole::User)
            .unwrap();
        let second = store
            .create_user("second@example.com", "hash", None, UserRole::User)
            .unwrap();

        let changes = UserChanges {
            email: Some("first@example.com".to_string()),
            ..Default::default()
        };
        let err = store.update_user(second.id, &changes).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateIdentifier(_)));
    }

    #[test]
    fn test_list_users_paginates() {
        let (store, _temp) = create_test_store();
        for i in 0..5 {
            store
                .create_user(&format!("user{}@example.com", i), "hash", None, UserRole::User)
                .unwrap();
        }

        assert_eq!(store.list_users(0, 100).unwrap().len(), 5);

        let page = store.list_users(1, 2).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].email, "user1@example.com");
        assert_eq!(page[1].email, "user2@example.com");
    }

    #[test]
    fn test_delete_user() {
        let (store, _temp) = create_test_store();
        let user = store
            .create_user("temp@example.com", "hash", None, UserRole::User)
            .unwrap();

        assert!(store.delete_user(user.id).unwrap());
        assert!(store.get_user(user.id).unwrap().is_none());
        assert!(!store.delete_user(user.id).unwrap());
    }

    #[test]
    fn test_unknown_role_in_row_is_corrupt_not_defaulted() {
        let (store, temp) = create_test_store();
        store
            .create_user("eve@example.com", "hash", None, UserRole::User)
            .unwrap();

        // Bypass the CHECK constraint to simulate a row written by something else.
        let conn = Connection::open(temp.path()).unwrap();
        conn.execute_batch("PRAGMA ignore_check_constraints = ON;").unwrap();
        conn.execute(
            "UPDATE users SET role = 'root' WHERE email = 'eve@example.com'",
            [],
        )
        .unwrap();

        let err = store.find_by_identifier("eve@example.com").unwrap_err();
        assert!(matches!(err, StoreError::CorruptRecord(_)));
    }

    #[test]
    fn test_ensure_superuser_is_idempotent() {
        let (store, _temp) = create_test_store();
        let hasher = BcryptHasher::new(4);
        let settings = SuperuserSettings {
            email: "admin@example.com".to_string(),
            password: SecretString::from("changeme-please".to_string()),
            full_name: "Admin User".to_string(),
        };

        assert!(store.ensure_superuser(&settings, &hasher).unwrap());
        assert!(!store.ensure_superuser(&settings, &hasher).unwrap());

        let admin = store.get_user_by_email("admin@example.com").unwrap().unwrap();
        assert_eq!(admin.role, UserRole::Admin);
        assert!(hasher.verify("changeme-please", &admin.hashed_password));
        assert_eq!(store.list_users(0, 100).unwrap().len(), 1);
    }
}

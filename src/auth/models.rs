//! Authentication Models
//! Users, roles, token claims, and the request/response bodies of the auth routes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use validator::Validate;

/// User account as held by the credential store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Login identifier and token subject; unique in the store
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String, // bcrypt hash - never serialize
    pub full_name: Option<String>,
    pub is_active: bool,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

/// User roles for RBAC, ordered by privilege (declaration order).
///
/// The set is closed: anything that is not one of these three strings is rejected
/// wherever a role is parsed (token payloads, database rows, request bodies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Moderator,
    Admin,
}

/// Capabilities checked by the route layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewOwnProfile,
    ListUsers,
    ViewAnyUser,
    UpdateAnyUser,
    /// Change another account's role or active flag
    ManageRoles,
    DeleteUser,
}

impl UserRole {
    pub const ALL: [UserRole; 3] = [UserRole::User, UserRole::Moderator, UserRole::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::User => "user",
            UserRole::Moderator => "moderator",
            UserRole::Admin => "admin",
        }
    }

    /// Capability table.
    pub fn can(&self, permission: Permission) -> bool {
        match self {
            UserRole::Admin => true,
            UserRole::Moderator => matches!(
                permission,
                Permission::ViewOwnProfile | Permission::ListUsers | Permission::ViewAnyUser
            ),
            UserRole::User => matches!(permission, Permission::ViewOwnProfile),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for UserRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(UserRole::User),
            "moderator" => Ok(UserRole::Moderator),
            "admin" => Ok(UserRole::Admin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Token type discriminator carried in the `type` claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

/// JWT Claims payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // subject (user email)
    pub role: UserRole,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub iat: i64, // issued-at, epoch seconds
    pub exp: i64, // expires-at, epoch seconds
    pub jti: String,
}

impl Claims {
    pub fn new(
        subject: impl Into<String>,
        role: UserRole,
        token_type: TokenType,
        issued_at: i64,
        ttl_seconds: i64,
    ) -> Self {
        Self {
            sub: subject.into(),
            role,
            token_type,
            iat: issued_at,
            exp: issued_at.saturating_add(ttl_seconds),
            jti: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Valid strictly before `exp`.
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.exp
    }
}

/// Access + refresh pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String, // always "bearer"
    pub expires_in: i64,    // access token lifetime in seconds
}

/// Registration body - POST /auth/register
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8))]
    pub password: String,
    pub full_name: Option<String>,
}

/// OAuth2 password-grant style login form - POST /auth/login
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

/// Refresh body - POST /auth/refresh
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Partial update body - PATCH /users/{id}
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UserUpdateRequest {
    #[validate(email)]
    pub email: Option<String>,
    pub full_name: Option<String>,
    #[validate(length(min = 8))]
    pub password: Option<String>,
    pub is_active: Option<bool>,
    pub role: Option<UserRole>,
}

/// Pagination for GET /users
#[derive(Debug, Deserialize)]
pub struct ListUsersQuery {
    #[serde(default)]
    pub skip: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

/// User response (sanitized)
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub is_active: bool,
    pub role: UserRole,
    pub created_at: String,
    pub updated_at: String,
}

impl UserResponse {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            is_active: user.is_active,
            role: user.role,
            created_at: user.created_at.clone(),
            updated_at: user.updated_at.clone(),
        }
    }
}

//! Authentication Module
//! Token Authority, credential storage and role-based access control

pub mod api;
pub mod authority;
pub mod errors;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod rbac;
pub mod user_store;

pub use api::AuthState;
pub use authority::TokenAuthority;
pub use errors::AuthError;
pub use jwt::JwtHandler;
pub use middleware::auth_middleware;
pub use password::{BcryptHasher, PasswordVerifier};
pub use rbac::{require_role, AccessPolicy};
pub use user_store::{CredentialStore, StoreError, UserStore};

//! AuthGate backend
//! Password login, JWT access/refresh tokens and role-based access control over SQLite

pub mod api;
pub mod auth;
pub mod config;
pub mod middleware;

pub use api::create_router;
pub use config::Settings;

//! HTTP surface: router, transport errors, user endpoints

pub mod extract;
pub mod routes;
pub mod users;

pub use extract::{AppForm, AppJson, AppPath, AppQuery};
pub use routes::{create_router, ApiError};

//! Authentication API Endpoints
//! Registration, password login and refresh-token exchange

use crate::api::{ApiError, AppForm, AppJson};
use crate::auth::{
    authority::TokenAuthority,
    errors::AuthError,
    models::{LoginForm, RefreshRequest, RegisterRequest, TokenPair, UserResponse, UserRole},
    user_store::UserStore,
};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

/// Shared auth state
#[derive(Clone)]
pub struct AuthState {
    pub authority: Arc<TokenAuthority>,
    pub users: Arc<UserStore>,
}

impl AuthState {
    pub fn new(authority: Arc<TokenAuthority>, users: Arc<UserStore>) -> Self {
        Self { authority, users }
    }
}

/// Register endpoint - POST /auth/register
pub async fn register(
    State(state): State<AuthState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    payload.validate()?;

    let hashed = state.authority.passwords().hash(&payload.password)?;
    let user = state.users.create_user(
        &payload.email,
        &hashed,
        payload.full_name.as_deref(),
        UserRole::User,
    )?;

    info!("📝 Registered: {}", user.email);

    Ok((StatusCode::CREATED, Json(UserResponse::from_user(&user))))
}

/// Login endpoint - POST /auth/login (form fields `username`, `password`)
pub async fn login(
    State(state): State<AuthState>,
    AppForm(form): AppForm<LoginForm>,
) -> Result<Json<TokenPair>, ApiError> {
    info!("🔐 Login attempt: {}", form.username);

    let user = state.authority.authenticate(&form.username, &form.password)?;

    if !user.is_active {
        warn!("❌ Login for inactive account: {}", user.email);
        return Err(AuthError::InactiveAccount.into());
    }

    let pair = state.authority.issue(&user.email, user.role)?;

    info!("✅ Login successful: {} ({})", user.email, user.role);

    Ok(Json(pair))
}

/// Refresh endpoint - POST /auth/refresh
pub async fn refresh(
    State(state): State<AuthState>,
    AppJson(payload): AppJson<RefreshRequest>,
) -> Result<Json<TokenPair>, ApiError> {
    let pair = state.authority.refresh(&payload.refresh_token)?;
    Ok(Json(pair))
}

//! User management endpoints
//! Every handler runs behind `auth_middleware`, so the caller's account is known to exist
//! and be active; access is re-checked with `AccessPolicy`.

use crate::api::{ApiError, AppJson, AppPath, AppQuery};
use crate::auth::{
    api::AuthState,
    errors::AuthError,
    models::{Claims, ListUsersQuery, Permission, User, UserResponse, UserUpdateRequest},
    password::check_strength,
    rbac::AccessPolicy,
    user_store::UserChanges,
};
use axum::{
    extract::State,
    http::StatusCode,
    Extension, Json,
};
use tracing::info;
use validator::Validate;

const MAX_PAGE_SIZE: u32 = 100;

/// Current user - GET /users/me
pub async fn read_current_user(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse::from_user(&user))
}

/// List users - GET /users?skip=&limit= (Moderator, Admin)
pub async fn list_users(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    AppQuery(page): AppQuery<ListUsersQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    AccessPolicy::LIST_USERS.check(&claims, None)?;

    let users = state
        .users
        .list_users(page.skip, page.limit.min(MAX_PAGE_SIZE))?;

    Ok(Json(users.iter().map(UserResponse::from_user).collect()))
}

/// Get user - GET /users/:id (self, Moderator, Admin)
pub async fn get_user(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i64>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.users.get_user(user_id)?;

    // Access is decided before existence so unprivileged callers cannot enumerate ids.
    AccessPolicy::VIEW_USER.check(&claims, user.as_ref().map(|u| u.email.as_str()))?;
    let user = user.ok_or(ApiError::NotFound("User not found"))?;

    Ok(Json(UserResponse::from_user(&user)))
}

/// Update user - PATCH /users/:id (self, Admin)
///
/// Only callers holding `ManageRoles` may change `role` or `is_active`.
pub async fn update_user(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i64>,
    AppJson(payload): AppJson<UserUpdateRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    payload.validate()?;

    let target = state.users.get_user(user_id)?;
    AccessPolicy::UPDATE_USER.check(&claims, target.as_ref().map(|u| u.email.as_str()))?;
    let target = target.ok_or(ApiError::NotFound("User not found"))?;

    if (payload.role.is_some() || payload.is_active.is_some())
        && !claims.role.can(Permission::ManageRoles)
    {
        return Err(AuthError::Forbidden.into());
    }

    let hashed_password = match payload.password.as_deref() {
        Some(password) => {
            check_strength(password)?;
            Some(state.authority.passwords().hash(password)?)
        }
        None => None,
    };

    let changes = UserChanges {
        email: payload.email,
        full_name: payload.full_name,
        hashed_password,
        is_active: payload.is_active,
        role: payload.role,
    };

    let updated = state
        .users
        .update_user(target.id, &changes)?
        .ok_or(ApiError::NotFound("User not found"))?;

    if updated.role != target.role {
        info!(
            "👤 Role change by {}: {} {} -> {}",
            claims.sub, updated.email, target.role, updated.role
        );
    }

    Ok(Json(UserResponse::from_user(&updated)))
}

/// Delete user - DELETE /users/:id (Admin)
pub async fn delete_user(
    State(state): State<AuthState>,
    Extension(claims): Extension<Claims>,
    AppPath(user_id): AppPath<i64>,
) -> Result<StatusCode, ApiError> {
    AccessPolicy::DELETE_USER.check(&claims, None)?;

    let target = state
        .users
        .get_user(user_id)?
        .ok_or(ApiError::NotFound("User not found"))?;

    if target.email == claims.sub {
        return Err(ApiError::BadRequest(
            "Users cannot delete their own account".to_string(),
        ));
    }

    if !state.users.delete_user(target.id)? {
        return Err(ApiError::NotFound("User not found"));
    }

    info!("🗑️  User {} deleted by {}", target.email, claims.sub);

    Ok(StatusCode::NO_CONTENT)
}

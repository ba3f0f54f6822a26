//! Router assembly and transport error mapping

use crate::api::users;
use crate::auth::{
    api::{self as auth_api, AuthState},
    errors::AuthError,
    middleware::auth_middleware,
    password::PasswordError,
    user_store::StoreError,
};
use crate::config::Settings;
use crate::middleware::{rate_limit_middleware, request_logging, RateLimitLayer};
use axum::{
    extract::rejection::{FormRejection, JsonRejection, PathRejection, QueryRejection},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, warn};

/// Build the full application router.
pub fn create_router(state: AuthState, settings: &Settings, limiter: RateLimitLayer) -> Router {
    let credential_routes = Router::new()
        .route("/auth/register", post(auth_api::register))
        .route("/auth/login", post(auth_api::login))
        .route("/auth/refresh", post(auth_api::refresh))
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware));

    let user_routes = Router::new()
        .route("/users/me", get(users::read_current_user))
        .route("/users", get(users::list_users))
        .route(
            "/users/:id",
            get(users::get_user)
                .patch(users::update_user)
                .delete(users::delete_user),
        )
        .route_layer(middleware::from_fn_with_state(
            state.authority.clone(),
            auth_middleware,
        ));

    let api = credential_routes.merge(user_routes).with_state(state);

    let project_name = settings.project_name.clone();
    let public_routes = Router::new()
        .route("/", get(move || root(project_name.clone())))
        .route("/health", get(health_check));

    let prefix = settings.api_prefix.trim_end_matches('/');
    let app = if prefix.is_empty() {
        public_routes.merge(api)
    } else {
        public_routes.nest(prefix, api)
    };

    app.layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&settings.cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    // A literal wildcard cannot be combined with credentials, so echo the caller instead.
    if origins.iter().any(|o| o == "*") {
        return base.allow_origin(AllowOrigin::mirror_request());
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    base.allow_origin(AllowOrigin::list(allowed))
}

async fn root(project_name: String) -> Json<Value> {
    Json(json!({
        "message": format!("Welcome to {}", project_name),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

/// Route-layer error. The only place errors become HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    /// Request body failed validation (422)
    Validation(String),
    BadRequest(String),
    NotFound(&'static str),
    /// Malformed request input, with the status axum chose for it
    Rejection(StatusCode, String),
    Internal,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Store(store) => store.into(),
            AuthError::Password(password) => password.into(),
            err if err.is_client_error() => ApiError::Auth(err),
            err => {
                error!("Token authority failure: {}", err);
                ApiError::Internal
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateIdentifier(_) => ApiError::BadRequest(
                "The user with this email already exists in the system".to_string(),
            ),
            err => {
                error!("User store failure: {}", err);
                ApiError::Internal
            }
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::TooShort => ApiError::Validation(err.to_string()),
            err => {
                error!("Password hashing failure: {}", err);
                ApiError::Internal
            }
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        ApiError::Validation(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejection(rejection.status(), rejection.body_text())
    }
}

impl From<FormRejection> for ApiError {
    fn from(rejection: FormRejection) -> Self {
        ApiError::Rejection(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Rejection(rejection.status(), rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejection(rejection.status(), rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Auth(err) => match err {
                AuthError::InvalidCredentials => {
                    (StatusCode::UNAUTHORIZED, "Incorrect email or password".to_string())
                }
                AuthError::TokenMissing => (StatusCode::UNAUTHORIZED, "Not authenticated".to_string()),
                AuthError::TokenInvalid => (
                    StatusCode::UNAUTHORIZED,
                    "Could not validate credentials".to_string(),
                ),
                AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token has expired".to_string()),
                AuthError::Forbidden => (StatusCode::FORBIDDEN, "Not enough permissions".to_string()),
                AuthError::InactiveAccount => (StatusCode::BAD_REQUEST, "Inactive user".to_string()),
                _ => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                ),
            },
            ApiError::Validation(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message.to_string()),
            ApiError::Rejection(status, message) => (status, message),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(json!({ "detail": message }));

        if status == StatusCode::UNAUTHORIZED {
            (status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

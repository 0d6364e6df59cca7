use axum::{
    body::Body,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::sync::Arc;

use crate::{
    audit,
    config::{Role, ServerConfig},
    error::ApiError,
    AppState,
};

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub auth_type: AuthType,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthType {
    ApiKey,
    BasicAuth,
}

impl AuthUser {
    pub fn new(user_id: String, auth_type: AuthType, role: Role) -> Self {
        Self {
            user_id,
            auth_type,
            role,
        }
    }

    /// Whether this caller's role may reach `path`.
    pub fn may_access(&self, path: &str) -> bool {
        match self.role {
            Role::Admin => true,
            Role::Worker => path.starts_with("/api/worker/"),
            Role::Cron => path.starts_with("/api/cron/"),
        }
    }
}

/// Name of the authenticated caller, for audit and `requested_by` columns.
pub fn actor(user: Option<&AuthUser>) -> Option<String> {
    user.map(|u| u.user_id.clone())
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, Response> {
    // Skip auth if disabled
    if !state.config.auth.enabled {
        return Ok(next.run(request).await);
    }

    let path = request.uri().path().to_string();
    if path == "/health" {
        return Ok(next.run(request).await);
    }

    let client_ip = request
        .extensions()
        .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let api_key = request
        .headers()
        .get("X-API-Key")
        .and_then(|h| h.to_str().ok());
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let result = match (api_key, auth_header) {
        (Some(key), _) => authenticate_api_key(&state.config, key.trim()),
        (None, Some(h)) if h.starts_with("Bearer ") => {
            authenticate_api_key(&state.config, h.trim_start_matches("Bearer ").trim())
        }
        (None, Some(h)) if h.starts_with("Basic ") => authenticate_basic(&state.config, h),
        (None, Some(_)) => Err(ApiError::unauthorized(
            "Invalid Authorization header format. Use 'Bearer <key>' or 'Basic <credentials>'",
        )),
        (None, None) => Err(ApiError::unauthorized("Missing credentials")),
    };

    let auth_user = match result {
        Ok(user) => user,
        Err(e) => {
            audit::log_auth_attempt(&client_ip, None, false);
            return Err(e.into_response());
        }
    };

    if !auth_user.may_access(&path) {
        tracing::warn!(user_id = %auth_user.user_id, role = ?auth_user.role, path = %path, "Role not allowed");
        return Err(ApiError::forbidden(format!(
            "'{}' is not allowed to call {}",
            auth_user.user_id, path
        ))
        .into_response());
    }

    audit::log_auth_attempt(&client_ip, Some(&auth_user.user_id), true);
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

fn authenticate_api_key(config: &ServerConfig, key: &str) -> Result<AuthUser, ApiError> {
    config
        .auth
        .api_keys
        .iter()
        .find(|k| k.key == key)
        .map(|k| AuthUser::new(k.name.clone(), AuthType::ApiKey, k.role))
        .ok_or_else(|| ApiError::unauthorized("Invalid API key"))
}

fn authenticate_basic(config: &ServerConfig, auth_header: &str) -> Result<AuthUser, ApiError> {
    let credentials = auth_header.trim_start_matches("Basic ").trim();

    let decoded = STANDARD
        .decode(credentials)
        .map_err(|_| ApiError::unauthorized("Invalid Base64 encoding in Basic auth"))?;

    let credentials_str = String::from_utf8(decoded)
        .map_err(|_| ApiError::unauthorized("Invalid UTF-8 in Basic auth credentials"))?;

    let Some((username, password)) = credentials_str.split_once(':') else {
        return Err(ApiError::unauthorized(
            "Invalid Basic auth format. Expected 'username:password'",
        ));
    };

    config
        .auth
        .basic_auth
        .iter()
        .find(|u| u.username == username && u.password == password)
        .map(|_| AuthUser::new(username.to_string(), AuthType::BasicAuth, Role::Admin))
        .ok_or_else(|| ApiError::unauthorized("Invalid username or password"))
}

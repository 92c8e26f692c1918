//! Authentication middleware for Axum

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::error::ApiError;

use super::jwt::JwtManager;

/// Role of the acting user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    BusinessOwner,
    Admin,
}

/// Authenticated user information extracted from the bearer token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: ActorRole,
    pub email: Option<String>,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

/// State needed for authentication
#[derive(Clone)]
pub struct AuthState {
    pub jwt_manager: JwtManager,
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Require a valid bearer token; inserts `AuthUser` as an extension
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(ApiError::Unauthorized)?;

    let claims = state.jwt_manager.validate_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Token validation failed");
        ApiError::Unauthorized
    })?;

    let role = match claims.role.as_str() {
        "admin" => ActorRole::Admin,
        "business" => ActorRole::BusinessOwner,
        other => {
            tracing::warn!(role = %other, "Token carried unknown role");
            return Err(ApiError::Unauthorized);
        }
    };

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        role,
        email: claims.email,
    });

    Ok(next.run(request).await)
}

/// Require an admin actor; runs after `require_auth`
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthUser>()
        .ok_or(ApiError::Unauthorized)?;

    if !user.is_admin() {
        tracing::warn!(user_id = %user.user_id, "Non-admin actor hit admin route");
        return Err(ApiError::Forbidden);
    }

    Ok(next.run(request).await)
}

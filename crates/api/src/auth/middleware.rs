//! Authentication middleware

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use uuid::Uuid;

use themeloft_shared::UserRole;

use crate::auth::jwt::JwtManager;
use crate::error::ApiError;

/// State handed to the auth middleware layers
#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtManager,
    pub pool: PgPool,
}

/// Authenticated user, inserted as a request extension by `require_auth`
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub account_id: Uuid,
    pub role: UserRole,
    pub email: String,
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Reject the request unless it carries a valid access token
pub async fn require_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(&request).ok_or(ApiError::Unauthorized)?;

    let claims = state
        .jwt
        .validate_access_token(token)
        .map_err(|_| ApiError::InvalidToken)?;

    // Token claims carry the role, but the user must still exist
    let exists: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE id = $1 AND account_id = $2")
            .bind(claims.sub)
            .bind(claims.account_id)
            .fetch_optional(&state.pool)
            .await?;
    if exists.is_none() {
        return Err(ApiError::Unauthorized);
    }

    request.extensions_mut().insert(AuthUser {
        user_id: claims.sub,
        account_id: claims.account_id,
        role: UserRole::from_str_lossy(&claims.role),
        email: claims.email,
    });

    Ok(next.run(request).await)
}

/// Attach `AuthUser` when a valid token is present; pass through otherwise
pub async fn optional_auth(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = bearer_token(&request) {
        if let Ok(claims) = state.jwt.validate_access_token(token) {
            request.extensions_mut().insert(AuthUser {
                user_id: claims.sub,
                account_id: claims.account_id,
                role: UserRole::from_str_lossy(&claims.role),
                email: claims.email,
            });
        }
    }
    next.run(request).await
}

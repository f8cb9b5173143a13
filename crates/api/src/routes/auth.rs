//! Authentication endpoints

use axum::{extract::State, Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use themeloft_shared::User;

use crate::auth::{hash_password, verify_password, AuthUser};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub account_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub account_id: Uuid,
    pub email: String,
    pub role: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            account_id: user.account_id,
            email: user.email,
            role: user.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

fn validate_email(email: &str) -> ApiResult<()> {
    // Lightweight shape check; real validation happens on delivery
    if email.len() < 3 || email.len() > 255 || !email.contains('@') {
        return Err(ApiError::Validation("Invalid email address".to_string()));
    }
    Ok(())
}

/// Register a new account with its owner user
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<AuthResponse>> {
    if !state.config.enable_signup {
        return Err(ApiError::Forbidden);
    }

    validate_email(&req.email)?;
    if req.account_name.trim().is_empty() {
        return Err(ApiError::Validation("Account name is required".to_string()));
    }

    let password_hash =
        hash_password(&req.password).map_err(|e| ApiError::Validation(e.to_string()))?;

    let mut tx = state.pool.begin().await?;

    let account_id: (Uuid,) =
        sqlx::query_as("INSERT INTO accounts (name) VALUES ($1) RETURNING id")
            .bind(req.account_name.trim())
            .fetch_one(&mut *tx)
            .await?;

    let user: User = sqlx::query_as(
        r#"
        INSERT INTO users (account_id, email, password_hash, role)
        VALUES ($1, $2, $3, 'owner')
        RETURNING id, account_id, email, password_hash, role, created_at, updated_at
        "#,
    )
    .bind(account_id.0)
    .bind(req.email.to_lowercase())
    .bind(&password_hash)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            ApiError::EmailAlreadyExists
        }
        _ => ApiError::from(e),
    })?;

    tx.commit().await?;

    tracing::info!(account_id = %account_id.0, user_id = %user.id, "Account registered");

    issue_tokens(&state, user)
}

/// Log in with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user: Option<User> = sqlx::query_as(
        r#"
        SELECT id, account_id, email, password_hash, role, created_at, updated_at
        FROM users WHERE email = $1
        "#,
    )
    .bind(req.email.to_lowercase())
    .fetch_optional(&state.pool)
    .await?;

    // Verify against a found user only; a missing user and a wrong password
    // report the same error
    let user = user.ok_or(ApiError::InvalidCredentials)?;
    if !verify_password(&req.password, &user.password_hash) {
        return Err(ApiError::InvalidCredentials);
    }

    issue_tokens(&state, user)
}

/// Current authenticated user
pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<UserResponse>> {
    let user: User = sqlx::query_as(
        r#"
        SELECT id, account_id, email, password_hash, role, created_at, updated_at
        FROM users WHERE id = $1
        "#,
    )
    .bind(auth_user.user_id)
    .fetch_one(&state.pool)
    .await?;

    Ok(Json(user.into()))
}

fn issue_tokens(state: &AppState, user: User) -> ApiResult<Json<AuthResponse>> {
    let (access_token, _access_jti) = state
        .jwt
        .generate_access_token(user.id, user.account_id, &user.role, &user.email)
        .map_err(|e| {
            tracing::error!(error = %e, "Token generation failed");
            ApiError::Internal
        })?;
    let (refresh_token, _refresh_jti) = state
        .jwt
        .generate_refresh_token(user.id, user.account_id, &user.role, &user.email)
        .map_err(|e| {
            tracing::error!(error = %e, "Token generation failed");
            ApiError::Internal
        })?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        expires_in: state.jwt.access_token_expiry_seconds(),
        user: user.into(),
    }))
}

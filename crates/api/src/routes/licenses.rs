//! License endpoints: check, issue, consume, list

use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use themeloft_billing::{generate_license_key, validate_license, InvalidReason, LicenseVerdict};
use themeloft_shared::{License, LicenseType};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

const LICENSE_COLUMNS: &str = "id, account_id, theme_id, license_key, license_type, \
     max_downloads, download_count, expires_at, created_at";

#[derive(Debug, Serialize)]
pub struct LicenseListResponse {
    pub licenses: Vec<License>,
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub owned: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<License>,
}

#[derive(Debug, Deserialize)]
pub struct IssueLicenseRequest {
    pub theme_id: Uuid,
    pub license_type: Option<String>,
    pub max_downloads: Option<i32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
pub struct ConsumeResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<InvalidReason>,
    pub download_count: i32,
    /// Remaining downloads, absent for uncapped licenses
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<i32>,
}

async fn find_license(
    state: &AppState,
    account_id: Uuid,
    theme_id: Uuid,
) -> ApiResult<Option<License>> {
    let license: Option<License> = sqlx::query_as(&format!(
        "SELECT {} FROM licenses WHERE account_id = $1 AND theme_id = $2 \
         ORDER BY created_at DESC LIMIT 1",
        LICENSE_COLUMNS
    ))
    .bind(account_id)
    .bind(theme_id)
    .fetch_optional(&state.pool)
    .await?;
    Ok(license)
}

/// List the caller's licenses, newest first
pub async fn list_licenses(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<LicenseListResponse>> {
    let licenses: Vec<License> = sqlx::query_as(&format!(
        "SELECT {} FROM licenses WHERE account_id = $1 ORDER BY created_at DESC",
        LICENSE_COLUMNS
    ))
    .bind(auth_user.account_id)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(LicenseListResponse { licenses }))
}

/// Check whether the caller holds a currently-valid license for a theme
pub async fn check_license(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(theme_id): Path<Uuid>,
) -> ApiResult<Json<CheckResponse>> {
    let Some(license) = find_license(&state, auth_user.account_id, theme_id).await? else {
        return Ok(Json(CheckResponse {
            owned: false,
            reason: None,
            license: None,
        }));
    };

    match validate_license(&license, OffsetDateTime::now_utc()) {
        LicenseVerdict::Valid => Ok(Json(CheckResponse {
            owned: true,
            reason: None,
            license: Some(license),
        })),
        LicenseVerdict::Invalid(reason) => Ok(Json(CheckResponse {
            owned: false,
            reason: Some(reason),
            license: Some(license),
        })),
    }
}

/// Issue a license for a theme. Requires a role that can manage licenses.
pub async fn issue_license(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<IssueLicenseRequest>,
) -> ApiResult<Json<License>> {
    if !auth_user.role.can_issue_licenses() {
        return Err(ApiError::Forbidden);
    }

    if let Some(max) = req.max_downloads {
        if max <= 0 {
            return Err(ApiError::Validation(
                "max_downloads must be positive".to_string(),
            ));
        }
    }

    let license_type = match req.license_type.as_deref() {
        None => LicenseType::Single,
        Some(raw) => raw
            .parse::<LicenseType>()
            .map_err(ApiError::Validation)?,
    };

    // Theme must exist and still be sold
    let theme: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM themes WHERE id = $1 AND active = TRUE")
            .bind(req.theme_id)
            .fetch_optional(&state.pool)
            .await?;
    if theme.is_none() {
        return Err(ApiError::NotFound);
    }

    let license_key = generate_license_key(&state.config.license_key_prefix);

    let license: License = sqlx::query_as(&format!(
        "INSERT INTO licenses (account_id, theme_id, license_key, license_type, \
         max_downloads, expires_at) VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
        LICENSE_COLUMNS
    ))
    .bind(auth_user.account_id)
    .bind(req.theme_id)
    .bind(&license_key)
    .bind(license_type.to_string())
    .bind(req.max_downloads)
    .bind(req.expires_at)
    .fetch_one(&state.pool)
    .await?;

    tracing::info!(
        account_id = %auth_user.account_id,
        theme_id = %req.theme_id,
        license_id = %license.id,
        "License issued"
    );

    Ok(Json(license))
}

/// Guarded usage increment. The ceiling and expiry are re-checked inside
/// the statement, so two concurrent consumers of the last remaining
/// download cannot both succeed. `None` means the guard refused it.
async fn increment_download(
    pool: &PgPool,
    license_id: Uuid,
) -> Result<Option<License>, sqlx::Error> {
    sqlx::query_as(&format!(
        "UPDATE licenses SET download_count = download_count + 1 \
         WHERE id = $1 \
           AND (expires_at IS NULL OR expires_at >= NOW()) \
           AND (max_downloads IS NULL OR download_count < max_downloads) \
         RETURNING {}",
        LICENSE_COLUMNS
    ))
    .bind(license_id)
    .fetch_optional(pool)
    .await
}

/// Record one download against a license
pub async fn consume_license(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(theme_id): Path<Uuid>,
) -> ApiResult<Json<ConsumeResponse>> {
    let Some(license) = find_license(&state, auth_user.account_id, theme_id).await? else {
        return Err(ApiError::NotFound);
    };

    let updated = increment_download(&state.pool, license.id).await?;

    match updated {
        Some(license) => {
            let remaining = license.max_downloads.map(|max| max - license.download_count);
            Ok(Json(ConsumeResponse {
                allowed: true,
                reason: None,
                download_count: license.download_count,
                remaining,
            }))
        }
        None => {
            // The guard refused the increment; classify the denial with the
            // same ordering the validator uses (expiry first)
            let reason = match validate_license(&license, OffsetDateTime::now_utc()) {
                LicenseVerdict::Invalid(reason) => reason,
                // Lost a race on the final download between fetch and update
                LicenseVerdict::Valid => InvalidReason::Limit,
            };
            Ok(Json(ConsumeResponse {
                allowed: false,
                reason: Some(reason),
                download_count: license.download_count,
                remaining: license
                    .max_downloads
                    .map(|max| (max - license.download_count).max(0)),
            }))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("Failed to connect")
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_final_download_cannot_be_taken_twice() {
        let pool = test_pool().await;

        let (account_id,): (Uuid,) =
            sqlx::query_as("INSERT INTO accounts (name) VALUES ('consume-test') RETURNING id")
                .fetch_one(&pool)
                .await
                .unwrap();
        let (theme_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO themes (slug, name, price_cents) VALUES ($1, 'Consume Test', 0) RETURNING id",
        )
        .bind(format!("consume-test-{}", Uuid::new_v4()))
        .fetch_one(&pool)
        .await
        .unwrap();

        // One remaining download
        let license: License = sqlx::query_as(&format!(
            "INSERT INTO licenses (account_id, theme_id, license_key, license_type, max_downloads) \
             VALUES ($1, $2, $3, 'single', 1) RETURNING {}",
            LICENSE_COLUMNS
        ))
        .bind(account_id)
        .bind(theme_id)
        .bind(format!("THEME-{}", Uuid::new_v4()))
        .fetch_one(&pool)
        .await
        .unwrap();

        // First consume takes the last download
        let first = increment_download(&pool, license.id)
            .await
            .unwrap()
            .expect("first consume should pass the guard");
        assert_eq!(first.download_count, 1);

        // Second consume is refused by the guard, not just by the
        // read-side validator
        let second = increment_download(&pool, license.id).await.unwrap();
        assert!(second.is_none());

        // Counter stopped at the ceiling and the denial classifies as limit
        let after: License = sqlx::query_as(&format!(
            "SELECT {} FROM licenses WHERE id = $1",
            LICENSE_COLUMNS
        ))
        .bind(license.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(after.download_count, 1);
        assert_eq!(
            validate_license(&after, OffsetDateTime::now_utc()).reason(),
            Some(InvalidReason::Limit)
        );
    }
}

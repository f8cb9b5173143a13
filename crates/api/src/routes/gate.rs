//! Feature gating endpoint

use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;

use themeloft_billing::{account_locked, evaluate_gate, GateDecision};
use themeloft_shared::{PlanTier, SubscriptionStatus};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct GateQuery {
    pub required: String,
}

/// Can the caller's account use a feature gated at the given tier?
///
/// A locked subscription (past due, canceled, unknown, or absent) gates the
/// account as Free regardless of its cached tier.
pub async fn check_gate(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<GateQuery>,
) -> ApiResult<Json<GateDecision>> {
    // The required tier comes from the client: an unknown value is their
    // error, not something to silently coerce
    let required: PlanTier = query
        .required
        .parse()
        .map_err(|_| ApiError::Validation(format!("Unknown plan tier: {}", query.required)))?;

    let row: Option<(String, String)> = sqlx::query_as(
        r#"
        SELECT s.status, s.plan_tier
        FROM subscriptions s WHERE s.account_id = $1
        "#,
    )
    .bind(auth_user.account_id)
    .fetch_optional(&state.pool)
    .await?;

    let current = match &row {
        Some((status, plan_tier)) => {
            let status = SubscriptionStatus::from_str_lossy(status);
            if account_locked(Some(status)) {
                None
            } else {
                Some(PlanTier::from_str_lossy(plan_tier))
            }
        }
        None => None,
    };

    Ok(Json(evaluate_gate(current, required)))
}

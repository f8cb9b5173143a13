//! Subscription status endpoint

use axum::{extract::State, Extension, Json};
use serde::Serialize;

use themeloft_billing::{account_locked, allowed_seats};
use themeloft_shared::{PlanTier, SubscriptionRecord, SubscriptionStatus};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    pub status: SubscriptionStatus,
    pub tier: PlanTier,
    pub locked: bool,
    /// None means unlimited
    pub allowed_seats: Option<u32>,
    pub used_seats: i64,
    pub cancel_at_period_end: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_end: Option<time::OffsetDateTime>,
}

/// Current subscription state for the caller's account.
/// A missing subscription row reports Unknown/locked on the Free tier.
pub async fn get_subscription(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<SubscriptionResponse>> {
    let subscription: Option<SubscriptionRecord> = sqlx::query_as(
        r#"
        SELECT id, account_id, stripe_subscription_id, status, plan_tier,
               current_period_end, cancel_at_period_end, created_at, updated_at
        FROM subscriptions WHERE account_id = $1
        "#,
    )
    .bind(auth_user.account_id)
    .fetch_optional(&state.pool)
    .await?;

    let status = subscription
        .as_ref()
        .map(|s| s.status_enum())
        .unwrap_or_default();
    let tier = subscription
        .as_ref()
        .map(|s| s.tier())
        .unwrap_or(PlanTier::Free);
    let locked = account_locked(subscription.as_ref().map(|s| s.status_enum()));

    // Seat allowance consults Stripe metadata when billing is live; without
    // it the tier's base allotment stands alone
    let allowance = match state.billing.as_ref() {
        Some(billing) => billing.seats.allowed_seats_for_account(auth_user.account_id, tier).await,
        None => allowed_seats(tier, None),
    };

    let used_seats: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE account_id = $1")
        .bind(auth_user.account_id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(SubscriptionResponse {
        status,
        tier,
        locked,
        allowed_seats: allowance.limit(),
        used_seats: used_seats.0,
        cancel_at_period_end: subscription
            .as_ref()
            .map(|s| s.cancel_at_period_end)
            .unwrap_or(false),
        current_period_end: subscription.and_then(|s| s.current_period_end),
    }))
}

//! Billing endpoints: checkout, portal, webhook, event log

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use themeloft_billing::{ActorType, BillingEventBuilder, BillingEventKind, BillingEventRecord};
use themeloft_shared::Theme;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCheckoutRequest {
    pub tier: String,
}

#[derive(Debug, Deserialize)]
pub struct ThemeCheckoutRequest {
    pub theme_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
    pub session_id: String,
}

/// Start a subscription checkout for a plan tier
pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<CreateCheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let account_name = account_name(&state, auth_user.account_id).await?;
    let customer_id = billing
        .checkout
        .ensure_customer(auth_user.account_id, &auth_user.email, &account_name)
        .await?;

    let session = billing
        .checkout
        .create_subscription_checkout(auth_user.account_id, &customer_id, &req.tier)
        .await?;

    let url = session.url.ok_or(ApiError::Upstream)?;
    Ok(Json(CheckoutResponse {
        url,
        session_id: session.id.to_string(),
    }))
}

/// Start a one-time checkout for a theme purchase.
/// The license is issued by the webhook once payment completes.
pub async fn create_theme_checkout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<ThemeCheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let theme: Option<Theme> = sqlx::query_as(
        "SELECT id, slug, name, price_cents, active, created_at \
         FROM themes WHERE id = $1 AND active = TRUE",
    )
    .bind(req.theme_id)
    .fetch_optional(&state.pool)
    .await?;
    let theme = theme.ok_or(ApiError::NotFound)?;

    let account_name = account_name(&state, auth_user.account_id).await?;
    let customer_id = billing
        .checkout
        .ensure_customer(auth_user.account_id, &auth_user.email, &account_name)
        .await?;

    let session = billing
        .checkout
        .create_theme_checkout(auth_user.account_id, &customer_id, &theme)
        .await?;

    let url = session.url.ok_or(ApiError::Upstream)?;
    Ok(Json(CheckoutResponse {
        url,
        session_id: session.id.to_string(),
    }))
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

/// Open the Stripe billing portal for the caller's account
pub async fn create_portal_session(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> ApiResult<Json<PortalResponse>> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let customer_id: Option<(Option<String>,)> =
        sqlx::query_as("SELECT stripe_customer_id FROM accounts WHERE id = $1")
            .bind(auth_user.account_id)
            .fetch_optional(&state.pool)
            .await?;
    let customer_id = customer_id
        .and_then(|(id,)| id)
        .ok_or_else(|| ApiError::BadRequest("Account has no billing profile".to_string()))?;

    let url = billing
        .portal
        .portal_url(auth_user.account_id, &customer_id)
        .await?;

    Ok(Json(PortalResponse { url }))
}

/// Handle Stripe webhook events
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, ApiError> {
    tracing::info!(body_len = body.len(), "Stripe webhook received");

    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook missing signature header");
            ApiError::BadRequest("Missing Stripe signature".to_string())
        })?;

    let event = billing.webhooks.verify_event(&body, signature).map_err(|e| {
        tracing::warn!(error = ?e, "Stripe webhook signature verification failed");
        ApiError::BadRequest("Invalid webhook signature".to_string())
    })?;

    tracing::info!(
        event_type = %event.type_,
        event_id = %event.id,
        "Stripe webhook event verified"
    );

    billing.webhooks.handle_event(event).await.map_err(|e| {
        tracing::error!("Webhook handling error: {}", e);
        ApiError::Database(format!("Webhook handling error: {}", e))
    })?;

    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<BillingEventRecord>,
}

/// Billing event history for the caller's account, newest first
pub async fn get_events(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<Json<EventsResponse>> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 200);
    let events = billing
        .events
        .get_events_for_account(auth_user.account_id, limit)
        .await?;

    Ok(Json(EventsResponse { events }))
}

#[derive(Debug, Deserialize)]
pub struct PostEventRequest {
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct PostEventResponse {
    pub id: Uuid,
}

/// Append a billing event on behalf of the caller (QA and manual entries).
/// Events are write-once; there is no update or delete surface.
pub async fn post_event(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Json(req): Json<PostEventRequest>,
) -> ApiResult<Json<PostEventResponse>> {
    let billing = state.billing.as_ref().ok_or(ApiError::ServiceUnavailable)?;

    let kind: BillingEventKind = req
        .kind
        .parse()
        .map_err(|_| ApiError::Validation(format!("Unknown event kind: {}", req.kind)))?;

    let id = billing
        .events
        .log_event(
            BillingEventBuilder::new(auth_user.account_id, kind)
                .data(req.data)
                .actor_type(ActorType::User),
        )
        .await?;

    Ok(Json(PostEventResponse { id }))
}

async fn account_name(state: &AppState, account_id: Uuid) -> ApiResult<String> {
    let row: Option<(String,)> = sqlx::query_as("SELECT name FROM accounts WHERE id = $1")
        .bind(account_id)
        .fetch_optional(&state.pool)
        .await?;
    row.map(|(name,)| name).ok_or(ApiError::NotFound)
}

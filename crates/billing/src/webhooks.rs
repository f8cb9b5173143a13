//! Stripe webhook verification and event handling
//!
//! Signature verification is done manually with HMAC-SHA256 over the raw
//! request body (workaround for async-stripe API version incompatibility
//! with current Stripe event payloads). Events are parsed as plain JSON and
//! dispatched on the event type string.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use themeloft_shared::SubscriptionStatus;

use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::events::{ActorType, BillingEventBuilder, BillingEventKind, BillingEventLogger};
use crate::license::generate_license_key;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp before the event is rejected
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// A verified Stripe event, parsed loosely from JSON
#[derive(Debug, serde::Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub data: WebhookEventData,
}

#[derive(Debug, serde::Deserialize)]
pub struct WebhookEventData {
    pub object: serde_json::Value,
}

/// Parsed `stripe-signature` header: timestamp plus v1 signatures
struct SignatureHeader {
    timestamp: i64,
    v1_signatures: Vec<String>,
}

fn parse_signature_header(header: &str) -> Option<SignatureHeader> {
    let mut timestamp = None;
    let mut v1_signatures = Vec::new();

    for part in header.split(',') {
        let (key, value) = part.trim().split_once('=')?;
        match key {
            "t" => timestamp = value.parse::<i64>().ok(),
            "v1" => v1_signatures.push(value.to_string()),
            _ => {} // v0 and unknown schemes are ignored
        }
    }

    Some(SignatureHeader {
        timestamp: timestamp?,
        v1_signatures,
    })
}

fn verify_signature(
    payload: &str,
    header: &SignatureHeader,
    secret: &str,
    now: OffsetDateTime,
) -> BillingResult<()> {
    let age = now.unix_timestamp() - header.timestamp;
    if age.abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(BillingError::WebhookSignatureInvalid(format!(
            "Timestamp outside tolerance ({}s)",
            age
        )));
    }

    if header.v1_signatures.is_empty() {
        return Err(BillingError::WebhookSignatureInvalid(
            "No v1 signature present".to_string(),
        ));
    }

    let signed_payload = format!("{}.{}", header.timestamp, payload);
    for candidate in &header.v1_signatures {
        let Ok(expected) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
            BillingError::Config("Webhook secret unusable as HMAC key".to_string())
        })?;
        mac.update(signed_payload.as_bytes());
        // verify_slice is constant-time
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }

    Err(BillingError::WebhookSignatureInvalid(
        "Signature mismatch".to_string(),
    ))
}

/// Webhook service: verifies signatures and applies lifecycle events
/// to the subscriptions, accounts, and licenses tables.
pub struct WebhookService {
    pool: PgPool,
    config: StripeConfig,
    events: BillingEventLogger,
    license_key_prefix: String,
}

impl WebhookService {
    pub fn new(pool: PgPool, config: StripeConfig, license_key_prefix: impl Into<String>) -> Self {
        let events = BillingEventLogger::new(pool.clone());
        Self {
            pool,
            config,
            events,
            license_key_prefix: license_key_prefix.into(),
        }
    }

    /// Verify the `stripe-signature` header against the raw body and parse
    /// the event. Rejects stale timestamps and unknown signatures.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<WebhookEvent> {
        let header = parse_signature_header(signature).ok_or_else(|| {
            BillingError::WebhookSignatureInvalid("Malformed signature header".to_string())
        })?;

        verify_signature(
            payload,
            &header,
            &self.config.webhook_secret,
            OffsetDateTime::now_utc(),
        )?;

        serde_json::from_str(payload).map_err(|e| {
            BillingError::InvalidInput(format!("Unparsable webhook payload: {}", e))
        })
    }

    /// Dispatch a verified event. Unhandled event types are logged and
    /// acknowledged so Stripe does not retry them.
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<()> {
        match event.type_.as_str() {
            "checkout.session.completed" => self.handle_checkout_completed(&event).await,
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.handle_subscription_updated(&event).await
            }
            "customer.subscription.deleted" => self.handle_subscription_deleted(&event).await,
            "invoice.payment_failed" => self.handle_payment_failed(&event).await,
            other => {
                tracing::debug!(event_type = %other, event_id = %event.id, "Ignoring webhook event");
                Ok(())
            }
        }
    }

    async fn account_by_customer(&self, customer_id: &str) -> BillingResult<Option<Uuid>> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM accounts WHERE stripe_customer_id = $1")
                .bind(customer_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(id,)| id))
    }

    async fn current_account_tier(&self, account_id: Uuid) -> BillingResult<String> {
        let row: Option<(String,)> = sqlx::query_as("SELECT plan_tier FROM accounts WHERE id = $1")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(tier,)| tier).unwrap_or_else(|| "free".to_string()))
    }

    async fn handle_checkout_completed(&self, event: &WebhookEvent) -> BillingResult<()> {
        let obj = &event.data.object;
        let metadata = obj.get("metadata").cloned().unwrap_or_default();

        let account_id = metadata
            .get("account_id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| {
                BillingError::InvalidInput("Checkout session missing account_id metadata".to_string())
            })?;

        let checkout_type = metadata
            .get("checkout_type")
            .and_then(|v| v.as_str())
            .unwrap_or("subscription");

        match checkout_type {
            "theme_purchase" => {
                let theme_id = metadata
                    .get("theme_id")
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| {
                        BillingError::InvalidInput(
                            "Theme checkout missing theme_id metadata".to_string(),
                        )
                    })?;

                self.issue_purchased_license(account_id, theme_id, &event.id)
                    .await
            }
            _ => {
                let tier = metadata
                    .get("tier")
                    .and_then(|v| v.as_str())
                    .unwrap_or("free")
                    .to_string();
                let subscription_id = obj.get("subscription").and_then(|v| v.as_str());

                let from_tier = self.current_account_tier(account_id).await?;

                sqlx::query(
                    r#"
                    INSERT INTO subscriptions (account_id, stripe_subscription_id, status, plan_tier)
                    VALUES ($1, $2, 'active', $3)
                    ON CONFLICT (account_id) DO UPDATE SET
                        stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                        status = 'active',
                        plan_tier = EXCLUDED.plan_tier,
                        updated_at = NOW()
                    "#,
                )
                .bind(account_id)
                .bind(subscription_id)
                .bind(&tier)
                .execute(&self.pool)
                .await?;

                sqlx::query("UPDATE accounts SET plan_tier = $1, updated_at = NOW() WHERE id = $2")
                    .bind(&tier)
                    .bind(account_id)
                    .execute(&self.pool)
                    .await?;

                self.events
                    .log_plan_change(
                        account_id,
                        BillingEventKind::Activated,
                        &from_tier,
                        &tier,
                        Some(&event.id),
                        subscription_id,
                    )
                    .await?;

                tracing::info!(
                    account_id = %account_id,
                    tier = %tier,
                    "Subscription checkout completed"
                );
                Ok(())
            }
        }
    }

    /// Insert the license for a completed one-time theme purchase.
    /// Purchased licenses carry no download ceiling and no expiry.
    async fn issue_purchased_license(
        &self,
        account_id: Uuid,
        theme_id: Uuid,
        stripe_event_id: &str,
    ) -> BillingResult<()> {
        // Stripe redelivers events; an event already in the log means the
        // license was issued on a previous delivery
        let already_processed: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM billing_events WHERE stripe_event_id = $1 LIMIT 1")
                .bind(stripe_event_id)
                .fetch_optional(&self.pool)
                .await?;
        if already_processed.is_some() {
            tracing::info!(
                account_id = %account_id,
                stripe_event_id = %stripe_event_id,
                "Duplicate checkout event, license already issued"
            );
            return Ok(());
        }

        let license_key = generate_license_key(&self.license_key_prefix);

        let license_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO licenses (account_id, theme_id, license_key, license_type)
            VALUES ($1, $2, $3, 'single')
            RETURNING id
            "#,
        )
        .bind(account_id)
        .bind(theme_id)
        .bind(&license_key)
        .fetch_one(&self.pool)
        .await?;

        self.events
            .log_event(
                BillingEventBuilder::new(account_id, BillingEventKind::Activated)
                    .data(serde_json::json!({
                        "theme_id": theme_id,
                        "license_id": license_id.0,
                    }))
                    .stripe_event(stripe_event_id)
                    .actor_type(ActorType::Stripe),
            )
            .await?;

        tracing::info!(
            account_id = %account_id,
            theme_id = %theme_id,
            license_id = %license_id.0,
            "Issued license for purchased theme"
        );
        Ok(())
    }

    async fn handle_subscription_updated(&self, event: &WebhookEvent) -> BillingResult<()> {
        let obj = &event.data.object;

        let customer_id = obj
            .get("customer")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BillingError::InvalidInput("Subscription missing customer".to_string()))?;

        let Some(account_id) = self.account_by_customer(customer_id).await? else {
            tracing::warn!(customer_id = %customer_id, "Subscription event for unknown customer");
            return Ok(());
        };

        let subscription_id = obj.get("id").and_then(|v| v.as_str());
        let raw_status = obj.get("status").and_then(|v| v.as_str()).unwrap_or("unknown");
        let status = SubscriptionStatus::from_str_lossy(raw_status);

        // First line item's price determines the tier. Unknown price IDs
        // leave the stored tier untouched.
        let tier = obj
            .get("items")
            .and_then(|v| v.get("data"))
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("price"))
            .and_then(|v| v.get("id"))
            .and_then(|v| v.as_str())
            .and_then(|price_id| self.config.tier_for_price_id(price_id));

        let current_period_end = obj
            .get("current_period_end")
            .and_then(|v| v.as_i64())
            .and_then(|ts| OffsetDateTime::from_unix_timestamp(ts).ok());

        let cancel_at_period_end = obj
            .get("cancel_at_period_end")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let from_tier = self.current_account_tier(account_id).await?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                account_id, stripe_subscription_id, status, plan_tier,
                current_period_end, cancel_at_period_end
            )
            VALUES ($1, $2, $3, COALESCE($4, 'free'), $5, $6)
            ON CONFLICT (account_id) DO UPDATE SET
                stripe_subscription_id = EXCLUDED.stripe_subscription_id,
                status = EXCLUDED.status,
                plan_tier = COALESCE($4, subscriptions.plan_tier),
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                updated_at = NOW()
            "#,
        )
        .bind(account_id)
        .bind(subscription_id)
        .bind(raw_status)
        .bind(tier)
        .bind(current_period_end)
        .bind(cancel_at_period_end)
        .execute(&self.pool)
        .await?;

        if let Some(tier) = tier {
            sqlx::query("UPDATE accounts SET plan_tier = $1, updated_at = NOW() WHERE id = $2")
                .bind(tier)
                .bind(account_id)
                .execute(&self.pool)
                .await?;

            if tier != from_tier {
                self.events
                    .log_plan_change(
                        account_id,
                        BillingEventKind::Upgrade,
                        &from_tier,
                        tier,
                        Some(&event.id),
                        subscription_id,
                    )
                    .await?;
            }
        }

        tracing::info!(
            account_id = %account_id,
            status = %raw_status,
            unlocked = status.unlocked(),
            tier = tier.unwrap_or("unchanged"),
            "Subscription updated"
        );
        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: &WebhookEvent) -> BillingResult<()> {
        let obj = &event.data.object;

        let customer_id = obj
            .get("customer")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BillingError::InvalidInput("Subscription missing customer".to_string()))?;

        let Some(account_id) = self.account_by_customer(customer_id).await? else {
            tracing::warn!(customer_id = %customer_id, "Subscription deletion for unknown customer");
            return Ok(());
        };

        let subscription_id = obj.get("id").and_then(|v| v.as_str());
        let from_tier = self.current_account_tier(account_id).await?;

        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = 'canceled', plan_tier = 'free',
                cancel_at_period_end = FALSE, updated_at = NOW()
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        sqlx::query("UPDATE accounts SET plan_tier = 'free', updated_at = NOW() WHERE id = $1")
            .bind(account_id)
            .execute(&self.pool)
            .await?;

        self.events
            .log_plan_change(
                account_id,
                BillingEventKind::Cancel,
                &from_tier,
                "free",
                Some(&event.id),
                subscription_id,
            )
            .await?;

        tracing::info!(account_id = %account_id, "Subscription canceled, account downgraded");
        Ok(())
    }

    async fn handle_payment_failed(&self, event: &WebhookEvent) -> BillingResult<()> {
        let obj = &event.data.object;

        let customer_id = obj
            .get("customer")
            .and_then(|v| v.as_str())
            .ok_or_else(|| BillingError::InvalidInput("Invoice missing customer".to_string()))?;

        let Some(account_id) = self.account_by_customer(customer_id).await? else {
            tracing::warn!(customer_id = %customer_id, "Payment failure for unknown customer");
            return Ok(());
        };

        let subscription_id = obj.get("subscription").and_then(|v| v.as_str());

        sqlx::query(
            "UPDATE subscriptions SET status = 'past_due', updated_at = NOW() WHERE account_id = $1",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await?;

        self.events
            .log_payment_failed(account_id, &event.id, subscription_id)
            .await?;

        tracing::warn!(account_id = %account_id, "Payment failed, subscription marked past_due");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, timestamp: i64) -> String {
        let signed_payload = format!("{}.{}", timestamp, payload);
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn parses_signature_header() {
        let header = parse_signature_header("t=1700000000,v1=abc123,v0=ignored").unwrap();
        assert_eq!(header.timestamp, 1_700_000_000);
        assert_eq!(header.v1_signatures, vec!["abc123".to_string()]);
    }

    #[test]
    fn rejects_header_without_timestamp() {
        assert!(parse_signature_header("v1=abc123").is_none());
        assert!(parse_signature_header("garbage").is_none());
    }

    #[test]
    fn accepts_valid_signature() {
        let payload = r#"{"id":"evt_1","type":"invoice.payment_failed","data":{"object":{}}}"#;
        let now = OffsetDateTime::now_utc();
        let ts = now.unix_timestamp();
        let header = SignatureHeader {
            timestamp: ts,
            v1_signatures: vec![sign(payload, ts)],
        };
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn rejects_tampered_payload() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = OffsetDateTime::now_utc();
        let ts = now.unix_timestamp();
        let header = SignatureHeader {
            timestamp: ts,
            v1_signatures: vec![sign(payload, ts)],
        };
        let result = verify_signature(r#"{"id":"evt_2"}"#, &header, SECRET, now);
        assert!(matches!(
            result,
            Err(BillingError::WebhookSignatureInvalid(_))
        ));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = OffsetDateTime::now_utc();
        let ts = now.unix_timestamp() - SIGNATURE_TOLERANCE_SECS - 1;
        let header = SignatureHeader {
            timestamp: ts,
            v1_signatures: vec![sign(payload, ts)],
        };
        let result = verify_signature(payload, &header, SECRET, now);
        assert!(matches!(
            result,
            Err(BillingError::WebhookSignatureInvalid(_))
        ));
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = r#"{"id":"evt_1"}"#;
        let now = OffsetDateTime::now_utc();
        let ts = now.unix_timestamp();
        let signed_payload = format!("{}.{}", ts, payload);
        let mut mac = HmacSha256::new_from_slice(b"whsec_other").unwrap();
        mac.update(signed_payload.as_bytes());
        let header = SignatureHeader {
            timestamp: ts,
            v1_signatures: vec![hex::encode(mac.finalize().into_bytes())],
        };
        assert!(verify_signature(payload, &header, SECRET, now).is_err());
    }

    async fn test_pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("Failed to connect")
    }

    fn test_config() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_dummy".to_string(),
            webhook_secret: SECRET.to_string(),
            price_ids: crate::client::PriceIds {
                starter: "price_starter".to_string(),
                pro: "price_pro".to_string(),
                accelerator: "price_accelerator".to_string(),
                extra_seats: None,
            },
            app_base_url: "http://localhost:3000".to_string(),
        }
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_redelivered_checkout_issues_one_license() {
        let pool = test_pool().await;
        let service = WebhookService::new(pool.clone(), test_config(), "THEME");

        let (account_id,): (Uuid,) =
            sqlx::query_as("INSERT INTO accounts (name) VALUES ('redelivery-test') RETURNING id")
                .fetch_one(&pool)
                .await
                .unwrap();
        let (theme_id,): (Uuid,) = sqlx::query_as(
            "INSERT INTO themes (slug, name, price_cents) VALUES ($1, 'Redelivery Test', 4900) RETURNING id",
        )
        .bind(format!("redelivery-test-{}", Uuid::new_v4()))
        .fetch_one(&pool)
        .await
        .unwrap();

        let event_id = format!("evt_{}", Uuid::new_v4().simple());

        // Stripe delivers the same checkout.session.completed twice
        service
            .issue_purchased_license(account_id, theme_id, &event_id)
            .await
            .unwrap();
        service
            .issue_purchased_license(account_id, theme_id, &event_id)
            .await
            .unwrap();

        let (licenses,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM licenses WHERE account_id = $1 AND theme_id = $2",
        )
        .bind(account_id)
        .bind(theme_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(licenses, 1);
    }

    #[test]
    fn parses_event_payload() {
        let payload = r#"{
            "id": "evt_123",
            "type": "customer.subscription.updated",
            "data": { "object": { "status": "active", "customer": "cus_9" } }
        }"#;
        let event: WebhookEvent = serde_json::from_str(payload).unwrap();
        assert_eq!(event.id, "evt_123");
        assert_eq!(event.type_, "customer.subscription.updated");
        assert_eq!(
            event.data.object.get("status").and_then(|v| v.as_str()),
            Some("active")
        );
    }
}

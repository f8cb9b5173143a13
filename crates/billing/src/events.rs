//! Billing event log
//!
//! Append-only record of subscription lifecycle transitions: activations,
//! payment failures, rollbacks, upgrades, cancellations, and custom QA
//! events. Rows are write-once and queried newest-first to answer "why is
//! this account on this tier?" questions.

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::BillingResult;

/// Kinds of billing events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BillingEventKind {
    Activated,
    PaymentFailed,
    Rollback,
    Upgrade,
    Cancel,
    QaTest,
}

impl std::fmt::Display for BillingEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BillingEventKind::Activated => "ACTIVATED",
            BillingEventKind::PaymentFailed => "PAYMENT_FAILED",
            BillingEventKind::Rollback => "ROLLBACK",
            BillingEventKind::Upgrade => "UPGRADE",
            BillingEventKind::Cancel => "CANCEL",
            BillingEventKind::QaTest => "QA_TEST",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for BillingEventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVATED" => Ok(Self::Activated),
            "PAYMENT_FAILED" => Ok(Self::PaymentFailed),
            "ROLLBACK" => Ok(Self::Rollback),
            "UPGRADE" => Ok(Self::Upgrade),
            "CANCEL" => Ok(Self::Cancel),
            "QA_TEST" => Ok(Self::QaTest),
            _ => Err(format!("Invalid billing event kind: {}", s)),
        }
    }
}

/// Who triggered the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    /// End user through the dashboard
    User,
    /// System automation
    System,
    /// Stripe webhook
    Stripe,
}

impl std::fmt::Display for ActorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActorType::User => write!(f, "user"),
            ActorType::System => write!(f, "system"),
            ActorType::Stripe => write!(f, "stripe"),
        }
    }
}

/// A stored billing event
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BillingEventRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub stripe_event_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub actor_type: String,
    pub created_at: OffsetDateTime,
}

/// Builder for new billing events
pub struct BillingEventBuilder {
    account_id: Uuid,
    kind: BillingEventKind,
    event_data: serde_json::Value,
    stripe_event_id: Option<String>,
    stripe_subscription_id: Option<String>,
    actor_type: ActorType,
}

impl BillingEventBuilder {
    pub fn new(account_id: Uuid, kind: BillingEventKind) -> Self {
        Self {
            account_id,
            kind,
            event_data: serde_json::json!({}),
            stripe_event_id: None,
            stripe_subscription_id: None,
            actor_type: ActorType::System,
        }
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.event_data = data;
        self
    }

    pub fn stripe_event(mut self, event_id: impl Into<String>) -> Self {
        self.stripe_event_id = Some(event_id.into());
        self
    }

    pub fn stripe_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.stripe_subscription_id = Some(subscription_id.into());
        self
    }

    pub fn actor_type(mut self, actor_type: ActorType) -> Self {
        self.actor_type = actor_type;
        self
    }
}

/// Service for appending and querying billing events
#[derive(Clone)]
pub struct BillingEventLogger {
    pool: PgPool,
}

impl BillingEventLogger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append one event. There is no update path; the table is write-once.
    pub async fn log_event(&self, builder: BillingEventBuilder) -> BillingResult<Uuid> {
        let event_id: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO billing_events (
                account_id,
                event_type,
                event_data,
                stripe_event_id,
                stripe_subscription_id,
                actor_type
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(builder.account_id)
        .bind(builder.kind.to_string())
        .bind(&builder.event_data)
        .bind(&builder.stripe_event_id)
        .bind(&builder.stripe_subscription_id)
        .bind(builder.actor_type.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(event_id.0)
    }

    /// Recent events for an account, newest first
    pub async fn get_events_for_account(
        &self,
        account_id: Uuid,
        limit: i64,
    ) -> BillingResult<Vec<BillingEventRecord>> {
        let events: Vec<BillingEventRecord> = sqlx::query_as(
            r#"
            SELECT id, account_id, event_type, event_data,
                   stripe_event_id, stripe_subscription_id, actor_type, created_at
            FROM billing_events
            WHERE account_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    /// Events tied to a specific Stripe subscription, newest first
    pub async fn get_events_for_subscription(
        &self,
        stripe_subscription_id: &str,
        limit: i64,
    ) -> BillingResult<Vec<BillingEventRecord>> {
        let events: Vec<BillingEventRecord> = sqlx::query_as(
            r#"
            SELECT id, account_id, event_type, event_data,
                   stripe_event_id, stripe_subscription_id, actor_type, created_at
            FROM billing_events
            WHERE stripe_subscription_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(stripe_subscription_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

/// Convenience helpers for common scenarios
impl BillingEventLogger {
    /// Log a plan change driven by a Stripe webhook
    pub async fn log_plan_change(
        &self,
        account_id: Uuid,
        kind: BillingEventKind,
        from_tier: &str,
        to_tier: &str,
        stripe_event_id: Option<&str>,
        stripe_subscription_id: Option<&str>,
    ) -> BillingResult<Uuid> {
        let mut builder = BillingEventBuilder::new(account_id, kind)
            .data(serde_json::json!({
                "from_tier": from_tier,
                "to_tier": to_tier,
            }))
            .actor_type(ActorType::Stripe);

        if let Some(event_id) = stripe_event_id {
            builder = builder.stripe_event(event_id);
        }
        if let Some(sub_id) = stripe_subscription_id {
            builder = builder.stripe_subscription(sub_id);
        }

        self.log_event(builder).await
    }

    /// Log a payment failure
    pub async fn log_payment_failed(
        &self,
        account_id: Uuid,
        stripe_event_id: &str,
        stripe_subscription_id: Option<&str>,
    ) -> BillingResult<Uuid> {
        let mut builder = BillingEventBuilder::new(account_id, BillingEventKind::PaymentFailed)
            .stripe_event(stripe_event_id)
            .actor_type(ActorType::Stripe);

        if let Some(sub_id) = stripe_subscription_id {
            builder = builder.stripe_subscription(sub_id);
        }

        self.log_event(builder).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_display() {
        assert_eq!(BillingEventKind::Activated.to_string(), "ACTIVATED");
        assert_eq!(BillingEventKind::PaymentFailed.to_string(), "PAYMENT_FAILED");
        assert_eq!(BillingEventKind::QaTest.to_string(), "QA_TEST");
    }

    #[test]
    fn test_event_kind_round_trip() {
        for kind in [
            BillingEventKind::Activated,
            BillingEventKind::PaymentFailed,
            BillingEventKind::Rollback,
            BillingEventKind::Upgrade,
            BillingEventKind::Cancel,
            BillingEventKind::QaTest,
        ] {
            assert_eq!(kind.to_string().parse::<BillingEventKind>().unwrap(), kind);
        }
        assert!("REFUND".parse::<BillingEventKind>().is_err());
    }

    #[test]
    fn test_actor_type_display() {
        assert_eq!(ActorType::User.to_string(), "user");
        assert_eq!(ActorType::System.to_string(), "system");
        assert_eq!(ActorType::Stripe.to_string(), "stripe");
    }

    #[test]
    fn test_event_builder() {
        let account_id = Uuid::new_v4();
        let builder = BillingEventBuilder::new(account_id, BillingEventKind::Upgrade)
            .data(serde_json::json!({"to_tier": "pro"}))
            .stripe_subscription("sub_123")
            .actor_type(ActorType::Stripe);

        assert_eq!(builder.account_id, account_id);
        assert_eq!(builder.kind, BillingEventKind::Upgrade);
        assert_eq!(builder.stripe_subscription_id, Some("sub_123".to_string()));
        assert_eq!(builder.actor_type, ActorType::Stripe);
    }
}

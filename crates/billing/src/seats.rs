//! Seat/Quota Calculator
//!
//! Derives the effective allowed-seat count for an account: the plan tier's
//! base allotment plus any metered `extra_seats` add-on recorded on the Stripe
//! subscription's metadata. Metadata fetch or parse failures degrade to zero
//! add-on seats rather than erroring; seat display is best-effort, gating
//! decisions never depend on it.

use sqlx::PgPool;
use stripe::SubscriptionId;
use themeloft_shared::{PlanTier, SeatAllowance};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::BillingResult;

/// Metadata key on the Stripe subscription holding purchased add-on seats
const EXTRA_SEATS_KEY: &str = "extra_seats";

/// Parse an add-on seat count from raw metadata.
/// Missing or non-numeric values count as zero.
fn parse_addon_seats(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok()).unwrap_or(0)
}

/// Compute the allowed seats for a tier given raw add-on metadata.
///
/// An Unlimited base allotment absorbs add-ons; a Limited one is
/// `included + addon`.
pub fn allowed_seats(tier: PlanTier, addon_raw: Option<&str>) -> SeatAllowance {
    match tier.included_seats() {
        SeatAllowance::Unlimited => SeatAllowance::Unlimited,
        SeatAllowance::Limited(included) => {
            // Metadata is external input; an absurd add-on must not overflow
            SeatAllowance::Limited(included.saturating_add(parse_addon_seats(addon_raw)))
        }
    }
}

/// Seat computation backed by the store and Stripe
pub struct SeatService {
    stripe: StripeClient,
    pool: PgPool,
}

impl SeatService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Allowed seats for an account, combining its tier with any add-on seats
    /// recorded on the Stripe subscription.
    pub async fn allowed_seats_for_account(
        &self,
        account_id: Uuid,
        tier: PlanTier,
    ) -> SeatAllowance {
        // Unlimited short-circuits: no reason to call out to Stripe
        if tier.included_seats().is_unlimited() {
            return SeatAllowance::Unlimited;
        }

        let addon_raw = self.fetch_extra_seats_metadata(account_id).await;
        allowed_seats(tier, addon_raw.as_deref())
    }

    /// Count of users currently occupying seats under the account
    pub async fn used_seats(&self, account_id: Uuid) -> BillingResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Best-effort read of the `extra_seats` metadata value from Stripe.
    /// Any failure along the way is logged and treated as "no add-on".
    async fn fetch_extra_seats_metadata(&self, account_id: Uuid) -> Option<String> {
        let row: Option<(Option<String>,)> = match sqlx::query_as(
            "SELECT stripe_subscription_id FROM subscriptions WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                tracing::warn!(account_id = %account_id, error = %e, "Seat metadata lookup failed");
                return None;
            }
        };

        let sub_id = row.and_then(|(id,)| id)?;

        let sub_id = match sub_id.parse::<SubscriptionId>() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(account_id = %account_id, error = %e, "Invalid Stripe subscription ID");
                return None;
            }
        };

        match stripe::Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await {
            Ok(sub) => sub.metadata.get(EXTRA_SEATS_KEY).cloned(),
            Err(e) => {
                tracing::warn!(
                    account_id = %account_id,
                    error = %e,
                    "Failed to fetch subscription metadata; treating add-on seats as zero"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_plus_addon() {
        // base=5, add-on="3" -> 8
        assert_eq!(
            allowed_seats(PlanTier::Pro, Some("3")),
            SeatAllowance::Limited(8)
        );
    }

    #[test]
    fn test_missing_addon_is_zero() {
        // base=5, add-on=missing -> 5
        assert_eq!(
            allowed_seats(PlanTier::Pro, None),
            SeatAllowance::Limited(5)
        );
    }

    #[test]
    fn test_non_numeric_addon_is_zero() {
        assert_eq!(
            allowed_seats(PlanTier::Pro, Some("lots")),
            SeatAllowance::Limited(5)
        );
        assert_eq!(
            allowed_seats(PlanTier::Starter, Some("")),
            SeatAllowance::Limited(3)
        );
        assert_eq!(
            allowed_seats(PlanTier::Free, Some("-2")),
            SeatAllowance::Limited(1)
        );
    }

    #[test]
    fn test_unlimited_absorbs_addons() {
        // base=unlimited, add-on=anything -> unlimited
        assert_eq!(
            allowed_seats(PlanTier::Accelerator, Some("3")),
            SeatAllowance::Unlimited
        );
        assert_eq!(
            allowed_seats(PlanTier::Accelerator, None),
            SeatAllowance::Unlimited
        );
    }

    #[test]
    fn test_absurd_addon_saturates() {
        assert_eq!(
            allowed_seats(PlanTier::Pro, Some("4294967295")),
            SeatAllowance::Limited(u32::MAX)
        );
    }

    #[test]
    fn test_whitespace_tolerated() {
        assert_eq!(
            allowed_seats(PlanTier::Starter, Some(" 2 ")),
            SeatAllowance::Limited(5)
        );
    }
}

//! Plan/Access Evaluator
//!
//! Answers "is this account locked out of a gated feature right now?" from a
//! subscription status and a plan-tier comparison. Every ambiguous input
//! resolves to locked: a missing subscription row, an unparsable tier, an
//! unknown status, and an unauthenticated caller all behave as Free/locked.

use serde::{Deserialize, Serialize};
use themeloft_shared::{PlanTier, SubscriptionStatus};

/// Gating decision for one (current, required) tier pair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateDecision {
    pub locked: bool,
    pub current_tier: PlanTier,
    pub required_tier: PlanTier,
    /// Human-readable upgrade prompt, present only when locked
    pub message: Option<String>,
}

/// Decide whether an account is locked out of all gated features based on its
/// subscription status. `None` means no resolvable subscription: locked.
pub fn account_locked(status: Option<SubscriptionStatus>) -> bool {
    match status {
        Some(status) => status.is_locked(),
        None => true,
    }
}

/// Compare the account's tier against the tier a feature requires.
///
/// `current` is `None` for unauthenticated callers and accounts without a
/// resolvable plan; both gate as Free.
pub fn evaluate_gate(current: Option<PlanTier>, required: PlanTier) -> GateDecision {
    let current_tier = current.unwrap_or(PlanTier::Free);
    let locked = !current_tier.can_access(required);

    let message = locked.then(|| {
        format!(
            "This feature requires the {} plan. Upgrade from {} to unlock it.",
            required.display_name(),
            current_tier.display_name()
        )
    });

    GateDecision {
        locked,
        current_tier,
        required_tier: required,
        message,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_starter_cannot_access_pro_gate() {
        let decision = evaluate_gate(Some(PlanTier::Starter), PlanTier::Pro);
        assert!(decision.locked);
        assert!(decision.message.is_some());
    }

    #[test]
    fn test_equal_tier_unlocks() {
        let decision = evaluate_gate(Some(PlanTier::Pro), PlanTier::Pro);
        assert!(!decision.locked);
        assert!(decision.message.is_none());
    }

    #[test]
    fn test_accelerator_unlocks_everything() {
        for required in [
            PlanTier::Free,
            PlanTier::Starter,
            PlanTier::Pro,
            PlanTier::Accelerator,
        ] {
            assert!(!evaluate_gate(Some(PlanTier::Accelerator), required).locked);
        }
    }

    #[test]
    fn test_unauthenticated_caller_is_always_locked() {
        // No resolvable tier gates as Free: no access to any gated feature
        for required in [PlanTier::Starter, PlanTier::Pro, PlanTier::Accelerator] {
            let decision = evaluate_gate(None, required);
            assert!(decision.locked);
            assert_eq!(decision.current_tier, PlanTier::Free);
        }
        // A free-gated feature is open to everyone
        assert!(!evaluate_gate(None, PlanTier::Free).locked);
    }

    #[test]
    fn test_account_locked_by_status() {
        assert!(!account_locked(Some(SubscriptionStatus::Active)));
        assert!(!account_locked(Some(SubscriptionStatus::Trialing)));
        assert!(account_locked(Some(SubscriptionStatus::PastDue)));
        assert!(account_locked(Some(SubscriptionStatus::Canceled)));
        assert!(account_locked(Some(SubscriptionStatus::Inactive)));
        assert!(account_locked(Some(SubscriptionStatus::Unknown)));
        // No subscription row at all: fail closed
        assert!(account_locked(None));
    }

    #[test]
    fn test_upgrade_message_names_both_tiers() {
        let decision = evaluate_gate(Some(PlanTier::Free), PlanTier::Accelerator);
        let message = decision.message.unwrap();
        assert!(message.contains("Accelerator"));
        assert!(message.contains("Free"));
    }
}

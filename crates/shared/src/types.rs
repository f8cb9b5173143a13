//! Common types used across ThemeLoft

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

/// Account (tenant) ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for AccountId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// User ID wrapper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for UserId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

// =============================================================================
// Enums
// =============================================================================

/// Seat allotment for a plan tier
///
/// Accelerator accounts get an effectively unlimited allotment; add-on seats
/// never change an Unlimited allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatAllowance {
    Limited(u32),
    Unlimited,
}

impl SeatAllowance {
    /// The numeric seat limit, or None when unlimited
    pub fn limit(&self) -> Option<u32> {
        match self {
            Self::Limited(n) => Some(*n),
            Self::Unlimited => None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        matches!(self, Self::Unlimited)
    }
}

/// Subscription plan tier, ordered lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PlanTier {
    Free,
    Starter,
    Pro,
    Accelerator,
}

impl Default for PlanTier {
    fn default() -> Self {
        Self::Free
    }
}

impl PlanTier {
    /// Ordinal rank used for gating comparisons
    /// free(0) < starter(1) < pro(2) < accelerator(3)
    pub fn rank(&self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Starter => 1,
            Self::Pro => 2,
            Self::Accelerator => 3,
        }
    }

    /// Whether this tier can access a feature gated at `required`
    pub fn can_access(&self, required: PlanTier) -> bool {
        self.rank() >= required.rank()
    }

    /// Base included seat allotment for this tier
    pub fn included_seats(&self) -> SeatAllowance {
        match self {
            Self::Free => SeatAllowance::Limited(1),
            Self::Starter => SeatAllowance::Limited(3),
            Self::Pro => SeatAllowance::Limited(5),
            Self::Accelerator => SeatAllowance::Unlimited,
        }
    }

    /// Parse a tier from string, resolving anything unrecognized to Free.
    /// Gating decisions must fail closed, so an unparsable tier never grants
    /// more than the lowest tier would.
    pub fn from_str_lossy(s: &str) -> Self {
        s.parse().unwrap_or(Self::Free)
    }

    /// Human-readable display name for upgrade prompts
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Starter => "Starter",
            Self::Pro => "Pro",
            Self::Accelerator => "Accelerator",
        }
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Starter => write!(f, "starter"),
            Self::Pro => write!(f, "pro"),
            Self::Accelerator => write!(f, "accelerator"),
        }
    }
}

impl std::str::FromStr for PlanTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            "accelerator" => Ok(Self::Accelerator),
            _ => Err(format!("Invalid plan tier: {}", s)),
        }
    }
}

/// Subscription status as overwritten by billing webhooks
///
/// Only Active and Trialing unlock gated features; everything else, including
/// Unknown, locks the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Inactive,
    Unknown,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Unknown
    }
}

impl SubscriptionStatus {
    /// Parse a status from string; unrecognized values map to Unknown
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => Self::Active,
            "trialing" => Self::Trialing,
            "past_due" => Self::PastDue,
            "canceled" | "unpaid" => Self::Canceled,
            "inactive" | "incomplete" | "incomplete_expired" => Self::Inactive,
            _ => Self::Unknown,
        }
    }

    /// Whether this status unlocks gated features
    pub fn unlocked(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }

    pub fn is_locked(&self) -> bool {
        !self.unlocked()
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Trialing => write!(f, "trialing"),
            Self::PastDue => write!(f, "past_due"),
            Self::Canceled => write!(f, "canceled"),
            Self::Inactive => write!(f, "inactive"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// User role within an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Owner,
    Admin,
    Member,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::Member
    }
}

impl UserRole {
    /// Get the permission level for this role (higher = more permissions)
    pub fn level(&self) -> u8 {
        match self {
            Self::Owner => 2,
            Self::Admin => 1,
            Self::Member => 0,
        }
    }

    /// Check if this role can issue and revoke licenses
    pub fn can_issue_licenses(&self) -> bool {
        self.level() >= 1
    }

    /// Parse a role from string (case insensitive)
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "owner" => Self::Owner,
            "admin" => Self::Admin,
            _ => Self::Member,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Admin => write!(f, "admin"),
            Self::Member => write!(f, "member"),
        }
    }
}

/// License type for a purchased theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LicenseType {
    /// One install on one CRM sub-account
    Single,
    /// Reusable across sub-accounts, subject to the download ceiling
    Multi,
}

impl Default for LicenseType {
    fn default() -> Self {
        Self::Single
    }
}

impl std::fmt::Display for LicenseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single => write!(f, "single"),
            Self::Multi => write!(f, "multi"),
        }
    }
}

impl std::str::FromStr for LicenseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "multi" | "multi_use" => Ok(Self::Multi),
            _ => Err(format!("Invalid license type: {}", s)),
        }
    }
}

// =============================================================================
// Database Models
// =============================================================================

/// Account (tenant) model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub stripe_customer_id: Option<String>,
    pub plan_tier: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Account {
    /// Cached plan tier, fail-closed to Free when unparsable
    pub fn tier(&self) -> PlanTier {
        PlanTier::from_str_lossy(&self.plan_tier)
    }
}

/// User model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub account_id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Theme (purchasable item) model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Theme {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub price_cents: i32,
    pub active: bool,
    pub created_at: OffsetDateTime,
}

/// License model: a grant of usage rights for one theme to one account
///
/// Invariant: `download_count` never exceeds `max_downloads` when a ceiling is
/// set (enforced by a conditional update at the store layer). Once
/// `expires_at` has passed the license is permanently invalid regardless of
/// remaining downloads. Licenses are never deleted by this service.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct License {
    pub id: Uuid,
    pub account_id: Uuid,
    pub theme_id: Uuid,
    pub license_key: String,
    pub license_type: String,
    pub max_downloads: Option<i32>,
    pub download_count: i32,
    pub expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

/// Subscription model: one row per account, overwritten by webhooks
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRecord {
    pub id: Uuid,
    pub account_id: Uuid,
    pub stripe_subscription_id: Option<String>,
    pub status: String,
    pub plan_tier: String,
    pub current_period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl SubscriptionRecord {
    pub fn status_enum(&self) -> SubscriptionStatus {
        SubscriptionStatus::from_str_lossy(&self.status)
    }

    pub fn tier(&self) -> PlanTier {
        PlanTier::from_str_lossy(&self.plan_tier)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    // =========================================================================
    // PlanTier Tests
    // =========================================================================

    #[test]
    fn test_plan_tier_default() {
        assert_eq!(PlanTier::default(), PlanTier::Free);
    }

    #[test]
    fn test_plan_tier_ordering() {
        assert_eq!(PlanTier::Free.rank(), 0);
        assert_eq!(PlanTier::Starter.rank(), 1);
        assert_eq!(PlanTier::Pro.rank(), 2);
        assert_eq!(PlanTier::Accelerator.rank(), 3);
    }

    #[test]
    fn test_plan_tier_can_access() {
        // Access granted iff rank(current) >= rank(required)
        assert!(PlanTier::Pro.can_access(PlanTier::Pro));
        assert!(PlanTier::Pro.can_access(PlanTier::Starter));
        assert!(!PlanTier::Starter.can_access(PlanTier::Pro));
        assert!(!PlanTier::Free.can_access(PlanTier::Starter));

        // Accelerator can access every gated feature
        for required in [
            PlanTier::Free,
            PlanTier::Starter,
            PlanTier::Pro,
            PlanTier::Accelerator,
        ] {
            assert!(PlanTier::Accelerator.can_access(required));
        }
    }

    #[test]
    fn test_plan_tier_included_seats() {
        assert_eq!(PlanTier::Free.included_seats().limit(), Some(1));
        assert_eq!(PlanTier::Starter.included_seats().limit(), Some(3));
        assert_eq!(PlanTier::Pro.included_seats().limit(), Some(5));
        assert!(PlanTier::Accelerator.included_seats().is_unlimited());
    }

    #[test]
    fn test_plan_tier_from_str() {
        assert_eq!("free".parse::<PlanTier>().unwrap(), PlanTier::Free);
        assert_eq!("PRO".parse::<PlanTier>().unwrap(), PlanTier::Pro);
        assert_eq!(
            "Accelerator".parse::<PlanTier>().unwrap(),
            PlanTier::Accelerator
        );
        assert!("platinum".parse::<PlanTier>().is_err());
    }

    #[test]
    fn test_plan_tier_from_str_lossy_fails_closed() {
        assert_eq!(PlanTier::from_str_lossy("starter"), PlanTier::Starter);
        assert_eq!(PlanTier::from_str_lossy("platinum"), PlanTier::Free);
        assert_eq!(PlanTier::from_str_lossy(""), PlanTier::Free);
    }

    #[test]
    fn test_plan_tier_display() {
        assert_eq!(format!("{}", PlanTier::Free), "free");
        assert_eq!(format!("{}", PlanTier::Accelerator), "accelerator");
    }

    // =========================================================================
    // SubscriptionStatus Tests
    // =========================================================================

    #[test]
    fn test_subscription_status_unlocked() {
        assert!(SubscriptionStatus::Active.unlocked());
        assert!(SubscriptionStatus::Trialing.unlocked());
        assert!(SubscriptionStatus::PastDue.is_locked());
        assert!(SubscriptionStatus::Canceled.is_locked());
        assert!(SubscriptionStatus::Inactive.is_locked());
        assert!(SubscriptionStatus::Unknown.is_locked());
    }

    #[test]
    fn test_subscription_status_from_str_lossy() {
        assert_eq!(
            SubscriptionStatus::from_str_lossy("active"),
            SubscriptionStatus::Active
        );
        assert_eq!(
            SubscriptionStatus::from_str_lossy("past_due"),
            SubscriptionStatus::PastDue
        );
        assert_eq!(
            SubscriptionStatus::from_str_lossy("unpaid"),
            SubscriptionStatus::Canceled
        );
        // Unknown/unset status must map to locked
        assert_eq!(
            SubscriptionStatus::from_str_lossy("something_new"),
            SubscriptionStatus::Unknown
        );
        assert!(SubscriptionStatus::from_str_lossy("something_new").is_locked());
    }

    #[test]
    fn test_subscription_status_default_is_locked() {
        assert!(SubscriptionStatus::default().is_locked());
    }

    // =========================================================================
    // UserRole Tests
    // =========================================================================

    #[test]
    fn test_user_role_levels() {
        assert_eq!(UserRole::Member.level(), 0);
        assert_eq!(UserRole::Admin.level(), 1);
        assert_eq!(UserRole::Owner.level(), 2);
    }

    #[test]
    fn test_user_role_license_issuance() {
        assert!(!UserRole::Member.can_issue_licenses());
        assert!(UserRole::Admin.can_issue_licenses());
        assert!(UserRole::Owner.can_issue_licenses());
    }

    #[test]
    fn test_user_role_from_str_lossy() {
        assert_eq!(UserRole::from_str_lossy("owner"), UserRole::Owner);
        assert_eq!(UserRole::from_str_lossy("ADMIN"), UserRole::Admin);
        assert_eq!(UserRole::from_str_lossy("unknown"), UserRole::Member);
    }

    // =========================================================================
    // LicenseType Tests
    // =========================================================================

    #[test]
    fn test_license_type_parse() {
        assert_eq!("single".parse::<LicenseType>().unwrap(), LicenseType::Single);
        assert_eq!("multi".parse::<LicenseType>().unwrap(), LicenseType::Multi);
        assert_eq!(
            "multi_use".parse::<LicenseType>().unwrap(),
            LicenseType::Multi
        );
        assert!("site".parse::<LicenseType>().is_err());
    }

    // =========================================================================
    // ID Wrapper Tests
    // =========================================================================

    #[test]
    fn test_account_id_new() {
        let id1 = AccountId::new();
        let id2 = AccountId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_user_id_from_uuid() {
        let uuid = Uuid::new_v4();
        let user_id: UserId = uuid.into();
        assert_eq!(user_id.0, uuid);
    }
}

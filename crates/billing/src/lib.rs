//! ThemeLoft Billing
//!
//! The entitlement core of the platform: license validation and key
//! generation, plan-tier gating, seat calculation, the append-only billing
//! event log, and the Stripe-facing services (checkout, portal, webhooks).

pub mod checkout;
pub mod client;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod license;
pub mod portal;
pub mod seats;
pub mod webhooks;

pub use checkout::CheckoutService;
pub use client::{StripeClient, StripeConfig};
pub use entitlement::{account_locked, evaluate_gate, GateDecision};
pub use error::{BillingError, BillingResult};
pub use events::{
    ActorType, BillingEventBuilder, BillingEventKind, BillingEventLogger, BillingEventRecord,
};
pub use license::{generate_license_key, validate_license, InvalidReason, LicenseVerdict};
pub use portal::PortalService;
pub use seats::{allowed_seats, SeatService};
pub use webhooks::{WebhookEvent, WebhookService};

//! Shared application state

use std::sync::Arc;

use sqlx::PgPool;
use themeloft_billing::{
    BillingEventLogger, CheckoutService, PortalService, SeatService, StripeClient, StripeConfig,
    WebhookService,
};

use crate::auth::JwtManager;
use crate::config::Config;

/// Stripe-backed services, present only when billing is enabled and a
/// Stripe key is configured. Handlers that need them return 503 otherwise.
pub struct BillingServices {
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub seats: SeatService,
    pub webhooks: WebhookService,
    pub events: BillingEventLogger,
}

impl BillingServices {
    pub fn new(pool: PgPool, stripe_config: StripeConfig, license_key_prefix: &str) -> Self {
        let stripe = StripeClient::new(stripe_config.clone());
        Self {
            checkout: CheckoutService::new(stripe.clone(), pool.clone()),
            portal: PortalService::new(stripe.clone()),
            seats: SeatService::new(stripe, pool.clone()),
            webhooks: WebhookService::new(pool.clone(), stripe_config, license_key_prefix),
            events: BillingEventLogger::new(pool),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub jwt: JwtManager,
    pub billing: Option<Arc<BillingServices>>,
}

impl AppState {
    pub fn new(pool: PgPool, config: Config, billing: Option<BillingServices>) -> Self {
        let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
        Self {
            pool,
            config: Arc::new(config),
            jwt,
            billing: billing.map(Arc::new),
        }
    }

    /// Narrow state handed to the auth middleware
    pub fn auth_state(&self) -> crate::auth::AuthState {
        crate::auth::AuthState {
            jwt: self.jwt.clone(),
            pool: self.pool.clone(),
        }
    }
}

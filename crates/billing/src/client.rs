//! Stripe client configuration

use stripe::Client;

use crate::error::{BillingError, BillingResult};

/// Configuration for Stripe billing
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Stripe secret API key
    pub secret_key: String,
    /// Stripe webhook signing secret
    pub webhook_secret: String,
    /// Price IDs for each subscription tier
    pub price_ids: PriceIds,
    /// Base URL for success/cancel redirects
    pub app_base_url: String,
}

/// Stripe price IDs for the subscription tiers
/// Tier hierarchy: Free (no price) -> Starter -> Pro -> Accelerator
#[derive(Debug, Clone)]
pub struct PriceIds {
    pub starter: String,
    pub pro: String,
    pub accelerator: String,
    /// Metered seat add-on (stackable on limited tiers)
    pub extra_seats: Option<String>,
}

impl StripeConfig {
    /// Create config from environment variables
    pub fn from_env() -> BillingResult<Self> {
        Ok(Self {
            secret_key: std::env::var("STRIPE_SECRET_KEY")
                .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?,
            webhook_secret: std::env::var("STRIPE_WEBHOOK_SECRET")
                .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?,
            price_ids: PriceIds {
                starter: std::env::var("STRIPE_PRICE_STARTER")
                    .map_err(|_| BillingError::Config("STRIPE_PRICE_STARTER not set".to_string()))?,
                pro: std::env::var("STRIPE_PRICE_PRO")
                    .map_err(|_| BillingError::Config("STRIPE_PRICE_PRO not set".to_string()))?,
                accelerator: std::env::var("STRIPE_PRICE_ACCELERATOR").map_err(|_| {
                    BillingError::Config("STRIPE_PRICE_ACCELERATOR not set".to_string())
                })?,
                extra_seats: std::env::var("STRIPE_PRICE_EXTRA_SEATS").ok(),
            },
            app_base_url: std::env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
        })
    }

    /// Get price ID for a tier
    pub fn price_id_for_tier(&self, tier: &str) -> Option<&str> {
        match tier.to_lowercase().as_str() {
            "starter" => Some(&self.price_ids.starter),
            "pro" => Some(&self.price_ids.pro),
            "accelerator" => Some(&self.price_ids.accelerator),
            _ => None,
        }
    }

    /// Get tier from price ID
    pub fn tier_for_price_id(&self, price_id: &str) -> Option<&'static str> {
        if price_id == self.price_ids.starter {
            Some("starter")
        } else if price_id == self.price_ids.pro {
            Some("pro")
        } else if price_id == self.price_ids.accelerator {
            Some("accelerator")
        } else {
            None
        }
    }
}

/// Stripe billing client
#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    config: StripeConfig,
}

impl StripeClient {
    /// Create a new Stripe client from config
    pub fn new(config: StripeConfig) -> Self {
        let client = Client::new(&config.secret_key);
        Self { client, config }
    }

    /// Create a new Stripe client from environment variables
    pub fn from_env() -> BillingResult<Self> {
        let config = StripeConfig::from_env()?;
        Ok(Self::new(config))
    }

    /// Get the inner Stripe client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the config
    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

//! Stripe Checkout sessions

use sqlx::PgPool;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CreateCheckoutSessionLineItemsPriceData, CreateCheckoutSessionLineItemsPriceDataProductData,
    CustomerId,
};
use themeloft_shared::Theme;
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Checkout service for creating Stripe checkout sessions
pub struct CheckoutService {
    stripe: StripeClient,
    pool: PgPool,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient, pool: PgPool) -> Self {
        Self { stripe, pool }
    }

    /// Return the account's Stripe customer ID, creating the customer on
    /// first use and persisting the ID.
    pub async fn ensure_customer(
        &self,
        account_id: Uuid,
        email: &str,
        account_name: &str,
    ) -> BillingResult<String> {
        let existing: Option<(Option<String>,)> =
            sqlx::query_as("SELECT stripe_customer_id FROM accounts WHERE id = $1")
                .bind(account_id)
                .fetch_optional(&self.pool)
                .await?;

        match existing {
            None => Err(BillingError::NotFound(format!("Account {}", account_id))),
            Some((Some(customer_id),)) => Ok(customer_id),
            Some((None,)) => {
                let mut params = stripe::CreateCustomer::new();
                params.email = Some(email);
                params.name = Some(account_name);
                let mut metadata = std::collections::HashMap::new();
                metadata.insert("account_id".to_string(), account_id.to_string());
                params.metadata = Some(metadata);

                let customer = stripe::Customer::create(self.stripe.inner(), params).await?;

                sqlx::query(
                    "UPDATE accounts SET stripe_customer_id = $1, updated_at = NOW() WHERE id = $2",
                )
                .bind(customer.id.as_str())
                .bind(account_id)
                .execute(&self.pool)
                .await?;

                tracing::info!(
                    account_id = %account_id,
                    customer_id = %customer.id,
                    "Created Stripe customer"
                );
                Ok(customer.id.to_string())
            }
        }
    }

    /// Verify that a Stripe customer ID belongs to the given account
    /// (defense-in-depth against mismatched account/customer pairs)
    async fn verify_customer_ownership(
        &self,
        account_id: Uuid,
        customer_id: &str,
    ) -> BillingResult<()> {
        let verified: Option<(String,)> = sqlx::query_as(
            "SELECT stripe_customer_id FROM accounts WHERE id = $1 AND stripe_customer_id = $2",
        )
        .bind(account_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await?;

        if verified.is_none() {
            tracing::warn!(
                account_id = %account_id,
                customer_id = %customer_id,
                "Customer ID ownership verification failed"
            );
            return Err(BillingError::CustomerNotFound(
                "Customer ID does not belong to this account".to_string(),
            ));
        }
        Ok(())
    }

    /// Create a checkout session for a plan subscription
    pub async fn create_subscription_checkout(
        &self,
        account_id: Uuid,
        customer_id: &str,
        tier: &str,
    ) -> BillingResult<CheckoutSession> {
        self.verify_customer_ownership(account_id, customer_id).await?;

        let price_id = self
            .stripe
            .config()
            .price_id_for_tier(tier)
            .ok_or_else(|| BillingError::InvalidTier(tier.to_string()))?
            .to_string();

        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!(
            "{}/billing/success?session_id={{CHECKOUT_SESSION_ID}}",
            base_url
        );
        let cancel_url = format!("{}/billing/cancel", base_url);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("account_id".to_string(), account_id.to_string());
        metadata.insert("tier".to_string(), tier.to_string());
        metadata.insert("checkout_type".to_string(), "subscription".to_string());

        let line_items = vec![CreateCheckoutSessionLineItems {
            price: Some(price_id),
            quantity: Some(1),
            ..Default::default()
        }];

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Subscription),
            line_items: Some(line_items),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            allow_promotion_codes: Some(true),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            account_id = %account_id,
            session_id = %session.id,
            tier = %tier,
            "Created subscription checkout session"
        );

        Ok(session)
    }

    /// Create a one-time payment checkout for a theme purchase.
    /// The webhook issues the license once the session completes.
    pub async fn create_theme_checkout(
        &self,
        account_id: Uuid,
        customer_id: &str,
        theme: &Theme,
    ) -> BillingResult<CheckoutSession> {
        self.verify_customer_ownership(account_id, customer_id).await?;

        if theme.price_cents <= 0 {
            return Err(BillingError::InvalidInput(format!(
                "Theme {} is not purchasable",
                theme.slug
            )));
        }

        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let base_url = &self.stripe.config().app_base_url;
        let success_url = format!(
            "{}/themes/{}/success?session_id={{CHECKOUT_SESSION_ID}}",
            base_url, theme.slug
        );
        let cancel_url = format!("{}/themes/{}", base_url, theme.slug);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("account_id".to_string(), account_id.to_string());
        metadata.insert("theme_id".to_string(), theme.id.to_string());
        metadata.insert("checkout_type".to_string(), "theme_purchase".to_string());

        let line_item = CreateCheckoutSessionLineItems {
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: stripe::Currency::USD,
                unit_amount: Some(theme.price_cents as i64),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: theme.name.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            quantity: Some(1),
            ..Default::default()
        };

        let params = CreateCheckoutSession {
            customer: Some(customer_id),
            mode: Some(CheckoutSessionMode::Payment),
            line_items: Some(vec![line_item]),
            success_url: Some(&success_url),
            cancel_url: Some(&cancel_url),
            metadata: Some(metadata),
            ..Default::default()
        };

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            account_id = %account_id,
            session_id = %session.id,
            theme = %theme.slug,
            "Created theme purchase checkout session"
        );

        Ok(session)
    }
}

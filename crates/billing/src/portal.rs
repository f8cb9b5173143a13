//! Stripe billing portal sessions

use stripe::{BillingPortalSession, CreateBillingPortalSession, CustomerId};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Hands an account off to Stripe's hosted billing portal, where payment
/// methods and plan changes are managed without touching this service.
pub struct PortalService {
    stripe: StripeClient,
}

impl PortalService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Open a portal session for the account's customer and return the
    /// hosted URL. The portal sends the user back to the billing page.
    pub async fn portal_url(&self, account_id: Uuid, customer_id: &str) -> BillingResult<String> {
        let customer = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let return_url = format!("{}/billing", self.stripe.config().app_base_url);
        let mut params = CreateBillingPortalSession::new(customer);
        params.return_url = Some(&return_url);

        let session = BillingPortalSession::create(self.stripe.inner(), params).await?;

        tracing::info!(
            account_id = %account_id,
            customer_id = %session.customer,
            "Opened billing portal session"
        );

        Ok(session.url)
    }
}

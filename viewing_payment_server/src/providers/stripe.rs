use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
};
use serde::Deserialize;
use viewing_payment_engine::db_types::{PaymentProvider, Reservation, Transaction};

use super::{CheckoutProvider, ProviderError};
use crate::{config::StripeConfig, data_objects::CheckoutSession};

/// Creates hosted [Checkout Sessions](https://docs.stripe.com/api/checkout/sessions) via the
/// Stripe REST API. Stripe takes form-encoded bodies and returns JSON.
#[derive(Clone)]
pub struct StripeProvider {
    config: StripeConfig,
    client: Arc<Client>,
}

#[derive(Debug, Deserialize)]
struct StripeSessionResponse {
    id: String,
    url: String,
}

impl StripeProvider {
    pub fn new(config: StripeConfig) -> Result<Self, ProviderError> {
        let mut headers = HeaderMap::with_capacity(1);
        let bearer = format!("Bearer {}", config.secret_key.reveal());
        let mut val = HeaderValue::from_str(&bearer).map_err(|e| ProviderError::Initialization(e.to_string()))?;
        val.set_sensitive(true);
        headers.insert("Authorization", val);
        let client =
            Client::builder().default_headers(headers).build().map_err(|e| ProviderError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }
}

#[async_trait]
impl CheckoutProvider for StripeProvider {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    async fn create_checkout_session(
        &self,
        transaction: &Transaction,
        reservation: &Reservation,
    ) -> Result<CheckoutSession, ProviderError> {
        let url = format!("{}/v1/checkout/sessions", self.config.api_base);
        let amount = transaction.amount.value().to_string();
        let currency = transaction.currency.to_lowercase();
        let product_name = format!("Apartment viewing reservation #{}", reservation.id);
        let quantity = "1";
        let form = [
            ("mode", "payment"),
            ("client_reference_id", transaction.reference.as_str()),
            ("success_url", self.config.success_url.as_str()),
            ("cancel_url", self.config.cancel_url.as_str()),
            ("line_items[0][quantity]", quantity),
            ("line_items[0][price_data][currency]", currency.as_str()),
            ("line_items[0][price_data][unit_amount]", amount.as_str()),
            ("line_items[0][price_data][product_data][name]", product_name.as_str()),
        ];
        trace!("💳️ Creating Stripe checkout session for transaction {}", transaction.id);
        let response =
            self.client.post(url).form(&form).send().await.map_err(|e| ProviderError::Upstream(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("Stripe returned {status}: {message}")));
        }
        let session =
            response.json::<StripeSessionResponse>().await.map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        debug!("💳️ Stripe checkout session {} created for transaction {}", session.id, transaction.id);
        Ok(CheckoutSession { provider_transaction_id: session.id, redirect_url: session.url })
    }
}

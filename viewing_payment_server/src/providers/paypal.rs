use std::sync::Arc;

use async_trait::async_trait;
use log::*;
use reqwest::Client;
use serde::Deserialize;
use viewing_payment_engine::db_types::{PaymentProvider, Reservation, Transaction};

use super::{CheckoutProvider, ProviderError};
use crate::{config::PayPalConfig, data_objects::CheckoutSession};

/// Creates [Orders](https://developer.paypal.com/docs/api/orders/v2/) via the PayPal REST API.
///
/// Every call fetches a fresh OAuth access token with the client-credentials grant. PayPal tokens
/// live for hours, but caching one here buys little for a low-volume checkout endpoint and would
/// drag in expiry bookkeeping.
#[derive(Clone)]
pub struct PayPalProvider {
    config: PayPalConfig,
    client: Arc<Client>,
}

#[derive(Debug, Deserialize)]
struct PayPalTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct PayPalOrderResponse {
    id: String,
    #[serde(default)]
    links: Vec<PayPalLink>,
}

#[derive(Debug, Deserialize)]
struct PayPalLink {
    rel: String,
    href: String,
}

impl PayPalProvider {
    pub fn new(config: PayPalConfig) -> Result<Self, ProviderError> {
        let client = Client::builder().build().map_err(|e| ProviderError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    async fn access_token(&self) -> Result<String, ProviderError> {
        let url = format!("{}/v1/oauth2/token", self.config.api_base);
        let response = self
            .client
            .post(url)
            .basic_auth(&self.config.client_id, Some(self.config.secret.reveal()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ProviderError::Upstream(format!("PayPal token endpoint returned {status}")));
        }
        let token =
            response.json::<PayPalTokenResponse>().await.map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl CheckoutProvider for PayPalProvider {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::PayPal
    }

    async fn create_checkout_session(
        &self,
        transaction: &Transaction,
        reservation: &Reservation,
    ) -> Result<CheckoutSession, ProviderError> {
        let token = self.access_token().await?;
        let url = format!("{}/v2/checkout/orders", self.config.api_base);
        let body = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": transaction.reference,
                "description": format!("Apartment viewing reservation #{}", reservation.id),
                "amount": {
                    "currency_code": transaction.currency,
                    "value": transaction.amount.to_decimal_string(),
                },
            }],
            "application_context": {
                "return_url": self.config.return_url,
                "cancel_url": self.config.cancel_url,
            },
        });
        trace!("💳️ Creating PayPal order for transaction {}", transaction.id);
        let response = self
            .client
            .post(url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("PayPal returned {status}: {message}")));
        }
        let order =
            response.json::<PayPalOrderResponse>().await.map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;
        let approve = order
            .links
            .iter()
            .find(|l| l.rel == "approve" || l.rel == "payer-action")
            .map(|l| l.href.clone())
            .ok_or_else(|| ProviderError::MalformedResponse("No approval link in PayPal order response".to_string()))?;
        debug!("💳️ PayPal order {} created for transaction {}", order.id, transaction.id);
        Ok(CheckoutSession { provider_transaction_id: order.id, redirect_url: approve })
    }
}

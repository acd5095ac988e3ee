use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// The acknowledgement body returned to webhook deliveries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    pub received: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookAck {
    pub fn received() -> Self {
        Self { received: true, error: None }
    }

    pub fn failure<S: Display>(error: S) -> Self {
        Self { received: false, error: Some(error.to_string()) }
    }
}

/// A checkout session created at an upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// The provider's identifier for the session (`cs_...` for Stripe, an order id for PayPal).
    pub provider_transaction_id: String,
    /// Where to send the viewer to complete payment.
    pub redirect_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub provider: String,
    pub reservation_id: i64,
    /// Amount payable, in minor units of `currency`.
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub transaction_id: i64,
    pub provider_transaction_id: String,
    pub redirect_url: String,
}

/// The envelope shared by Stripe webhook deliveries.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeEventData {
    #[serde(default)]
    pub object: serde_json::Value,
}

impl StripeEvent {
    /// The id of the object the event is about, which is the provider transaction id we settle by.
    pub fn resource_id(&self) -> Option<&str> {
        self.data.object.get("id").and_then(|v| v.as_str())
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.data.object.get("last_payment_error").and_then(|e| e.get("message")).and_then(|v| v.as_str())
    }
}

/// The envelope shared by PayPal webhook deliveries.
#[derive(Debug, Clone, Deserialize)]
pub struct PayPalEvent {
    pub event_type: String,
    #[serde(default)]
    pub resource: serde_json::Value,
}

impl PayPalEvent {
    /// The order id the event settles. Capture events carry the order id under
    /// `supplementary_data.related_ids.order_id`; approval events carry it as the resource id.
    pub fn resource_id(&self) -> Option<&str> {
        self.resource
            .get("supplementary_data")
            .and_then(|s| s.get("related_ids"))
            .and_then(|r| r.get("order_id"))
            .and_then(|v| v.as_str())
            .or_else(|| self.resource.get("id").and_then(|v| v.as_str()))
    }
}

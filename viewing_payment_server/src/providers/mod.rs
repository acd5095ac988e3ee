//! Upstream checkout providers.
//!
//! Each provider knows how to turn a ledger transaction into a hosted checkout session at its
//! payment processor. The router owns one adapter per configured provider and resolves them by
//! name, case-insensitively, so a request for `"Stripe"` or `"STRIPE"` lands on the same adapter.

mod paypal;
mod stripe;

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use thiserror::Error;
use viewing_payment_engine::db_types::{PaymentProvider, Reservation, Transaction};

pub use self::{paypal::PayPalProvider, stripe::StripeProvider};
use crate::{data_objects::CheckoutSession, errors::ServerError};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Could not build the provider client. {0}")]
    Initialization(String),
    #[error("The provider rejected the request. {0}")]
    Upstream(String),
    #[error("The provider sent a response we could not interpret. {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait CheckoutProvider: Send + Sync {
    /// The name of the provider, as stored on transactions.
    fn provider(&self) -> PaymentProvider;

    /// Creates a hosted checkout session for the given transaction and the reservation it pays
    /// for. The returned session id becomes the transaction's provider transaction id.
    async fn create_checkout_session(
        &self,
        transaction: &Transaction,
        reservation: &Reservation,
    ) -> Result<CheckoutSession, ProviderError>;
}

/// Resolves checkout providers by name.
#[derive(Clone, Default)]
pub struct ProviderRouter {
    providers: HashMap<PaymentProvider, Arc<dyn CheckoutProvider>>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn CheckoutProvider>) {
        self.providers.insert(provider.provider(), provider);
    }

    pub fn resolve(&self, name: &str) -> Result<(PaymentProvider, Arc<dyn CheckoutProvider>), ServerError> {
        let provider =
            name.parse::<PaymentProvider>().map_err(|_| ServerError::UnsupportedProvider(name.to_string()))?;
        let adapter =
            self.providers.get(&provider).cloned().ok_or_else(|| ServerError::UnsupportedProvider(name.to_string()))?;
        Ok((provider, adapter))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    struct DummyProvider(PaymentProvider);

    #[async_trait]
    impl CheckoutProvider for DummyProvider {
        fn provider(&self) -> PaymentProvider {
            self.0
        }

        async fn create_checkout_session(
            &self,
            _transaction: &Transaction,
            _reservation: &Reservation,
        ) -> Result<CheckoutSession, ProviderError> {
            Ok(CheckoutSession { provider_transaction_id: "dummy".into(), redirect_url: "http://dummy".into() })
        }
    }

    #[test]
    fn resolution_is_case_insensitive() {
        let mut router = ProviderRouter::new();
        router.register(Arc::new(DummyProvider(PaymentProvider::Stripe)));
        assert!(router.resolve("stripe").is_ok());
        assert!(router.resolve("Stripe").is_ok());
        assert!(router.resolve("STRIPE").is_ok());
    }

    #[test]
    fn unknown_and_unregistered_providers_are_rejected() {
        let mut router = ProviderRouter::new();
        router.register(Arc::new(DummyProvider(PaymentProvider::Stripe)));
        assert!(matches!(router.resolve("adyen"), Err(ServerError::UnsupportedProvider(_))));
        // paypal is a known provider, but nothing is registered for it here
        assert!(matches!(router.resolve("paypal"), Err(ServerError::UnsupportedProvider(_))));
    }
}

use std::env;

use log::*;
use vpg_common::{parse_boolean_flag, Secret};

use crate::errors::ServerError;

const DEFAULT_VPG_HOST: &str = "127.0.0.1";
const DEFAULT_VPG_PORT: u16 = 8480;
const DEFAULT_DEDUP_CACHE_SIZE: usize = 10_000;
const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_PAYPAL_API_BASE: &str = "https://api-m.paypal.com";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Capacity of the in-memory webhook event dedup cache. Oldest entries are evicted first.
    pub dedup_cache_size: usize,
    pub stripe: StripeConfig,
    pub paypal: PayPalConfig,
}

#[derive(Clone, Debug, Default)]
pub struct StripeConfig {
    pub secret_key: Secret<String>,
    /// The signing secret for the webhook endpoint (`whsec_...`).
    pub webhook_secret: Secret<String>,
    /// If false, webhook signatures are not verified. Only ever disable this in test environments.
    pub signature_checks: bool,
    pub api_base: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Clone, Debug, Default)]
pub struct PayPalConfig {
    pub client_id: String,
    pub secret: Secret<String>,
    pub api_base: String,
    pub return_url: String,
    pub cancel_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_VPG_HOST.to_string(),
            port: DEFAULT_VPG_PORT,
            database_url: String::default(),
            dedup_cache_size: DEFAULT_DEDUP_CACHE_SIZE,
            stripe: StripeConfig::default(),
            paypal: PayPalConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("VPG_HOST").ok().unwrap_or_else(|| DEFAULT_VPG_HOST.into());
        let port = env::var("VPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for VPG_PORT. {e} Using the default, {DEFAULT_VPG_PORT}, instead."
                    );
                    DEFAULT_VPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_VPG_PORT);
        let database_url = env::var("VPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ VPG_DATABASE_URL is not set. Please set it to the URL for the payment gateway database.");
            String::default()
        });
        let dedup_cache_size = env::var("VPG_DEDUP_CACHE_SIZE")
            .map_err(|_| {
                info!("🪛️ VPG_DEDUP_CACHE_SIZE is not set. Using the default of {DEFAULT_DEDUP_CACHE_SIZE} entries.")
            })
            .and_then(|s| {
                s.parse::<usize>().map_err(|e| warn!("🪛️ Invalid configuration value for VPG_DEDUP_CACHE_SIZE. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_DEDUP_CACHE_SIZE);
        let stripe = StripeConfig::from_env_or_default();
        let paypal = PayPalConfig::from_env_or_default();
        Self { host, port, database_url, dedup_cache_size, stripe, paypal }
    }
}

impl StripeConfig {
    pub fn from_env_or_default() -> Self {
        let secret_key = env::var("VPG_STRIPE_SECRET_KEY").ok().unwrap_or_else(|| {
            error!("🪛️ VPG_STRIPE_SECRET_KEY is not set. Checkout session creation against Stripe will fail.");
            String::default()
        });
        let webhook_secret = env::var("VPG_STRIPE_WEBHOOK_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ VPG_STRIPE_WEBHOOK_SECRET is not set. Please set it to the webhook signing secret.");
            String::default()
        });
        let signature_checks = parse_boolean_flag(env::var("VPG_STRIPE_SIGNATURE_CHECKS").ok(), true);
        if !signature_checks {
            warn!(
                "🚨️🚨️🚨️ Stripe webhook signature checks are DISABLED. Anyone can settle transactions on this \
                 server. Do not run production like this. 🚨️🚨️🚨️"
            );
        }
        let api_base = env::var("VPG_STRIPE_API_BASE").ok().unwrap_or_else(|| DEFAULT_STRIPE_API_BASE.into());
        let (success_url, cancel_url) = checkout_redirect_urls();
        Self {
            secret_key: Secret::new(secret_key),
            webhook_secret: Secret::new(webhook_secret),
            signature_checks,
            api_base,
            success_url,
            cancel_url,
        }
    }
}

impl PayPalConfig {
    pub fn from_env_or_default() -> Self {
        let client_id = env::var("VPG_PAYPAL_CLIENT_ID").ok().unwrap_or_else(|| {
            error!("🪛️ VPG_PAYPAL_CLIENT_ID is not set. Checkout order creation against PayPal will fail.");
            String::default()
        });
        let secret = env::var("VPG_PAYPAL_SECRET").ok().unwrap_or_else(|| {
            error!("🪛️ VPG_PAYPAL_SECRET is not set. Checkout order creation against PayPal will fail.");
            String::default()
        });
        let api_base = env::var("VPG_PAYPAL_API_BASE").ok().unwrap_or_else(|| {
            info!("🪛️ VPG_PAYPAL_API_BASE is not set. Using the live API at {DEFAULT_PAYPAL_API_BASE}.");
            DEFAULT_PAYPAL_API_BASE.into()
        });
        let (return_url, cancel_url) = checkout_redirect_urls();
        Self { client_id, secret: Secret::new(secret), api_base, return_url, cancel_url }
    }
}

fn checkout_redirect_urls() -> (String, String) {
    let success_url = env::var("VPG_CHECKOUT_SUCCESS_URL").ok().unwrap_or_else(|| {
        warn!("🪛️ VPG_CHECKOUT_SUCCESS_URL is not set. Using a localhost placeholder.");
        "http://localhost/checkout/success".into()
    });
    let cancel_url = env::var("VPG_CHECKOUT_CANCEL_URL").ok().unwrap_or_else(|| {
        warn!("🪛️ VPG_CHECKOUT_CANCEL_URL is not set. Using a localhost placeholder.");
        "http://localhost/checkout/cancelled".into()
    });
    (success_url, cancel_url)
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.database_url.is_empty() {
            return Err(ServerError::InitializeError(
                "No database URL is configured. Set VPG_DATABASE_URL and restart.".to_string(),
            ));
        }
        Ok(())
    }
}

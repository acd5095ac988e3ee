//! # Viewing payment gateway server
//!
//! This crate hosts the HTTP surface of the viewing payment gateway. It is responsible for:
//! * Listening for incoming webhook deliveries from Stripe and PayPal.
//! * Normalising provider events into payment outcomes and settling them against the ledger.
//! * Creating hosted checkout sessions at the providers on behalf of viewers.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more
//! information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/checkout`: Creates a transaction and a provider checkout session for a reservation.
//! * `/payments/stripe/webhook`: Signed Stripe webhook deliveries.
//! * `/payments/paypal/webhook`: PayPal webhook deliveries.

pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod providers;
pub mod routes;
pub mod server;
pub mod webhook_routes;

#[cfg(test)]
mod endpoint_tests;

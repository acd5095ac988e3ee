//! The trait seams of the engine.
//!
//! Backends (currently SQLite only) implement [`PaymentGatewayDatabase`]; webhook ingestors are
//! handed an [`EventDedupStore`]. Everything above these traits is backend-agnostic.
mod dedup;
mod payment_gateway_database;

pub use dedup::{EventDedupStore, InMemoryDedupCache, DEFAULT_DEDUP_CAPACITY};
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};

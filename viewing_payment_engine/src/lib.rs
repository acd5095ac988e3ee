//! Viewing Payment Engine
//!
//! Core library of the viewing payment gateway: it tracks the lifecycle of a payment attempt tied
//! to an apartment-viewing reservation, applies provider webhook outcomes idempotently to the
//! transaction state machine, and propagates the result to the linked reservation and the
//! promotional credit ledger.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You
//!    should never need to access the database directly; use the public API instead. The
//!    exception is the data types, which are defined in [`mod@db_types`] and are public.
//! 2. The trait seams ([`mod@traits`]): the [`PaymentGatewayDatabase`] backend contract and the
//!    [`EventDedupStore`] used by webhook ingestors to drop redelivered events.
//! 3. The public API ([`mod@api`]): [`PaymentFlowApi`] (the transaction ledger),
//!    [`ReconcilerApi`] (reservation consistency) and [`CreditApi`] (entitlements).
pub mod api;
pub mod db_types;
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{CreditApi, PaymentFlowApi, ReconcileOutcome, ReconcilerApi, SettlementResult};
pub use sqlite::SqliteDatabase;
pub use traits::{EventDedupStore, InMemoryDedupCache, PaymentGatewayDatabase, PaymentGatewayError};

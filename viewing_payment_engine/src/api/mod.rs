//! The public, backend-agnostic API of the payment engine.
pub mod credit_api;
pub mod payment_flow_api;
pub mod reconciler_api;

pub use credit_api::CreditApi;
pub use payment_flow_api::{PaymentFlowApi, SettlementResult};
pub use reconciler_api::{ReconcileOutcome, ReconcilerApi};

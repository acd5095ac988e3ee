use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::db_types::{
    CreditPack,
    NewReservation,
    NewTransaction,
    Reservation,
    ReservationStatus,
    Transaction,
    TransactionStatus,
    TransitionRecord,
};

/// The backend contract for the viewing payment gateway.
///
/// The flow-level operations (`guarded_status_update`, `apply_reservation_transition`,
/// `process_payment_credit`) each execute as a single atomic unit against their aggregate, so two
/// concurrent webhook deliveries can never both observe the same pre-state and both apply a
/// transition. The allowed-transition tables combined with atomic persistence are the correctness
/// mechanism; the second writer is simply rejected (or skipped).
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone {
    /// The URL of the database
    fn url(&self) -> &str;

    //----------------------------------- Transaction ledger  --------------------------------------

    /// Persists a new transaction in `Created` status. No other side effects.
    async fn insert_transaction(&self, tx: NewTransaction) -> Result<Transaction, PaymentGatewayError>;

    async fn fetch_transaction(&self, id: i64) -> Result<Option<Transaction>, PaymentGatewayError>;

    async fn fetch_transaction_by_provider_id(
        &self,
        provider_tx_id: &str,
    ) -> Result<Option<Transaction>, PaymentGatewayError>;

    /// Records the provider-side transaction id and forces the status to `Pending`, in one atomic
    /// write. Only legal from `Created`; anything else is an [`InvalidStateTransition`].
    ///
    /// [`InvalidStateTransition`]: PaymentGatewayError::InvalidStateTransition
    async fn set_provider_details(&self, id: i64, provider_tx_id: &str) -> Result<Transaction, PaymentGatewayError>;

    /// Atomically moves the transaction to `new_status`, guarded by the allowed-transition table
    /// (`UPDATE … WHERE status IN (allowed sources) RETURNING *`).
    ///
    /// Returns `Ok(None)` when the guard did not match (the caller decides whether that is a
    /// harmless replay or an invalid transition), `TransactionNotFound` when the row does not
    /// exist at all. Sets `completed_at` when the target is `Completed` and `failure_reason` when
    /// the target is `Failed`.
    async fn guarded_status_update(
        &self,
        id: i64,
        new_status: TransactionStatus,
        failure_reason: Option<&str>,
    ) -> Result<Option<Transaction>, PaymentGatewayError>;

    //----------------------------------- Reservations  --------------------------------------------

    /// Narrow collaborator interface: the reservation-request workflow lives outside this crate,
    /// but the engine (and its tests) need to create and link reservations.
    async fn insert_reservation(&self, reservation: NewReservation) -> Result<Reservation, PaymentGatewayError>;

    /// Links the transaction to the reservation. At most one transaction per reservation.
    async fn link_transaction(&self, reservation_id: i64, transaction_id: i64)
        -> Result<Reservation, PaymentGatewayError>;

    async fn fetch_reservation(&self, id: i64) -> Result<Option<Reservation>, PaymentGatewayError>;

    /// Loads the reservation linked to the given transaction, if any. Not every transaction gates
    /// a reservation.
    async fn fetch_reservation_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Option<Reservation>, PaymentGatewayError>;

    /// In a single atomic transaction: moves the reservation from `expected` to `new_status`
    /// (guarded — returns `Ok(None)` if the reservation is not in `expected`), optionally sets
    /// `confirmed_at`, and appends the immutable transition record.
    async fn apply_reservation_transition(
        &self,
        reservation_id: i64,
        expected: ReservationStatus,
        new_status: ReservationStatus,
        confirmed_at: Option<DateTime<Utc>>,
        actor: &str,
        reason: &str,
    ) -> Result<Option<Reservation>, PaymentGatewayError>;

    /// Full audit trail for a reservation, oldest first.
    async fn fetch_transition_records(&self, reservation_id: i64)
        -> Result<Vec<TransitionRecord>, PaymentGatewayError>;

    //----------------------------------- Credit ledger  -------------------------------------------

    /// The idempotent credit allocation rule, in a single atomic transaction:
    /// 1. A pack already keyed by `reservation_id` is returned unchanged.
    /// 2. Else, a usable pack for the user has one credit consumed.
    /// 3. Else, a new pack of `pack_size` credits is created with one credit already used.
    async fn process_payment_credit(
        &self,
        user_id: i64,
        reservation_id: i64,
        pack_size: i64,
    ) -> Result<CreditPack, PaymentGatewayError>;

    async fn fetch_credit_pack_for_reservation(
        &self,
        reservation_id: i64,
    ) -> Result<Option<CreditPack>, PaymentGatewayError>;

    async fn fetch_credit_packs_for_user(&self, user_id: i64) -> Result<Vec<CreditPack>, PaymentGatewayError>;

    /// Closes the database connection.
    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine problem (configuration/uptime etc.): {0}")]
    DatabaseError(String),
    #[error("The requested transaction (id {0}) does not exist")]
    TransactionNotFound(i64),
    #[error("No transaction carries the provider transaction id {0}")]
    ProviderTxIdNotFound(String),
    #[error("Illegal transaction status change: {from} -> {to}")]
    InvalidStateTransition { from: TransactionStatus, to: TransactionStatus },
    #[error("The requested reservation (id {0}) does not exist")]
    ReservationNotFound(i64),
    #[error("Credit pack invariant violated: {0}")]
    CreditInvariantViolation(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}

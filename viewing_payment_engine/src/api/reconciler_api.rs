use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Reservation, ReservationStatus, Transaction, SYSTEM_ACTOR},
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

pub const REASON_AUTO_CONFIRMED: &str = "auto-confirmed: payment completed";
pub const REASON_AUTO_CANCELLED: &str = "auto-cancelled: payment refunded";

/// What the reconciler did in response to a payment outcome.
///
/// The reactions only act from the expected pre-state and silently skip otherwise, which makes
/// them commutative with concurrent human actions on the reservation and safe to re-invoke. A
/// skip is an expected race, never an error.
#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// The reservation transitioned and an audit record was appended.
    Applied(Reservation),
    /// A reservation is linked, but it was not in the expected pre-state. The earlier (human)
    /// action wins.
    Ignored(Reservation),
    /// No reservation is linked to this transaction. Not every payment gates a viewing.
    NotLinked,
}

impl ReconcileOutcome {
    /// The reservation this payment gates, whether or not the reaction applied.
    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            ReconcileOutcome::Applied(r) | ReconcileOutcome::Ignored(r) => Some(r),
            ReconcileOutcome::NotLinked => None,
        }
    }
}

/// `ReconcilerApi` keeps the reservation aggregate consistent with outcomes reported by the
/// transaction ledger. The two aggregates are persisted separately — there is deliberately no
/// distributed transaction here; each reaction is individually atomic and re-runnable.
pub struct ReconcilerApi<B> {
    db: B,
}

impl<B> Debug for ReconcilerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcilerApi")
    }
}

impl<B> ReconcilerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> ReconcilerApi<B>
where B: PaymentGatewayDatabase
{
    /// Reaction to a completed payment: `Pending -> Confirmed`, with the confirmed datetime
    /// taken from the proposed datetime.
    pub async fn on_payment_completed(&self, tx: &Transaction) -> Result<ReconcileOutcome, PaymentGatewayError> {
        let reservation = match self.db.fetch_reservation_for_transaction(tx.id).await? {
            Some(r) => r,
            None => {
                trace!("🔄️🏠️ Transaction #{} gates no reservation. Nothing to reconcile.", tx.id);
                return Ok(ReconcileOutcome::NotLinked);
            },
        };
        let confirmed_at = Some(reservation.proposed_at);
        match self
            .db
            .apply_reservation_transition(
                reservation.id,
                ReservationStatus::Pending,
                ReservationStatus::Confirmed,
                confirmed_at,
                SYSTEM_ACTOR,
                REASON_AUTO_CONFIRMED,
            )
            .await?
        {
            Some(updated) => {
                info!("🔄️🏠️ Reservation #{} auto-confirmed by payment [{:?}]", updated.id, tx.provider_tx_id);
                Ok(ReconcileOutcome::Applied(updated))
            },
            None => {
                info!(
                    "🔄️🏠️ Reservation #{} is {} rather than Pending. A human got there first; leaving it alone.",
                    reservation.id, reservation.status
                );
                Ok(ReconcileOutcome::Ignored(reservation))
            },
        }
    }

    /// Reaction to a refunded payment: `Confirmed -> Cancelled`. Any other current status is a
    /// no-op.
    pub async fn on_payment_refunded(&self, tx: &Transaction) -> Result<ReconcileOutcome, PaymentGatewayError> {
        let reservation = match self.db.fetch_reservation_for_transaction(tx.id).await? {
            Some(r) => r,
            None => {
                trace!("🔄️🏠️ Transaction #{} gates no reservation. Nothing to reconcile.", tx.id);
                return Ok(ReconcileOutcome::NotLinked);
            },
        };
        match self
            .db
            .apply_reservation_transition(
                reservation.id,
                ReservationStatus::Confirmed,
                ReservationStatus::Cancelled,
                None,
                SYSTEM_ACTOR,
                REASON_AUTO_CANCELLED,
            )
            .await?
        {
            Some(updated) => {
                info!("🔄️🏠️ Reservation #{} auto-cancelled after refund", updated.id);
                Ok(ReconcileOutcome::Applied(updated))
            },
            None => {
                info!(
                    "🔄️🏠️ Refund for reservation #{} arrived while it is {}. Leaving it alone.",
                    reservation.id, reservation.status
                );
                Ok(ReconcileOutcome::Ignored(reservation))
            },
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

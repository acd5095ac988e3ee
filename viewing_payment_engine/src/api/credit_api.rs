use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{CreditPack, Reservation, CREDIT_PACK_SIZE},
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// `CreditApi` owns the promotional "free viewing" entitlement ledger.
pub struct CreditApi<B> {
    db: B,
}

impl<B> Debug for CreditApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CreditApi")
    }
}

impl<B> CreditApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> CreditApi<B>
where B: PaymentGatewayDatabase
{
    /// Allocation rule for a successful payment, idempotent per triggering reservation:
    /// an existing pack keyed by this reservation is returned unchanged; else a usable pack has
    /// one credit consumed; else a fresh pack of [`CREDIT_PACK_SIZE`] is created with the first
    /// credit already used by this payment.
    pub async fn on_payment_succeeded(
        &self,
        user_id: i64,
        reservation: &Reservation,
    ) -> Result<CreditPack, PaymentGatewayError> {
        let pack = self.db.process_payment_credit(user_id, reservation.id, CREDIT_PACK_SIZE).await?;
        info!(
            "🎟️ Payment for reservation #{} leaves user {user_id} with {}/{} credits in pack {}",
            reservation.id,
            pack.remaining(),
            pack.total_credits,
            pack.id
        );
        Ok(pack)
    }

    pub async fn packs_for_user(&self, user_id: i64) -> Result<Vec<CreditPack>, PaymentGatewayError> {
        self.db.fetch_credit_packs_for_user(user_id).await
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

//! `SqliteDatabase` is the concrete SQLite implementation of the payment gateway backend.
//!
//! The flow-level operations here compose the low-level functions from [`super::db`] under a
//! single pool transaction wherever the contract requires atomicity.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{credits, new_pool, reservations, transactions};
use crate::{
    db_types::{
        CreditPack,
        NewReservation,
        NewTransaction,
        Reservation,
        ReservationStatus,
        Transaction,
        TransactionStatus,
        TransitionRecord,
    },
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_transaction(&self, tx: NewTransaction) -> Result<Transaction, PaymentGatewayError> {
        // Mutations run under an explicit transaction. `INSERT/UPDATE … RETURNING` is a row
        // stream; on a bare pooled connection a dropped stream leaves SQLite's implicit
        // transaction open, making the write invisible to other connections and blocking later
        // writers.
        let mut db_tx = self.pool.begin().await?;
        let result = transactions::insert_transaction(tx, &mut db_tx).await?;
        db_tx.commit().await?;
        Ok(result)
    }

    async fn fetch_transaction(&self, id: i64) -> Result<Option<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction(id, &mut conn).await?)
    }

    async fn fetch_transaction_by_provider_id(
        &self,
        provider_tx_id: &str,
    ) -> Result<Option<Transaction>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(transactions::fetch_transaction_by_provider_id(provider_tx_id, &mut conn).await?)
    }

    async fn set_provider_details(&self, id: i64, provider_tx_id: &str) -> Result<Transaction, PaymentGatewayError> {
        let mut db_tx = self.pool.begin().await?;
        let updated = transactions::set_provider_details(id, provider_tx_id, &mut db_tx).await?;
        match updated {
            Some(tx) => {
                db_tx.commit().await?;
                debug!("🗃️💳️ Transaction #{id} now carries provider id [{provider_tx_id}] and is Pending");
                Ok(tx)
            },
            None => {
                // Guard miss: distinguish a missing row from an illegal starting state
                let current = transactions::fetch_transaction(id, &mut db_tx)
                    .await?
                    .ok_or(PaymentGatewayError::TransactionNotFound(id))?;
                db_tx.commit().await?;
                Err(PaymentGatewayError::InvalidStateTransition {
                    from: current.status,
                    to: TransactionStatus::Pending,
                })
            },
        }
    }

    async fn guarded_status_update(
        &self,
        id: i64,
        new_status: TransactionStatus,
        failure_reason: Option<&str>,
    ) -> Result<Option<Transaction>, PaymentGatewayError> {
        let mut db_tx = self.pool.begin().await?;
        let updated = transactions::guarded_status_update(id, new_status, failure_reason, &mut db_tx).await?;
        if updated.is_none() && transactions::fetch_transaction(id, &mut db_tx).await?.is_none() {
            return Err(PaymentGatewayError::TransactionNotFound(id));
        }
        db_tx.commit().await?;
        Ok(updated)
    }

    async fn insert_reservation(&self, reservation: NewReservation) -> Result<Reservation, PaymentGatewayError> {
        let mut db_tx = self.pool.begin().await?;
        let result = reservations::insert_reservation(reservation, &mut db_tx).await?;
        db_tx.commit().await?;
        Ok(result)
    }

    async fn link_transaction(
        &self,
        reservation_id: i64,
        transaction_id: i64,
    ) -> Result<Reservation, PaymentGatewayError> {
        let mut db_tx = self.pool.begin().await?;
        let linked = reservations::link_transaction(reservation_id, transaction_id, &mut db_tx)
            .await?
            .ok_or(PaymentGatewayError::ReservationNotFound(reservation_id))?;
        db_tx.commit().await?;
        Ok(linked)
    }

    async fn fetch_reservation(&self, id: i64) -> Result<Option<Reservation>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reservations::fetch_reservation(id, &mut conn).await?)
    }

    async fn fetch_reservation_for_transaction(
        &self,
        transaction_id: i64,
    ) -> Result<Option<Reservation>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reservations::fetch_reservation_for_transaction(transaction_id, &mut conn).await?)
    }

    /// The guarded update and its audit record commit or roll back together.
    async fn apply_reservation_transition(
        &self,
        reservation_id: i64,
        expected: ReservationStatus,
        new_status: ReservationStatus,
        confirmed_at: Option<DateTime<Utc>>,
        actor: &str,
        reason: &str,
    ) -> Result<Option<Reservation>, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let updated =
            reservations::guarded_transition(reservation_id, expected, new_status, confirmed_at, &mut tx).await?;
        let result = match updated {
            Some(reservation) => {
                reservations::insert_transition_record(reservation_id, expected, new_status, actor, reason, &mut tx)
                    .await?;
                debug!("🗃️🏠️ Reservation #{reservation_id}: {expected} -> {new_status} ({reason})");
                Some(reservation)
            },
            None => None,
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn fetch_transition_records(
        &self,
        reservation_id: i64,
    ) -> Result<Vec<TransitionRecord>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(reservations::fetch_transition_records(reservation_id, &mut conn).await?)
    }

    /// The full allocation rule runs under one transaction so that a replayed trigger can never
    /// allocate twice. The unique index on `credit_packs.reservation_id` is the storage-level
    /// backstop for the same invariant.
    async fn process_payment_credit(
        &self,
        user_id: i64,
        reservation_id: i64,
        pack_size: i64,
    ) -> Result<CreditPack, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        if let Some(existing) = credits::fetch_pack_for_reservation(reservation_id, &mut tx).await? {
            trace!("🗃️🎟️ Reservation #{reservation_id} already triggered pack {}. Returning it unchanged.", existing.id);
            tx.commit().await?;
            return Ok(existing);
        }
        let pack = match credits::fetch_usable_pack_for_user(user_id, &mut tx).await? {
            Some(pack) => credits::consume_credit(pack.id, &mut tx).await?.ok_or_else(|| {
                PaymentGatewayError::CreditInvariantViolation(format!(
                    "pack {} was drained while consuming a credit",
                    pack.id
                ))
            })?,
            None => credits::insert_pack(user_id, reservation_id, pack_size, &mut tx).await?,
        };
        tx.commit().await?;
        debug!("🗃️🎟️ User {user_id} now has {} of {} credits left in pack {}", pack.remaining(), pack.total_credits, pack.id);
        Ok(pack)
    }

    async fn fetch_credit_pack_for_reservation(
        &self,
        reservation_id: i64,
    ) -> Result<Option<CreditPack>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(credits::fetch_pack_for_reservation(reservation_id, &mut conn).await?)
    }

    async fn fetch_credit_packs_for_user(&self, user_id: i64) -> Result<Vec<CreditPack>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        Ok(credits::fetch_packs_for_user(user_id, &mut conn).await?)
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}

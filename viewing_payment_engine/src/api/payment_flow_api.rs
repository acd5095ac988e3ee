use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewTransaction, PaymentOutcome, Transaction, TransactionStatus},
    traits::{PaymentGatewayDatabase, PaymentGatewayError},
};

/// The result of settling a transaction against a provider-reported outcome.
///
/// Webhooks are delivered at least once, so "this already happened" is a normal, successful
/// answer and carries the current record rather than an error.
#[derive(Debug, Clone)]
pub enum SettlementResult {
    /// The transition was applied now.
    Settled(Transaction),
    /// The transaction was already in the requested state; nothing changed.
    AlreadySettled(Transaction),
}

impl SettlementResult {
    pub fn transaction(&self) -> &Transaction {
        match self {
            SettlementResult::Settled(tx) | SettlementResult::AlreadySettled(tx) => tx,
        }
    }

    pub fn into_transaction(self) -> Transaction {
        match self {
            SettlementResult::Settled(tx) | SettlementResult::AlreadySettled(tx) => tx,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, SettlementResult::Settled(_))
    }
}

/// `PaymentFlowApi` owns the transaction ledger: creating payment attempts, attaching provider
/// checkout details, and applying provider-reported outcomes under the FSM guard.
pub struct PaymentFlowApi<B> {
    db: B,
}

impl<B> Debug for PaymentFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentFlowApi")
    }
}

impl<B> PaymentFlowApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> PaymentFlowApi<B>
where B: PaymentGatewayDatabase
{
    /// Creates a new transaction in `Created` status. No side effects beyond persistence.
    pub async fn create_transaction(&self, tx: NewTransaction) -> Result<Transaction, PaymentGatewayError> {
        let tx = self.db.insert_transaction(tx).await?;
        debug!("💳️ Transaction #{} created ({} {} via {})", tx.id, tx.amount, tx.currency, tx.provider);
        Ok(tx)
    }

    pub async fn fetch_transaction(&self, id: i64) -> Result<Transaction, PaymentGatewayError> {
        self.db.fetch_transaction(id).await?.ok_or(PaymentGatewayError::TransactionNotFound(id))
    }

    /// Records the provider-side id for the checkout session and moves the transaction to
    /// `Pending`. Only legal from `Created`.
    pub async fn attach_provider_details(
        &self,
        id: i64,
        provider_tx_id: &str,
    ) -> Result<Transaction, PaymentGatewayError> {
        self.db.set_provider_details(id, provider_tx_id).await
    }

    pub async fn mark_pending(&self, id: i64) -> Result<Transaction, PaymentGatewayError> {
        self.transition(id, TransactionStatus::Pending, None).await
    }

    pub async fn mark_completed(&self, id: i64) -> Result<Transaction, PaymentGatewayError> {
        self.transition(id, TransactionStatus::Completed, None).await
    }

    pub async fn mark_failed(&self, id: i64, reason: &str) -> Result<Transaction, PaymentGatewayError> {
        self.transition(id, TransactionStatus::Failed, Some(reason)).await
    }

    pub async fn mark_refunded(&self, id: i64) -> Result<Transaction, PaymentGatewayError> {
        self.transition(id, TransactionStatus::Refunded, None).await
    }

    /// Settles a transaction identified by its provider-side id against a normalised webhook
    /// outcome.
    ///
    /// Replays are a given on this channel, so a transaction that is already in the requested
    /// state yields [`SettlementResult::AlreadySettled`] rather than an error; only a genuinely
    /// forbidden transition (e.g. `Failed -> Completed`) fails.
    pub async fn settle_by_provider_id(
        &self,
        provider_tx_id: &str,
        outcome: PaymentOutcome,
        failure_reason: Option<&str>,
    ) -> Result<SettlementResult, PaymentGatewayError> {
        let target = outcome.target_status();
        let current = self
            .db
            .fetch_transaction_by_provider_id(provider_tx_id)
            .await?
            .ok_or_else(|| PaymentGatewayError::ProviderTxIdNotFound(provider_tx_id.to_string()))?;
        if current.status == target {
            debug!("💳️ [{provider_tx_id}] is already {target}. Treating the event as a duplicate.");
            return Ok(SettlementResult::AlreadySettled(current));
        }
        match self.db.guarded_status_update(current.id, target, failure_reason).await? {
            Some(tx) => {
                info!("💳️ [{provider_tx_id}] settled as {target} (transaction #{})", tx.id);
                Ok(SettlementResult::Settled(tx))
            },
            None => {
                // The guard lost a race or the transition is simply not legal. Re-read to decide.
                let now = self
                    .db
                    .fetch_transaction_by_provider_id(provider_tx_id)
                    .await?
                    .ok_or_else(|| PaymentGatewayError::ProviderTxIdNotFound(provider_tx_id.to_string()))?;
                if now.status == target {
                    debug!("💳️ [{provider_tx_id}] reached {target} via a concurrent delivery.");
                    Ok(SettlementResult::AlreadySettled(now))
                } else {
                    Err(PaymentGatewayError::InvalidStateTransition { from: now.status, to: target })
                }
            },
        }
    }

    async fn transition(
        &self,
        id: i64,
        target: TransactionStatus,
        failure_reason: Option<&str>,
    ) -> Result<Transaction, PaymentGatewayError> {
        match self.db.guarded_status_update(id, target, failure_reason).await? {
            Some(tx) => {
                debug!("💳️ Transaction #{id} is now {target}");
                Ok(tx)
            },
            None => {
                let current = self.fetch_transaction(id).await?;
                Err(PaymentGatewayError::InvalidStateTransition { from: current.status, to: target })
            },
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;
use vpg_common::Money;

#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ConversionError(String);

//--------------------------------------  PaymentProvider  -----------------------------------------------------------
/// The external payment providers this gateway integrates with.
///
/// Provider names are case-insensitive on the way in ("Stripe", "STRIPE" and "stripe" all
/// resolve to [`PaymentProvider::Stripe`]), and render lowercase everywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    PayPal,
}

impl Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentProvider::Stripe => write!(f, "stripe"),
            PaymentProvider::PayPal => write!(f, "paypal"),
        }
    }
}

impl FromStr for PaymentProvider {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::PayPal),
            other => Err(ConversionError(format!("Unknown payment provider: {other}"))),
        }
    }
}

//-------------------------------------- TransactionStatus -----------------------------------------------------------
/// The canonical payment state machine.
///
/// | From      | To                |
/// |-----------|-------------------|
/// | Created   | Pending, Failed   |
/// | Pending   | Completed, Failed |
/// | Completed | Refunded          |
/// | Failed    | (terminal)        |
/// | Refunded  | (terminal)        |
///
/// A transaction must acquire a provider-side identity (`Pending`) before it can succeed or fail
/// at the provider. `Completed -> Refunded` is the only reversal a provider ever reports. Every
/// other transition is rejected, which is the correctness guard against malformed or replayed
/// webhook events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Created locally; no provider session exists yet.
    Created,
    /// A provider checkout session has been opened for this transaction.
    Pending,
    /// The provider reported a successful payment.
    Completed,
    /// The provider reported a failed payment. Terminal.
    Failed,
    /// The completed payment was reversed at the provider. Terminal.
    Refunded,
}

impl TransactionStatus {
    /// Whether the FSM permits moving from `self` to `to`.
    pub fn can_transition_to(self, to: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, to),
            (Created, Pending) | (Created, Failed) | (Pending, Completed) | (Pending, Failed) | (Completed, Refunded)
        )
    }

    /// The set of statuses from which `to` may legally be reached. This drives the guarded
    /// compare-and-swap UPDATE in the database layer.
    pub fn allowed_sources(to: TransactionStatus) -> &'static [TransactionStatus] {
        use TransactionStatus::*;
        match to {
            Created => &[],
            Pending => &[Created],
            Completed => &[Pending],
            Failed => &[Created, Pending],
            Refunded => &[Completed],
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TransactionStatus::Failed | TransactionStatus::Refunded)
    }
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Created => write!(f, "Created"),
            TransactionStatus::Pending => write!(f, "Pending"),
            TransactionStatus::Completed => write!(f, "Completed"),
            TransactionStatus::Failed => write!(f, "Failed"),
            TransactionStatus::Refunded => write!(f, "Refunded"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Pending" => Ok(Self::Pending),
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            "Refunded" => Ok(Self::Refunded),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

//--------------------------------------  PaymentOutcome  ------------------------------------------------------------
/// The three outcomes both providers' event taxonomies are normalised onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Completed,
    Failed,
    Refunded,
}

impl PaymentOutcome {
    /// The ledger status this outcome settles a transaction into.
    pub fn target_status(self) -> TransactionStatus {
        match self {
            PaymentOutcome::Completed => TransactionStatus::Completed,
            PaymentOutcome::Failed => TransactionStatus::Failed,
            PaymentOutcome::Refunded => TransactionStatus::Refunded,
        }
    }
}

impl Display for PaymentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentOutcome::Completed => write!(f, "completed"),
            PaymentOutcome::Failed => write!(f, "failed"),
            PaymentOutcome::Refunded => write!(f, "refunded"),
        }
    }
}

//--------------------------------------    Transaction    -----------------------------------------------------------
/// One payment attempt. Append-only from the business' point of view: a refund is a status, not a
/// deletion.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub provider: PaymentProvider,
    pub amount: Money,
    pub currency: String,
    /// Opaque business reference, e.g. the reservation id this payment gates.
    pub reference: String,
    /// The provider-side transaction/session id. Unique once assigned.
    pub provider_tx_id: Option<String>,
    pub status: TransactionStatus,
    /// Only ever set when `status == Failed`.
    pub failure_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------   NewTransaction   ----------------------------------------------------------
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub provider: PaymentProvider,
    pub amount: Money,
    pub currency: String,
    pub reference: String,
}

impl NewTransaction {
    pub fn new(provider: PaymentProvider, amount: Money, currency: &str, reference: &str) -> Self {
        Self { provider, amount, currency: currency.to_string(), reference: reference.to_string() }
    }
}

//-------------------------------------- ReservationStatus -----------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum ReservationStatus {
    /// Requested by the viewer, awaiting owner or payment confirmation.
    Pending,
    /// The viewing is going ahead.
    Confirmed,
    /// Declined by the owner.
    Declined,
    /// The viewing took place.
    Completed,
    /// Cancelled before it took place.
    Cancelled,
}

impl Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReservationStatus::Pending => write!(f, "Pending"),
            ReservationStatus::Confirmed => write!(f, "Confirmed"),
            ReservationStatus::Declined => write!(f, "Declined"),
            ReservationStatus::Completed => write!(f, "Completed"),
            ReservationStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "Confirmed" => Ok(Self::Confirmed),
            "Declined" => Ok(Self::Declined),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            s => Err(ConversionError(format!("Invalid reservation status: {s}"))),
        }
    }
}

//--------------------------------------    Reservation    -----------------------------------------------------------
/// The viewing request a payment gates. Created and human-mutated by the reservation workflow
/// (outside this crate); the reconciler only ever applies the two guarded transitions.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Reservation {
    pub id: i64,
    /// The viewer paying for (and owning the credits from) this reservation.
    pub user_id: i64,
    pub status: ReservationStatus,
    /// At most one transaction references a given reservation.
    pub transaction_id: Option<i64>,
    pub proposed_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub decline_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewReservation {
    pub user_id: i64,
    pub proposed_at: DateTime<Utc>,
}

impl NewReservation {
    pub fn new(user_id: i64, proposed_at: DateTime<Utc>) -> Self {
        Self { user_id, proposed_at }
    }
}

//--------------------------------------  TransitionRecord  ----------------------------------------------------------
/// Immutable audit entry: one row per reservation state change, including system-initiated ones.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub id: i64,
    pub reservation_id: i64,
    pub from_status: ReservationStatus,
    pub to_status: ReservationStatus,
    /// A user id rendered as a string, or `"system"` for reconciler-initiated changes.
    pub actor: String,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub const SYSTEM_ACTOR: &str = "system";

//--------------------------------------     CreditPack     ----------------------------------------------------------
/// A promotional "pay once, next N viewings free" entitlement bundle.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct CreditPack {
    pub id: i64,
    pub user_id: i64,
    pub total_credits: i64,
    pub used_credits: i64,
    /// The reservation whose payment triggered creation. Doubles as the idempotency key: at most
    /// one pack per triggering reservation.
    pub reservation_id: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CreditPack {
    pub fn remaining(&self) -> i64 {
        self.total_credits - self.used_credits
    }

    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.remaining() > 0 && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

/// Every pack is created with this many credits; the triggering payment consumes the first.
pub const CREDIT_PACK_SIZE: i64 = 3;

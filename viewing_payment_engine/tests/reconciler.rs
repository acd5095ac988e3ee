//! Reservation reconciliation tests: the guarded reactions and their audit trail.
use chrono::{Duration, Utc};
use viewing_payment_engine::{
    api::reconciler_api::{REASON_AUTO_CANCELLED, REASON_AUTO_CONFIRMED},
    db_types::*,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    PaymentFlowApi,
    PaymentGatewayDatabase,
    ReconcileOutcome,
    ReconcilerApi,
    SqliteDatabase,
};
use vpg_common::Money;

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

/// Creates a pending reservation gated by a completed transaction and returns both.
async fn paid_reservation(db: &SqliteDatabase, user_id: i64) -> (Reservation, Transaction) {
    let api = PaymentFlowApi::new(db.clone());
    let reservation = db.insert_reservation(NewReservation::new(user_id, Utc::now() + Duration::days(3))).await.unwrap();
    let tx = api
        .create_transaction(NewTransaction::new(PaymentProvider::Stripe, Money::from(4_500), "EUR", "resv"))
        .await
        .unwrap();
    let tx = api.attach_provider_details(tx.id, &format!("cs_resv_{}", reservation.id)).await.unwrap();
    db.link_transaction(reservation.id, tx.id).await.unwrap();
    let tx = api.mark_completed(tx.id).await.unwrap();
    (reservation, tx)
}

#[tokio::test]
async fn completed_payment_confirms_pending_reservation() {
    let db = new_db().await;
    let reconciler = ReconcilerApi::new(db.clone());
    let (reservation, tx) = paid_reservation(&db, 1).await;

    let outcome = reconciler.on_payment_completed(&tx).await.unwrap();
    let confirmed = match outcome {
        ReconcileOutcome::Applied(r) => r,
        other => panic!("Expected Applied, got {other:?}"),
    };
    assert_eq!(confirmed.status, ReservationStatus::Confirmed);
    // confirmed datetime is taken from the proposed datetime
    assert_eq!(confirmed.confirmed_at.map(|t| t.timestamp()), Some(reservation.proposed_at.timestamp()));

    let trail = db.fetch_transition_records(reservation.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].from_status, ReservationStatus::Pending);
    assert_eq!(trail[0].to_status, ReservationStatus::Confirmed);
    assert_eq!(trail[0].actor, SYSTEM_ACTOR);
    assert_eq!(trail[0].reason.as_deref(), Some(REASON_AUTO_CONFIRMED));
}

#[tokio::test]
async fn human_action_wins_over_late_webhook() {
    let db = new_db().await;
    let reconciler = ReconcilerApi::new(db.clone());
    let (reservation, tx) = paid_reservation(&db, 2).await;

    // The owner declined before the webhook arrived
    db.apply_reservation_transition(
        reservation.id,
        ReservationStatus::Pending,
        ReservationStatus::Declined,
        None,
        "42",
        "owner declined",
    )
    .await
    .unwrap()
    .unwrap();

    let outcome = reconciler.on_payment_completed(&tx).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Ignored(_)));
    let current = db.fetch_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(current.status, ReservationStatus::Declined);
    // no system audit row was appended on top of the human one
    let trail = db.fetch_transition_records(reservation.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].actor, "42");
}

#[tokio::test]
async fn reconciling_is_safe_to_re_invoke() {
    let db = new_db().await;
    let reconciler = ReconcilerApi::new(db.clone());
    let (reservation, tx) = paid_reservation(&db, 3).await;

    assert!(matches!(reconciler.on_payment_completed(&tx).await.unwrap(), ReconcileOutcome::Applied(_)));
    // Re-delivery of the same settled transaction: the reservation is Confirmed now, so the
    // guard skips and the audit trail stays at one row.
    assert!(matches!(reconciler.on_payment_completed(&tx).await.unwrap(), ReconcileOutcome::Ignored(_)));
    assert_eq!(db.fetch_transition_records(reservation.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn refund_cancels_only_confirmed_reservations() {
    let db = new_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let reconciler = ReconcilerApi::new(db.clone());
    let (reservation, tx) = paid_reservation(&db, 4).await;
    reconciler.on_payment_completed(&tx).await.unwrap();

    let tx = flow.mark_refunded(tx.id).await.unwrap();
    let outcome = reconciler.on_payment_refunded(&tx).await.unwrap();
    let cancelled = match outcome {
        ReconcileOutcome::Applied(r) => r,
        other => panic!("Expected Applied, got {other:?}"),
    };
    assert_eq!(cancelled.status, ReservationStatus::Cancelled);

    let trail = db.fetch_transition_records(reservation.id).await.unwrap();
    assert_eq!(trail.len(), 2);
    assert_eq!(trail[1].to_status, ReservationStatus::Cancelled);
    assert_eq!(trail[1].reason.as_deref(), Some(REASON_AUTO_CANCELLED));
}

#[tokio::test]
async fn refund_for_already_cancelled_reservation_is_a_no_op() {
    let db = new_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let reconciler = ReconcilerApi::new(db.clone());
    let (reservation, tx) = paid_reservation(&db, 5).await;

    // Cancelled by hand while still pending-confirmed dance was going on
    db.apply_reservation_transition(
        reservation.id,
        ReservationStatus::Pending,
        ReservationStatus::Cancelled,
        None,
        "9",
        "viewer cancelled",
    )
    .await
    .unwrap()
    .unwrap();

    let tx = flow.mark_refunded(tx.id).await.unwrap();
    assert_eq!(tx.status, TransactionStatus::Refunded);
    let outcome = reconciler.on_payment_refunded(&tx).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Ignored(_)));
    let current = db.fetch_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(current.status, ReservationStatus::Cancelled);
}

#[tokio::test]
async fn unlinked_transaction_reconciles_to_not_linked() {
    let db = new_db().await;
    let flow = PaymentFlowApi::new(db.clone());
    let reconciler = ReconcilerApi::new(db.clone());

    let tx = flow
        .create_transaction(NewTransaction::new(PaymentProvider::PayPal, Money::from(900), "EUR", "standalone"))
        .await
        .unwrap();
    let tx = flow.attach_provider_details(tx.id, "ORDER-NL").await.unwrap();
    let tx = flow.mark_completed(tx.id).await.unwrap();
    assert!(matches!(reconciler.on_payment_completed(&tx).await.unwrap(), ReconcileOutcome::NotLinked));
}

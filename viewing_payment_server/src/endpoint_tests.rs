//! End-to-end webhook tests against a real SQLite store.
//!
//! Each test wires the same app the server builds in production (signature middleware included)
//! and drives it with `actix_web::test` requests.

use actix_web::{body::MessageBody, http::StatusCode, test, test::TestRequest, web, App};
use chrono::{Duration, Utc};
use viewing_payment_engine::{
    db_types::{
        NewReservation,
        NewTransaction,
        PaymentOutcome,
        PaymentProvider,
        Reservation,
        ReservationStatus,
        Transaction,
        TransactionStatus,
        SYSTEM_ACTOR,
    },
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::InMemoryDedupCache,
    CreditApi,
    PaymentFlowApi,
    PaymentGatewayDatabase,
    ReconcilerApi,
    SqliteDatabase,
};
use vpg_common::{Money, Secret};

use crate::{
    helpers::{signature_header_value, STRIPE_SIGNATURE_HEADER},
    middleware::SignatureMiddlewareFactory,
    webhook_routes::{paypal_webhook, stripe_webhook},
};

const WEBHOOK_SECRET: &str = "whsec_endpoint_tests";
const SIGNED_AT: i64 = 1_700_000_000;

async fn new_db() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database")
}

/// Seeds a pending reservation gated by a pending transaction with the given provider id.
async fn seed_paid_checkout(
    db: &SqliteDatabase,
    user_id: i64,
    provider: PaymentProvider,
    provider_tx_id: &str,
) -> (Reservation, Transaction) {
    let flow = PaymentFlowApi::new(db.clone());
    let reservation =
        db.insert_reservation(NewReservation::new(user_id, Utc::now() + Duration::days(2))).await.unwrap();
    let tx = flow
        .create_transaction(NewTransaction::new(provider, Money::from(4_500), "EUR", &reservation.id.to_string()))
        .await
        .unwrap();
    db.link_transaction(reservation.id, tx.id).await.unwrap();
    let tx = flow.attach_provider_details(tx.id, provider_tx_id).await.unwrap();
    (reservation, tx)
}

fn stripe_body(event_id: &str, event_type: &str, resource_id: &str) -> String {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": { "id": resource_id } }
    })
    .to_string()
}

fn signed_header(body: &str) -> (&'static str, String) {
    (STRIPE_SIGNATURE_HEADER, signature_header_value(WEBHOOK_SECRET, SIGNED_AT, body.as_bytes()))
}

/// Posts `body` at the webhook app and returns the response status and body. Rejections raised
/// inside the signature middleware surface as service errors, so those are unwrapped here too.
async fn deliver(
    db: &SqliteDatabase,
    dedup: &InMemoryDedupCache,
    uri: &str,
    header: Option<(&str, String)>,
    body: String,
) -> (StatusCode, String) {
    let app = App::new()
        .app_data(web::Data::new(PaymentFlowApi::new(db.clone())))
        .app_data(web::Data::new(ReconcilerApi::new(db.clone())))
        .app_data(web::Data::new(CreditApi::new(db.clone())))
        .app_data(web::Data::new(dedup.clone()))
        .service(
            web::scope("/payments")
                .service(
                    web::scope("/stripe")
                        .wrap(SignatureMiddlewareFactory::new(
                            STRIPE_SIGNATURE_HEADER,
                            Secret::new(WEBHOOK_SECRET.to_string()),
                            true,
                        ))
                        .route("/webhook", web::post().to(stripe_webhook::<SqliteDatabase, InMemoryDedupCache>)),
                )
                .route("/paypal/webhook", web::post().to(paypal_webhook::<SqliteDatabase>)),
        );
    let service = test::init_service(app).await;
    let mut req = TestRequest::post().uri(uri).set_payload(body);
    if let Some(h) = header {
        req = req.insert_header(h);
    }
    match test::try_call_service(&service, req.to_request()).await {
        Ok(res) => {
            let (_, res) = res.into_parts();
            let status = res.status();
            let body = String::from_utf8_lossy(&res.into_body().try_into_bytes().unwrap()).into_owned();
            (status, body)
        },
        Err(e) => {
            let res = e.error_response();
            let status = res.status();
            let body = actix_web::body::to_bytes(res.into_body()).await.unwrap();
            (status, String::from_utf8_lossy(&body).into_owned())
        },
    }
}

async fn deliver_stripe(db: &SqliteDatabase, dedup: &InMemoryDedupCache, body: String) -> (StatusCode, String) {
    let header = signed_header(&body);
    deliver(db, dedup, "/payments/stripe/webhook", Some(header), body).await
}

#[actix_web::test]
async fn completed_event_settles_confirms_and_allocates() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();
    let (reservation, tx) = seed_paid_checkout(&db, 100, PaymentProvider::Stripe, "cs_e2e_1").await;

    let body = stripe_body("evt_1", "checkout.session.completed", "cs_e2e_1");
    let (status, response) = deliver_stripe(&db, &dedup, body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.contains(r#""received":true"#));

    let tx = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    let reservation = db.fetch_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    let trail = db.fetch_transition_records(reservation.id).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].actor, SYSTEM_ACTOR);
    let packs = db.fetch_credit_packs_for_user(100).await.unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].used_credits, 1);
}

#[actix_web::test]
async fn redelivered_event_id_is_absorbed_by_the_dedup_cache() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();
    let (reservation, _) = seed_paid_checkout(&db, 101, PaymentProvider::Stripe, "cs_e2e_2").await;

    let body = stripe_body("evt_2", "checkout.session.completed", "cs_e2e_2");
    let (status, _) = deliver_stripe(&db, &dedup, body.clone()).await;
    assert_eq!(status, StatusCode::OK);
    let (status, response) = deliver_stripe(&db, &dedup, body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.contains(r#""received":true"#));

    assert_eq!(db.fetch_transition_records(reservation.id).await.unwrap().len(), 1);
    let packs = db.fetch_credit_packs_for_user(101).await.unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].used_credits, 1);
}

#[actix_web::test]
async fn same_outcome_under_a_new_event_id_settles_idempotently() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();
    let (reservation, tx) = seed_paid_checkout(&db, 102, PaymentProvider::Stripe, "cs_e2e_3").await;

    let first = stripe_body("evt_3a", "checkout.session.completed", "cs_e2e_3");
    deliver_stripe(&db, &dedup, first).await;
    // A fresh event id dodges the dedup cache; settlement itself absorbs the duplicate
    let second = stripe_body("evt_3b", "checkout.session.completed", "cs_e2e_3");
    let (status, response) = deliver_stripe(&db, &dedup, second).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.contains(r#""received":true"#));

    let tx = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(db.fetch_transition_records(reservation.id).await.unwrap().len(), 1);
    let packs = db.fetch_credit_packs_for_user(102).await.unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].used_credits, 1);
}

#[actix_web::test]
async fn redelivery_completes_reactions_missed_by_an_earlier_delivery() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();
    let (reservation, _) = seed_paid_checkout(&db, 109, PaymentProvider::Stripe, "cs_e2e_8").await;

    // The transaction settled but the process died before the reservation was reconciled
    let flow = PaymentFlowApi::new(db.clone());
    flow.settle_by_provider_id("cs_e2e_8", PaymentOutcome::Completed, None).await.unwrap();
    let stuck = db.fetch_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(stuck.status, ReservationStatus::Pending);

    // The provider redelivers under a fresh event id; the reactions must still run
    let body = stripe_body("evt_9", "checkout.session.completed", "cs_e2e_8");
    let (status, response) = deliver_stripe(&db, &dedup, body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.contains(r#""received":true"#));

    let reservation = db.fetch_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(reservation.status, ReservationStatus::Confirmed);
    let packs = db.fetch_credit_packs_for_user(109).await.unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].used_credits, 1);
}

#[actix_web::test]
async fn unsigned_or_missigned_deliveries_are_rejected() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();
    let (_, tx) = seed_paid_checkout(&db, 103, PaymentProvider::Stripe, "cs_e2e_4").await;
    let body = stripe_body("evt_4", "checkout.session.completed", "cs_e2e_4");

    let (status, response) = deliver(&db, &dedup, "/payments/stripe/webhook", None, body.clone()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response.contains(r#""received":false"#));
    assert!(response.contains(r#""error""#));

    let forged = (STRIPE_SIGNATURE_HEADER, signature_header_value("whsec_wrong", SIGNED_AT, body.as_bytes()));
    let (status, response) = deliver(&db, &dedup, "/payments/stripe/webhook", Some(forged), body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response.contains(r#""received":false"#));

    // Nothing was settled
    let tx = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
}

#[actix_web::test]
async fn malformed_payload_is_rejected() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();

    let body = "this is not json".to_string();
    let (status, response) = deliver_stripe(&db, &dedup, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response.contains(r#""received":false"#));
}

#[actix_web::test]
async fn unknown_provider_session_is_acknowledged() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();

    let body = stripe_body("evt_5", "checkout.session.completed", "cs_created_in_dashboard");
    let (status, response) = deliver_stripe(&db, &dedup, body).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.contains(r#""received":true"#));
}

#[actix_web::test]
async fn unmapped_event_types_are_ignored() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();
    let (_, tx) = seed_paid_checkout(&db, 104, PaymentProvider::Stripe, "cs_e2e_5").await;

    let body = stripe_body("evt_6", "invoice.paid", "cs_e2e_5");
    let (status, _) = deliver_stripe(&db, &dedup, body).await;
    assert_eq!(status, StatusCode::OK);
    let tx = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Pending);
}

#[actix_web::test]
async fn failure_event_records_the_providers_reason() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();
    let (reservation, tx) = seed_paid_checkout(&db, 105, PaymentProvider::Stripe, "cs_e2e_6").await;

    let body = serde_json::json!({
        "id": "evt_7",
        "type": "payment_intent.payment_failed",
        "data": { "object": {
            "id": "cs_e2e_6",
            "last_payment_error": { "message": "Your card was declined." }
        } }
    })
    .to_string();
    let (status, _) = deliver_stripe(&db, &dedup, body).await;
    assert_eq!(status, StatusCode::OK);

    let tx = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(tx.failure_reason.as_deref(), Some("Your card was declined."));
    // A failed payment leaves the reservation waiting for another attempt
    let reservation = db.fetch_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(reservation.status, ReservationStatus::Pending);
}

#[actix_web::test]
async fn refund_event_cancels_the_confirmed_reservation() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();
    let (reservation, tx) = seed_paid_checkout(&db, 106, PaymentProvider::Stripe, "cs_e2e_7").await;

    deliver_stripe(&db, &dedup, stripe_body("evt_8a", "checkout.session.completed", "cs_e2e_7")).await;
    let (status, _) = deliver_stripe(&db, &dedup, stripe_body("evt_8b", "charge.refunded", "cs_e2e_7")).await;
    assert_eq!(status, StatusCode::OK);

    let tx = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Refunded);
    let reservation = db.fetch_reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(reservation.status, ReservationStatus::Cancelled);
    assert_eq!(db.fetch_transition_records(reservation.id).await.unwrap().len(), 2);
}

#[actix_web::test]
async fn paypal_approval_then_capture_confirms_once() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();
    let (reservation, tx) = seed_paid_checkout(&db, 107, PaymentProvider::PayPal, "ORDER-E2E-1").await;

    let approved = serde_json::json!({
        "event_type": "CHECKOUT.ORDER.APPROVED",
        "resource": { "id": "ORDER-E2E-1" }
    })
    .to_string();
    let (status, _) = deliver(&db, &dedup, "/payments/paypal/webhook", None, approved).await;
    assert_eq!(status, StatusCode::OK);

    // The capture event references the order through supplementary data
    let captured = serde_json::json!({
        "event_type": "PAYMENT.CAPTURE.COMPLETED",
        "resource": {
            "id": "CAPTURE-1",
            "supplementary_data": { "related_ids": { "order_id": "ORDER-E2E-1" } }
        }
    })
    .to_string();
    let (status, response) = deliver(&db, &dedup, "/payments/paypal/webhook", None, captured).await;
    assert_eq!(status, StatusCode::OK);
    assert!(response.contains(r#""received":true"#));

    let tx = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(db.fetch_transition_records(reservation.id).await.unwrap().len(), 1);
    let packs = db.fetch_credit_packs_for_user(107).await.unwrap();
    assert_eq!(packs.len(), 1);
    assert_eq!(packs[0].used_credits, 1);
}

#[actix_web::test]
async fn paypal_without_an_event_type_is_rejected() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();

    let body = serde_json::json!({ "resource": { "id": "ORDER-E2E-2" } }).to_string();
    let (status, response) = deliver(&db, &dedup, "/payments/paypal/webhook", None, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(response.contains(r#""received":false"#));
}

#[actix_web::test]
async fn paypal_capture_denied_fails_the_transaction() {
    let db = new_db().await;
    let dedup = InMemoryDedupCache::default();
    let (_, tx) = seed_paid_checkout(&db, 108, PaymentProvider::PayPal, "ORDER-E2E-3").await;

    let denied = serde_json::json!({
        "event_type": "PAYMENT.CAPTURE.DENIED",
        "resource": {
            "id": "CAPTURE-2",
            "supplementary_data": { "related_ids": { "order_id": "ORDER-E2E-3" } }
        }
    })
    .to_string();
    let (status, _) = deliver(&db, &dedup, "/payments/paypal/webhook", None, denied).await;
    assert_eq!(status, StatusCode::OK);
    let tx = db.fetch_transaction(tx.id).await.unwrap().unwrap();
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(tx.failure_reason.as_deref(), Some("capture denied by provider"));
}

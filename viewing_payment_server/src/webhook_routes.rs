//! Webhook ingestion endpoints for the payment providers.
//!
//! Both endpoints normalise the provider's event vocabulary into a [`PaymentOutcome`] and hand it
//! to the same settlement path: settle the transaction by its provider id, then run the
//! reconciler and the credit ledger. The reactions run even when the ledger reports the outcome
//! as already settled, so that a delivery that died between settlement and reconciliation is
//! healed by the provider's redelivery. Every reaction is a guarded, idempotent operation.
//!
//! Transient backend failures answer with a 500 so that the provider redelivers. An FSM
//! violation answers 200 with the error in the body; redelivering it will never make it legal.

use actix_web::{web, HttpResponse};
use log::*;
use viewing_payment_engine::{
    db_types::PaymentOutcome,
    traits::EventDedupStore,
    CreditApi,
    PaymentFlowApi,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    ReconcileOutcome,
    ReconcilerApi,
};

use crate::data_objects::{PayPalEvent, StripeEvent, WebhookAck};

/// Maps a Stripe event type onto the outcome it settles. Unmapped event types are ignored.
pub fn stripe_outcome(event_type: &str) -> Option<PaymentOutcome> {
    match event_type {
        "checkout.session.completed" => Some(PaymentOutcome::Completed),
        "payment_intent.payment_failed" => Some(PaymentOutcome::Failed),
        "charge.refunded" => Some(PaymentOutcome::Refunded),
        _ => None,
    }
}

/// Maps a PayPal event type onto the outcome it settles. PayPal reports a successful payment
/// twice (order approval, then capture); both map to `Completed` and the second delivery lands as
/// an idempotent duplicate.
pub fn paypal_outcome(event_type: &str) -> Option<PaymentOutcome> {
    match event_type {
        "CHECKOUT.ORDER.APPROVED" | "PAYMENT.CAPTURE.COMPLETED" => Some(PaymentOutcome::Completed),
        "PAYMENT.CAPTURE.DENIED" => Some(PaymentOutcome::Failed),
        "PAYMENT.CAPTURE.REFUNDED" => Some(PaymentOutcome::Refunded),
        _ => None,
    }
}

/// POST `/payments/stripe/webhook`
///
/// Signature verification happens in the middleware wrapping this route, so the body arrives
/// authenticated. Deliveries are deduplicated on the Stripe event id: the id is claimed up front
/// so concurrent redeliveries are absorbed, and the claim is released again if processing fails,
/// leaving the retry free to land.
pub async fn stripe_webhook<B, D>(
    body: web::Bytes,
    flow: web::Data<PaymentFlowApi<B>>,
    reconciler: web::Data<ReconcilerApi<B>>,
    credits: web::Data<CreditApi<B>>,
    dedup: web::Data<D>,
) -> HttpResponse
where
    B: PaymentGatewayDatabase,
    D: EventDedupStore,
{
    let event = match serde_json::from_slice::<StripeEvent>(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("🪝️ Could not parse Stripe webhook payload. {e}");
            return HttpResponse::BadRequest().json(WebhookAck::failure(format!("Invalid payload: {e}")));
        },
    };
    if !dedup.mark_processed(&event.id).await {
        debug!("🪝️ Stripe event [{}] has already been processed. Acknowledging without action.", event.id);
        return HttpResponse::Ok().json(WebhookAck::received());
    }
    let Some(outcome) = stripe_outcome(&event.event_type) else {
        debug!("🪝️ Ignoring unhandled Stripe event type [{}]", event.event_type);
        return HttpResponse::Ok().json(WebhookAck::received());
    };
    let Some(provider_tx_id) = event.resource_id() else {
        warn!("🪝️ Stripe event [{}] carries no resource id. Acknowledging without action.", event.id);
        return HttpResponse::Ok().json(WebhookAck::received());
    };
    let failure_reason = match outcome {
        PaymentOutcome::Failed => Some(event.failure_message().unwrap_or("payment failed at provider")),
        _ => None,
    };
    match apply_outcome(provider_tx_id, outcome, failure_reason, &flow, &reconciler, &credits).await {
        Ok(()) => HttpResponse::Ok().json(WebhookAck::received()),
        Err(e) => {
            dedup.forget(&event.id).await;
            failure_response(provider_tx_id, outcome, e)
        },
    }
}

/// POST `/payments/paypal/webhook`
///
/// PayPal deliveries are validated structurally: a missing event type is a malformed payload and
/// a 400, a missing resource id is logged and acknowledged. There is no per-event dedup key on
/// this channel; idempotent settlement absorbs redeliveries instead.
pub async fn paypal_webhook<B>(
    body: web::Bytes,
    flow: web::Data<PaymentFlowApi<B>>,
    reconciler: web::Data<ReconcilerApi<B>>,
    credits: web::Data<CreditApi<B>>,
) -> HttpResponse
where
    B: PaymentGatewayDatabase,
{
    let event = match serde_json::from_slice::<PayPalEvent>(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!("🪝️ Could not parse PayPal webhook payload. {e}");
            return HttpResponse::BadRequest().json(WebhookAck::failure(format!("Invalid payload: {e}")));
        },
    };
    let Some(outcome) = paypal_outcome(&event.event_type) else {
        debug!("🪝️ Ignoring unhandled PayPal event type [{}]", event.event_type);
        return HttpResponse::Ok().json(WebhookAck::received());
    };
    let Some(provider_tx_id) = event.resource_id() else {
        warn!("🪝️ PayPal event [{}] carries no order id. Acknowledging without action.", event.event_type);
        return HttpResponse::Ok().json(WebhookAck::received());
    };
    let failure_reason = match outcome {
        PaymentOutcome::Failed => Some("capture denied by provider"),
        _ => None,
    };
    match apply_outcome(provider_tx_id, outcome, failure_reason, &flow, &reconciler, &credits).await {
        Ok(()) => HttpResponse::Ok().json(WebhookAck::received()),
        Err(e) => failure_response(provider_tx_id, outcome, e),
    }
}

/// The common settlement path: settle the ledger, then run the downstream reactions. The
/// reactions run whether or not this particular delivery applied the settlement: an earlier
/// delivery may have settled the transaction and then died before reconciling, and every
/// reaction is a guarded no-op once its work is done.
async fn apply_outcome<B>(
    provider_tx_id: &str,
    outcome: PaymentOutcome,
    failure_reason: Option<&str>,
    flow: &PaymentFlowApi<B>,
    reconciler: &ReconcilerApi<B>,
    credits: &CreditApi<B>,
) -> Result<(), PaymentGatewayError>
where
    B: PaymentGatewayDatabase,
{
    let settlement = match flow.settle_by_provider_id(provider_tx_id, outcome, failure_reason).await {
        Ok(s) => s,
        Err(PaymentGatewayError::ProviderTxIdNotFound(id)) => {
            // Providers can deliver events for sessions this server never created (e.g. ones
            // made in their dashboard). That is their business, not an error of ours.
            info!("🪝️ No transaction matches provider id [{id}]. Acknowledging without action.");
            return Ok(());
        },
        Err(e) => return Err(e),
    };
    if !settlement.was_applied() {
        debug!("🪝️ [{provider_tx_id}] was already settled. Re-running the reactions for the duplicate.");
    }
    let tx = settlement.into_transaction();
    let reaction = match outcome {
        PaymentOutcome::Completed => reconciler.on_payment_completed(&tx).await?,
        PaymentOutcome::Refunded => reconciler.on_payment_refunded(&tx).await?,
        PaymentOutcome::Failed => ReconcileOutcome::NotLinked,
    };
    if outcome == PaymentOutcome::Completed {
        if let Some(reservation) = reaction.reservation() {
            credits.on_payment_succeeded(reservation.user_id, reservation).await?;
        }
    }
    Ok(())
}

/// An FSM violation is permanent, so the delivery is acknowledged with the error in the body.
/// Anything else is assumed transient and answers 500 so that the provider redelivers.
fn failure_response(provider_tx_id: &str, outcome: PaymentOutcome, e: PaymentGatewayError) -> HttpResponse {
    warn!("🪝️ Could not apply {outcome:?} to [{provider_tx_id}]. {e}");
    match e {
        PaymentGatewayError::InvalidStateTransition { .. } => HttpResponse::Ok().json(WebhookAck::failure(e)),
        e => HttpResponse::InternalServerError().json(WebhookAck::failure(e)),
    }
}

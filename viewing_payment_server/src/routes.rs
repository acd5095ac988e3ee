//! Request handler definitions
//!
//! Define each route and its handler here. Webhook ingestion lives in
//! [`webhook_routes`](crate::webhook_routes); keep this module neat and tidy 🙏

use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use viewing_payment_engine::{
    db_types::NewTransaction,
    PaymentFlowApi,
    PaymentGatewayDatabase,
};
use vpg_common::Money;

use crate::{
    data_objects::{CheckoutRequest, CheckoutResponse},
    errors::ServerError,
    providers::ProviderRouter,
};

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

/// POST `/checkout`
///
/// Creates a ledger transaction for the reservation, opens a checkout session at the requested
/// provider, and returns the redirect URL for the viewer. The transaction is `Pending` once the
/// provider session id has been attached.
pub async fn checkout<B: PaymentGatewayDatabase>(
    req: web::Json<CheckoutRequest>,
    flow: web::Data<PaymentFlowApi<B>>,
    router: web::Data<ProviderRouter>,
) -> Result<HttpResponse, ServerError> {
    let (provider, adapter) = router.resolve(&req.provider)?;
    let reservation = flow
        .db()
        .fetch_reservation(req.reservation_id)
        .await
        .map_err(ServerError::from)?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Reservation #{} does not exist", req.reservation_id)))?;
    let new_tx =
        NewTransaction::new(provider, Money::from(req.amount), &req.currency, &req.reservation_id.to_string());
    let tx = flow.create_transaction(new_tx).await?;
    flow.db().link_transaction(reservation.id, tx.id).await.map_err(ServerError::from)?;
    let session = match adapter.create_checkout_session(&tx, &reservation).await {
        Ok(session) => session,
        Err(e) => {
            warn!("🛒️ Provider rejected checkout for transaction #{}. {e}", tx.id);
            if let Err(db_err) = flow.mark_failed(tx.id, &e.to_string()).await {
                warn!("🛒️ Could not mark transaction #{} as failed. {db_err}", tx.id);
            }
            return Err(ServerError::ProviderError(e));
        },
    };
    let tx = flow.attach_provider_details(tx.id, &session.provider_transaction_id).await?;
    info!("🛒️ Checkout session [{}] opened for reservation #{}", session.provider_transaction_id, reservation.id);
    let response = CheckoutResponse {
        transaction_id: tx.id,
        provider_transaction_id: session.provider_transaction_id,
        redirect_url: session.redirect_url,
    };
    Ok(HttpResponse::Ok().json(response))
}

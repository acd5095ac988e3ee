//! Webhook signature middleware for Actix Web.
//!
//! Stripe signs every webhook delivery over the raw request body, so the check has to happen
//! before any JSON extraction touches the payload. The middleware drains the body, verifies the
//! `Stripe-Signature` header, and re-injects the bytes so the wrapped handler can read them as
//! usual.
//!
//! An unsigned or badly signed delivery is rejected with a 400 carrying the same
//! `{"received": false, "error": ...}` body the handlers use, so the provider sees a permanent
//! failure rather than retrying forever.

use std::{
    future::{ready, Ready},
    rc::Rc,
};

use actix_http::h1;
use actix_web::{
    dev::{forward_ready, Payload, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    web,
    Error,
    HttpResponse,
};
use futures::future::LocalBoxFuture;
use log::{trace, warn};
use vpg_common::Secret;

use crate::{data_objects::WebhookAck, errors::ServerError, helpers::verify_webhook_signature};

fn rejection(cause: ServerError) -> Error {
    let response = HttpResponse::BadRequest().json(WebhookAck::failure(&cause));
    InternalError::from_response(cause, response).into()
}

pub struct SignatureMiddlewareFactory {
    signature_header: String,
    secret: Secret<String>,
    // If false, the middleware will not check signatures and always allow the call
    enabled: bool,
}

impl SignatureMiddlewareFactory {
    pub fn new(signature_header: &str, secret: Secret<String>, enabled: bool) -> Self {
        SignatureMiddlewareFactory { signature_header: signature_header.into(), secret, enabled }
    }
}

impl<S, B> Transform<S, ServiceRequest> for SignatureMiddlewareFactory
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;
    type InitError = ();
    type Response = ServiceResponse<B>;
    type Transform = SignatureMiddlewareService<S>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(SignatureMiddlewareService {
            signature_header: self.signature_header.clone(),
            secret: self.secret.clone(),
            enabled: self.enabled,
            service: Rc::new(service),
        }))
    }
}

pub struct SignatureMiddlewareService<S> {
    signature_header: String,
    secret: Secret<String>,
    enabled: bool,
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SignatureMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;
    type Response = ServiceResponse<B>;

    forward_ready!(service);

    fn call(&self, mut req: ServiceRequest) -> Self::Future {
        let service = Rc::clone(&self.service);
        let secret = self.secret.reveal().clone();
        let signature_header = self.signature_header.clone();
        let enabled = self.enabled;
        Box::pin(async move {
            trace!("🔐️ Checking webhook signature for request");
            if !enabled {
                trace!("🔐️ Signature checks are disabled. Allowing request.");
                return service.call(req).await;
            }
            let data = req.extract::<web::Bytes>().await.map_err(|e| {
                warn!("🔐️ Failed to extract request data: {:?}", e);
                rejection(ServerError::InvalidPayload("Failed to extract request data.".to_string()))
            })?;
            let header = req
                .headers()
                .get(&signature_header)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| {
                    warn!("🔐️ No webhook signature found in request. Denying access.");
                    rejection(ServerError::InvalidSignature)
                })?
                .to_string();
            if verify_webhook_signature(&secret, &header, data.as_ref()) {
                trace!("🔐️ Webhook signature check for request ✅️");
                req.set_payload(bytes_to_payload(data));
                service.call(req).await
            } else {
                warn!("🔐️ Invalid webhook signature found in request. Denying access.");
                Err(rejection(ServerError::InvalidSignature))
            }
        })
    }
}

fn bytes_to_payload(buf: web::Bytes) -> Payload {
    let (_, mut pl) = h1::Payload::create(true);
    pl.unread_data(buf);
    Payload::from(pl)
}

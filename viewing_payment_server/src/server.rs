use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use viewing_payment_engine::{
    traits::InMemoryDedupCache,
    CreditApi,
    PaymentFlowApi,
    ReconcilerApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    helpers::STRIPE_SIGNATURE_HEADER,
    middleware::SignatureMiddlewareFactory,
    providers::{PayPalProvider, ProviderRouter, StripeProvider},
    routes::{checkout, health},
    webhook_routes::{paypal_webhook, stripe_webhook},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let srv = create_server_instance(config, db)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

pub fn build_provider_router(config: &ServerConfig) -> Result<ProviderRouter, ServerError> {
    let mut router = ProviderRouter::new();
    router.register(Arc::new(StripeProvider::new(config.stripe.clone())?));
    router.register(Arc::new(PayPalProvider::new(config.paypal.clone())?));
    Ok(router)
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let router = build_provider_router(&config)?;
    // One dedup cache for the whole server, shared across workers
    let dedup = InMemoryDedupCache::new(config.dedup_cache_size);
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let flow_api = PaymentFlowApi::new(db.clone());
        let reconciler_api = ReconcilerApi::new(db.clone());
        let credit_api = CreditApi::new(db.clone());
        let signature_check = SignatureMiddlewareFactory::new(
            STRIPE_SIGNATURE_HEADER,
            config.stripe.webhook_secret.clone(),
            config.stripe.signature_checks,
        );
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("vpg::access_log"))
            .app_data(web::Data::new(flow_api))
            .app_data(web::Data::new(reconciler_api))
            .app_data(web::Data::new(credit_api))
            .app_data(web::Data::new(router.clone()))
            .app_data(web::Data::new(dedup.clone()))
            .service(health)
            .service(web::resource("/checkout").route(web::post().to(checkout::<SqliteDatabase>)))
            .service(
                web::scope("/payments")
                    .service(
                        web::scope("/stripe").wrap(signature_check).route(
                            "/webhook",
                            web::post().to(stripe_webhook::<SqliteDatabase, InMemoryDedupCache>),
                        ),
                    )
                    .route("/paypal/webhook", web::post().to(paypal_webhook::<SqliteDatabase>)),
            )
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}

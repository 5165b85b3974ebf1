use actix_web::{dev::Server, middleware::Logger, web, App, HttpServer};
use log::*;

use disbursement_engine::{
    events::{EventHandlers, EventProducers},
    queue::{start_visa_workers, start_voucher_workers},
    PaymentRunApi,
    SqliteDatabase,
    VisaOrchestrator,
    VoucherOrchestrator,
};
use intersolve::{
    mock::{MockVisaApi, MockVoucherApi},
    IntersolveVisaClient,
    IntersolveVoucherClient,
    VisaApi,
    VoucherApi,
};

use crate::{
    config::{EnvSecrets, ServerConfig},
    errors::ServerError,
    notify,
    reconciliation_worker::start_reconciliation_workers,
    routes,
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let handlers = EventHandlers::new(128, notify::default_hooks());
    let producers = handlers.producers();
    handlers.start_handlers().await;

    if config.use_mock_providers {
        let visa = MockVisaApi::default();
        let voucher = MockVoucherApi::new();
        start_background_workers(&config, db.clone(), visa.clone(), voucher.clone(), producers.clone());
        let srv = create_server_instance(config, db, visa, voucher, producers)?;
        srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
    } else {
        let visa = IntersolveVisaClient::new(config.visa_config.clone())
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        let voucher = IntersolveVoucherClient::new(config.voucher_config.clone())
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        start_background_workers(&config, db.clone(), visa.clone(), voucher.clone(), producers.clone());
        let srv = create_server_instance(config, db, visa, voucher, producers)?;
        srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
    }
}

/// Queue worker pools and reconciliation sweeps. The returned handles run indefinitely and are
/// intentionally detached.
fn start_background_workers<V, W>(
    config: &ServerConfig,
    db: SqliteDatabase,
    visa: V,
    voucher: W,
    producers: EventProducers,
) where
    V: VisaApi + 'static,
    W: VoucherApi + 'static,
{
    let _ = start_visa_workers(db.clone(), visa.clone(), producers.clone(), config.visa_workers);
    let _ = start_voucher_workers(db.clone(), voucher.clone(), EnvSecrets, producers.clone(), config.voucher_workers);
    let _ = start_reconciliation_workers(db, visa, voucher, EnvSecrets, producers, config.sweeps.clone());
    info!("⚙️ Background workers started");
}

pub fn create_server_instance<V, W>(
    config: ServerConfig,
    db: SqliteDatabase,
    visa: V,
    voucher: W,
    producers: EventProducers,
) -> Result<Server, ServerError>
where
    V: VisaApi + 'static,
    W: VoucherApi + 'static,
{
    let srv = HttpServer::new(move || {
        let payment_api = PaymentRunApi::new(db.clone());
        let visa_orchestrator = VisaOrchestrator::new(db.clone(), visa.clone(), producers.clone());
        let voucher_orchestrator = VoucherOrchestrator::new(db.clone(), voucher.clone(), producers.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("dpg::access_log"))
            .app_data(web::Data::new(payment_api))
            .app_data(web::Data::new(visa_orchestrator))
            .app_data(web::Data::new(voucher_orchestrator))
            .configure(configure_routes::<V, W>)
    })
    .bind((config.host.as_str(), config.port))
    .map_err(|e| ServerError::InitializeError(e.to_string()))?
    .run();
    Ok(srv)
}

/// The routing table, shared between the live server and the endpoint tests.
pub fn configure_routes<V, W>(cfg: &mut web::ServiceConfig)
where
    V: VisaApi + 'static,
    W: VoucherApi + 'static,
{
    cfg.service(routes::health)
        .service(
            web::scope("/api")
                .route("/programs/{program_id}/payments", web::post().to(routes::submit_payment_run))
                .route(
                    "/programs/{program_id}/payments/progress",
                    web::get().to(routes::payment_run_progress),
                )
                .route(
                    "/registrations/{reference_id}/transactions",
                    web::get().to(routes::transactions_for_beneficiary),
                )
                .route("/registrations/{reference_id}/wallet", web::get().to(routes::wallet_details::<V>))
                .route(
                    "/registrations/{reference_id}/wallet/reissue",
                    web::put().to(routes::reissue_wallet::<V>),
                )
                .route("/wallets/{token_code}/block", web::put().to(routes::block_wallet::<V>))
                .route("/wallets/{token_code}/unblock", web::put().to(routes::unblock_wallet::<V>))
                .route(
                    "/registrations/{reference_id}/vouchers/{payment_nr}/image",
                    web::get().to(routes::voucher_image::<W>),
                ),
        )
        .service(
            web::scope("/callbacks").route("/message-status", web::post().to(routes::message_status::<W>)),
        );
}

//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module
//! neat and tidy 🙏
//!
//! Since worker threads process their requests sequentially, any long, non-cpu-bound operation
//! (I/O, database calls, provider calls) must be awaited, never blocked on, so that the worker
//! can interleave other requests.
use actix_web::{get, web, HttpResponse, Responder};
use log::*;

use disbursement_engine::{
    db_types::ReferenceId,
    payment_objects::PaymentRunRequest,
    PaymentRunApi,
    SqliteDatabase,
    VisaOrchestrator,
    VoucherOrchestrator,
};
use intersolve::{VisaApi, VoucherApi};

use crate::{
    data_objects::{MessageStatusCallback, PaymentRunResponse, ProgressResponse, ScopeParams},
    errors::ServerError,
    voucher_image::{render_voucher_png, VoucherRenderData},
};

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

/// Route handler for submitting a payment run. Enqueues one job per beneficiary and returns
/// immediately; progress and outcomes are queried separately.
pub async fn submit_payment_run(
    api: web::Data<PaymentRunApi<SqliteDatabase>>,
    path: web::Path<i64>,
    query: web::Query<ScopeParams>,
    body: web::Json<PaymentRunRequest>,
) -> Result<HttpResponse, ServerError> {
    let program_id = path.into_inner();
    let summary = api.submit_payment_run(program_id, body.into_inner(), &query.filter()).await?;
    let response = PaymentRunResponse {
        job_count: summary.job_count,
        skipped: summary.skipped.iter().map(|r| r.to_string()).collect(),
    };
    Ok(HttpResponse::Ok().json(response))
}

pub async fn payment_run_progress(
    api: web::Data<PaymentRunApi<SqliteDatabase>>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ServerError> {
    let program_id = path.into_inner();
    let pending_job_count = api.pending_job_count(program_id).await?;
    Ok(HttpResponse::Ok().json(ProgressResponse { pending_job_count }))
}

pub async fn transactions_for_beneficiary(
    api: web::Data<PaymentRunApi<SqliteDatabase>>,
    path: web::Path<String>,
    query: web::Query<ScopeParams>,
) -> Result<HttpResponse, ServerError> {
    let reference_id = ReferenceId::from(path.into_inner());
    let transactions = api.transactions_for_beneficiary(&reference_id, &query.filter()).await?;
    Ok(HttpResponse::Ok().json(transactions))
}

/// Route handler for the wallet details endpoint. Balances and statuses are refreshed from the
/// provider before they are returned.
pub async fn wallet_details<V: VisaApi + 'static>(
    orchestrator: web::Data<VisaOrchestrator<SqliteDatabase, V>>,
    path: web::Path<String>,
    query: web::Query<ScopeParams>,
) -> Result<HttpResponse, ServerError> {
    let reference_id = ReferenceId::from(path.into_inner());
    let wallets = orchestrator.wallet_details(&reference_id, &query.filter()).await?;
    Ok(HttpResponse::Ok().json(wallets))
}

pub async fn block_wallet<V: VisaApi + 'static>(
    orchestrator: web::Data<VisaOrchestrator<SqliteDatabase, V>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    toggle_block(orchestrator, path.into_inner(), true).await
}

pub async fn unblock_wallet<V: VisaApi + 'static>(
    orchestrator: web::Data<VisaOrchestrator<SqliteDatabase, V>>,
    path: web::Path<String>,
) -> Result<HttpResponse, ServerError> {
    toggle_block(orchestrator, path.into_inner(), false).await
}

async fn toggle_block<V: VisaApi + 'static>(
    orchestrator: web::Data<VisaOrchestrator<SqliteDatabase, V>>,
    token_code: String,
    block: bool,
) -> Result<HttpResponse, ServerError> {
    let wallet = orchestrator.toggle_block_wallet(&token_code, block).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "tokenCode": wallet.token_code,
        "blocked": wallet.token_blocked,
        "status": wallet.status.to_string(),
    })))
}

/// Route handler for replacing a beneficiary's wallet and card. Synchronous: the caller waits
/// for the full compensating sequence to finish.
pub async fn reissue_wallet<V: VisaApi + 'static>(
    orchestrator: web::Data<VisaOrchestrator<SqliteDatabase, V>>,
    path: web::Path<String>,
    query: web::Query<ScopeParams>,
) -> Result<HttpResponse, ServerError> {
    let reference_id = ReferenceId::from(path.into_inner());
    orchestrator.reissue_wallet_and_card(&reference_id, &query.filter()).await?;
    Ok(HttpResponse::Ok().json(crate::data_objects::JsonResponse::success("Wallet and card reissued")))
}

/// Route handler for the voucher image export. The PNG is rendered deterministically from
/// stored fields; no provider call is made.
pub async fn voucher_image<W: VoucherApi + 'static>(
    orchestrator: web::Data<VoucherOrchestrator<SqliteDatabase, W>>,
    path: web::Path<(String, i64)>,
    query: web::Query<ScopeParams>,
) -> Result<HttpResponse, ServerError> {
    let (reference_id, payment_nr) = path.into_inner();
    let reference_id = ReferenceId::from(reference_id);
    let voucher = orchestrator.voucher_for_export(&reference_id, payment_nr, &query.filter()).await?;
    let image = render_voucher_png(&VoucherRenderData {
        barcode: voucher.barcode,
        pin: voucher.pin,
        amount: voucher.amount,
    })?;
    Ok(HttpResponse::Ok().content_type("image/png").body(image))
}

/// Route handler for delivery receipts from the message channel. Interim statuses are
/// acknowledged without touching the ledger.
pub async fn message_status<W: VoucherApi + 'static>(
    orchestrator: web::Data<VoucherOrchestrator<SqliteDatabase, W>>,
    body: web::Json<MessageStatusCallback>,
) -> Result<HttpResponse, ServerError> {
    let callback = body.into_inner();
    let Some(delivered) = callback.message_status.delivery_outcome() else {
        trace!("💻️ Interim delivery status for {}; no update needed", callback.message_ref);
        return Ok(HttpResponse::Ok().finish());
    };
    let channel_error = callback.channel_error();
    orchestrator
        .process_message_status(&callback.message_ref, delivered, channel_error.as_deref())
        .await?;
    Ok(HttpResponse::Ok().finish())
}

use std::time::Duration;

use intersolve::{VisaApi, VoucherApi, VoucherCredentials};
use log::*;
use tokio::task::JoinHandle;

use crate::{
    db_types::{Fsp, JobStatus, NewTransaction, PaymentJob, Registration, TransactionStatus},
    dpg_api::{errors::OrchestrationError, visa_orchestrator::VisaOrchestrator, voucher_orchestrator::VoucherOrchestrator},
    events::EventProducers,
    traits::{DisbursementDatabase, SecretsProvider},
};

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Number of concurrent worker slots for this provider family.
    pub concurrency: usize,
    /// How long an idle worker sleeps before polling the queue again.
    pub poll_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { concurrency: 4, poll_interval: Duration::from_millis(500) }
    }
}

/// Starts the Visa worker pool. Do not await the returned handles, they run indefinitely.
pub fn start_visa_workers<B, V>(
    db: B,
    api: V,
    producers: EventProducers,
    config: WorkerConfig,
) -> Vec<JoinHandle<()>>
where
    B: DisbursementDatabase + 'static,
    V: VisaApi + 'static,
{
    (0..config.concurrency)
        .map(|slot| {
            let db = db.clone();
            let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), producers.clone());
            tokio::spawn(async move {
                info!("⚙️ Visa payment worker {slot} started");
                loop {
                    match db.claim_next_job(&[Fsp::IntersolveVisa]).await {
                        Ok(Some(job)) => process_visa_job(&db, &orchestrator, job).await,
                        Ok(None) => tokio::time::sleep(config.poll_interval).await,
                        Err(e) => {
                            error!("⚙️ Visa worker {slot} could not poll the queue: {e}");
                            tokio::time::sleep(config.poll_interval).await;
                        },
                    }
                }
            })
        })
        .collect()
}

/// Starts the voucher worker pool. Credentials are resolved per job at pickup time.
pub fn start_voucher_workers<B, V, S>(
    db: B,
    api: V,
    secrets: S,
    producers: EventProducers,
    config: WorkerConfig,
) -> Vec<JoinHandle<()>>
where
    B: DisbursementDatabase + 'static,
    V: VoucherApi + 'static,
    S: SecretsProvider + 'static,
{
    (0..config.concurrency)
        .map(|slot| {
            let db = db.clone();
            let secrets = secrets.clone();
            let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), producers.clone());
            tokio::spawn(async move {
                info!("⚙️ Voucher payment worker {slot} started");
                loop {
                    match db.claim_next_job(Fsp::voucher_family()).await {
                        Ok(Some(job)) => process_voucher_job(&db, &orchestrator, &secrets, job).await,
                        Ok(None) => tokio::time::sleep(config.poll_interval).await,
                        Err(e) => {
                            error!("⚙️ Voucher worker {slot} could not poll the queue: {e}");
                            tokio::time::sleep(config.poll_interval).await;
                        },
                    }
                }
            })
        })
        .collect()
}

async fn process_visa_job<B, V>(db: &B, orchestrator: &VisaOrchestrator<B, V>, job: PaymentJob)
where
    B: DisbursementDatabase,
    V: VisaApi,
{
    let Some(registration) = load_registration(db, &job).await else {
        return;
    };
    match orchestrator.pay_beneficiary(&registration, job.payment_nr, job.amount).await {
        Ok(_) => finish_job(db, &job).await,
        Err(e) => handle_job_failure(db, &job, &registration, e).await,
    }
}

async fn process_voucher_job<B, V, S>(
    db: &B,
    orchestrator: &VoucherOrchestrator<B, V>,
    secrets: &S,
    job: PaymentJob,
) where
    B: DisbursementDatabase,
    V: VoucherApi,
    S: SecretsProvider,
{
    let Some(registration) = load_registration(db, &job).await else {
        return;
    };
    // Missing configuration is handled inside the orchestrator: it records an Error transaction
    // rather than crashing the job, so operators see the outcome in the ledger.
    let credentials = secrets.voucher_credentials(job.program_id).unwrap_or_else(|e| {
        warn!("⚙️ No voucher credentials for program {}: {e}", job.program_id);
        VoucherCredentials::default()
    });
    match orchestrator.pay_beneficiary(&registration, job.payment_nr, job.amount, &credentials).await {
        Ok(_) => finish_job(db, &job).await,
        Err(e) => handle_job_failure(db, &job, &registration, e).await,
    }
}

async fn load_registration<B: DisbursementDatabase>(db: &B, job: &PaymentJob) -> Option<Registration> {
    match db.fetch_registration_by_id(job.registration_id).await {
        Ok(Some(registration)) => Some(registration),
        Ok(None) => {
            // Should be impossible while payments are in flight; record it rather than retry.
            let message = format!("Registration #{} no longer exists", job.registration_id);
            error!("⚙️ Job #{} is unprocessable: {message}", job.id);
            if let Err(e) = db.complete_job(job.id, JobStatus::Failed, Some(&message)).await {
                error!("⚙️ Could not mark job #{} as failed: {e}", job.id);
            }
            None
        },
        Err(e) => {
            warn!("⚙️ Could not load registration for job #{}: {e}", job.id);
            requeue_or_fail(db, job, &e.to_string(), None).await;
            None
        },
    }
}

async fn finish_job<B: DisbursementDatabase>(db: &B, job: &PaymentJob) {
    if let Err(e) = db.complete_job(job.id, JobStatus::Succeeded, None).await {
        error!("⚙️ Could not mark job #{} as finished: {e}", job.id);
    }
}

/// A thrown job is retried until its attempt budget runs out; after that it is recorded as a
/// permanently failed transaction so the outcome is never silently dropped.
async fn handle_job_failure<B: DisbursementDatabase>(
    db: &B,
    job: &PaymentJob,
    registration: &Registration,
    error: OrchestrationError,
) {
    if !error.is_retryable() {
        // Non-retryable orchestration errors (bad configuration, missing attributes) would fail
        // identically on every attempt.
        warn!("⚙️ Job #{} failed terminally: {error}", job.id);
        fail_terminally(db, job, &error.to_string(), Some(registration)).await;
        return;
    }
    debug!("⚙️ Job #{} attempt {}/{} failed: {error}", job.id, job.attempts, job.max_attempts);
    requeue_or_fail(db, job, &error.to_string(), Some(registration)).await;
}

async fn requeue_or_fail<B: DisbursementDatabase>(
    db: &B,
    job: &PaymentJob,
    message: &str,
    registration: Option<&Registration>,
) {
    if job.attempts_exhausted() {
        warn!("⚙️ Job #{} failed after {} attempts: {message}", job.id, job.attempts);
        fail_terminally(db, job, message, registration).await;
    } else if let Err(e) = db.release_job(job.id, message).await {
        error!("⚙️ Could not requeue job #{}: {e}", job.id);
    }
}

async fn fail_terminally<B: DisbursementDatabase>(
    db: &B,
    job: &PaymentJob,
    message: &str,
    registration: Option<&Registration>,
) {
    if let Some(registration) = registration {
        let transaction =
            NewTransaction::new(registration, job.payment_nr, job.amount, TransactionStatus::Error)
                .with_error_message(message.to_string());
        if let Err(e) = db.insert_transaction(transaction).await {
            error!("⚙️ No ledger entry could be written for failed job #{}: {e}", job.id);
        }
    }
    if let Err(e) = db.complete_job(job.id, JobStatus::Failed, Some(message)).await {
        error!("⚙️ Could not mark job #{} as failed: {e}", job.id);
    }
}

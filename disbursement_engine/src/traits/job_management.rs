use std::future::Future;

use crate::{
    db_types::{Fsp, JobStatus, NewPaymentJob, PaymentJob},
    traits::StorageError,
};

/// The durable payment job queue.
///
/// Jobs live in the database so that a crashed worker's job can be picked up fresh by any other
/// worker or instance with full context. The queue tolerates redelivery: job processing is
/// idempotent at the orchestrator level, and enqueueing is idempotent here.
pub trait JobManagement: Clone {
    /// Enqueue one job. Idempotent on (program, payment cycle, registration): a live job is
    /// returned with `false`, a terminally finished one is re-queued with a fresh attempt budget.
    fn enqueue_job(
        &self,
        job: NewPaymentJob,
    ) -> impl Future<Output = Result<(PaymentJob, bool), StorageError>> + Send;

    /// Atomically claim the oldest queued job for one of the given providers, marking it Running
    /// and counting the attempt. Returns `None` when the queue is empty.
    fn claim_next_job(
        &self,
        fsps: &[Fsp],
    ) -> impl Future<Output = Result<Option<PaymentJob>, StorageError>> + Send;

    /// Put a failed job back in the queue for another attempt.
    fn release_job(
        &self,
        id: i64,
        error: &str,
    ) -> impl Future<Output = Result<PaymentJob, StorageError>> + Send;

    /// Terminally finish a job.
    fn complete_job(
        &self,
        id: i64,
        status: JobStatus,
        error: Option<&str>,
    ) -> impl Future<Output = Result<PaymentJob, StorageError>> + Send;

    /// Queued + running jobs for a program. Drives the progress bar; must not block processing.
    fn pending_job_count(&self, program_id: i64) -> impl Future<Output = Result<i64, StorageError>> + Send;
}

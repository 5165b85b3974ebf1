use log::{debug, trace};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Fsp, JobStatus, NewPaymentJob, PaymentJob},
    traits::StorageError,
};

/// Enqueues the job, returning `false` in the second parameter when a live job for this
/// (program, payment cycle, registration) already exists. A job in a terminal state is re-queued
/// with a fresh attempt budget instead, which is how operators retry failed payments; the
/// orchestrators detect already-disbursed cycles and make the re-run a no-op.
pub async fn idempotent_enqueue(
    job: NewPaymentJob,
    conn: &mut SqliteConnection,
) -> Result<(PaymentJob, bool), StorageError> {
    let existing: Option<PaymentJob> = sqlx::query_as(
        "SELECT * FROM payment_jobs WHERE program_id = $1 AND payment_nr = $2 AND registration_id = $3",
    )
    .bind(job.program_id)
    .bind(job.payment_nr)
    .bind(job.registration_id)
    .fetch_optional(&mut *conn)
    .await?;
    if let Some(existing) = existing {
        if matches!(existing.status, JobStatus::Queued | JobStatus::Running) {
            return Ok((existing, false));
        }
        let requeued: PaymentJob = sqlx::query_as(
            "UPDATE payment_jobs SET status = 'Queued', attempts = 0, amount = $1, last_error = NULL, \
             updated_at = CURRENT_TIMESTAMP WHERE id = $2 RETURNING *",
        )
        .bind(job.amount)
        .bind(existing.id)
        .fetch_one(conn)
        .await?;
        debug!("🗃️ Job #{} re-queued for another run", requeued.id);
        return Ok((requeued, true));
    }
    let NewPaymentJob { program_id, payment_nr, registration_id, fsp, amount, max_attempts } = job;
    let job: PaymentJob = sqlx::query_as(
        r#"
            INSERT INTO payment_jobs (program_id, payment_nr, registration_id, fsp, amount, max_attempts)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(program_id)
    .bind(payment_nr)
    .bind(registration_id)
    .bind(fsp.to_string())
    .bind(amount)
    .bind(max_attempts)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Job #{} queued for registration #{registration_id} payment {payment_nr}", job.id);
    Ok((job, true))
}

/// Claims the oldest queued job for one of the given providers in a single atomic statement, so
/// concurrent workers never claim the same job twice.
pub async fn claim_next_job(
    fsps: &[Fsp],
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentJob>, StorageError> {
    if fsps.is_empty() {
        return Ok(None);
    }
    let fsp_list = fsps.iter().map(|f| format!("'{f}'")).collect::<Vec<String>>().join(",");
    let sql = format!(
        "UPDATE payment_jobs SET status = 'Running', attempts = attempts + 1, updated_at = CURRENT_TIMESTAMP \
         WHERE id = (SELECT id FROM payment_jobs WHERE status = 'Queued' AND fsp IN ({fsp_list}) ORDER BY id \
         LIMIT 1) RETURNING *;"
    );
    trace!("🗃️ Executing query: {sql}");
    let job: Option<PaymentJob> = sqlx::query_as(&sql).fetch_optional(conn).await?;
    Ok(job)
}

pub async fn release_job(id: i64, error: &str, conn: &mut SqliteConnection) -> Result<PaymentJob, StorageError> {
    let job: Option<PaymentJob> = sqlx::query_as(
        "UPDATE payment_jobs SET status = 'Queued', last_error = $1, updated_at = CURRENT_TIMESTAMP WHERE id = \
         $2 RETURNING *",
    )
    .bind(error)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    job.ok_or(StorageError::JobNotFound(id))
}

pub async fn complete_job(
    id: i64,
    status: JobStatus,
    error: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<PaymentJob, StorageError> {
    let job: Option<PaymentJob> = sqlx::query_as(
        "UPDATE payment_jobs SET status = $1, last_error = $2, updated_at = CURRENT_TIMESTAMP WHERE id = $3 \
         RETURNING *",
    )
    .bind(status.to_string())
    .bind(error)
    .bind(id)
    .fetch_optional(conn)
    .await?;
    job.ok_or(StorageError::JobNotFound(id))
}

/// Queued + running jobs for the program. A single indexed count, safe to call while workers are
/// processing.
pub async fn pending_job_count(program_id: i64, conn: &mut SqliteConnection) -> Result<i64, StorageError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM payment_jobs WHERE program_id = $1 AND status IN ('Queued', 'Running')",
    )
    .bind(program_id)
    .fetch_one(conn)
    .await?;
    Ok(count)
}

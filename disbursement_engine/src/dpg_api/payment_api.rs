use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewPaymentJob, ReferenceId, Transaction},
    dpg_api::{
        errors::OrchestrationError,
        payment_objects::{PaymentRunRequest, PaymentRunSummary, DEFAULT_MAX_JOB_ATTEMPTS},
    },
    scope::ScopeFilter,
    traits::DisbursementDatabase,
};

/// `PaymentRunApi` is the submission side of the payment pipeline: it fans a payment run out
/// into one queued job per beneficiary and answers progress and ledger queries. Per-beneficiary
/// processing happens in the queue workers, never here, so submission returns immediately.
pub struct PaymentRunApi<B> {
    db: B,
}

impl<B> Debug for PaymentRunApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentRunApi")
    }
}

impl<B> PaymentRunApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> PaymentRunApi<B>
where B: DisbursementDatabase
{
    /// Queue one payment job per beneficiary for the given cycle. The per-beneficiary amount is
    /// the run's transfer amount scaled by the registration's multiplier. Unknown, out-of-scope
    /// and wrong-program reference ids are skipped and reported, not failed.
    pub async fn submit_payment_run(
        &self,
        program_id: i64,
        request: PaymentRunRequest,
        scope: &ScopeFilter,
    ) -> Result<PaymentRunSummary, OrchestrationError> {
        let mut job_count = 0;
        let mut skipped = Vec::new();
        for reference_id in &request.reference_ids {
            let Some(registration) = self.db.fetch_registration(reference_id, scope).await? else {
                warn!("💸️ Skipping [{reference_id}]: no registration within scope");
                skipped.push(reference_id.clone());
                continue;
            };
            if registration.program_id != program_id {
                warn!("💸️ Skipping [{reference_id}]: registered to program {}", registration.program_id);
                skipped.push(reference_id.clone());
                continue;
            }
            let amount = request.transfer_amount * registration.payment_amount_multiplier;
            let job = NewPaymentJob {
                program_id,
                payment_nr: request.payment_nr,
                registration_id: registration.id,
                fsp: registration.fsp,
                amount,
                max_attempts: DEFAULT_MAX_JOB_ATTEMPTS,
            };
            let (_, queued) = self.db.enqueue_job(job).await?;
            if queued {
                job_count += 1;
            } else {
                debug!("💸️ [{reference_id}] is already queued for payment {}", request.payment_nr);
            }
        }
        info!(
            "💸️ Payment run {} for program {program_id}: {job_count} jobs queued, {} skipped",
            request.payment_nr,
            skipped.len()
        );
        Ok(PaymentRunSummary { job_count, skipped })
    }

    /// Queued + in-flight jobs for the program, for the progress bar.
    pub async fn pending_job_count(&self, program_id: i64) -> Result<i64, OrchestrationError> {
        Ok(self.db.pending_job_count(program_id).await?)
    }

    /// The beneficiary's ledger, newest first.
    pub async fn transactions_for_beneficiary(
        &self,
        reference_id: &ReferenceId,
        scope: &ScopeFilter,
    ) -> Result<Vec<Transaction>, OrchestrationError> {
        let registration = self
            .db
            .fetch_registration(reference_id, scope)
            .await?
            .ok_or_else(|| OrchestrationError::RegistrationNotFound(reference_id.clone()))?;
        Ok(self.db.transactions_for_registration(registration.id).await?)
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

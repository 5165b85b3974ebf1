use std::fmt::Debug;

use chrono::{Duration, Utc};
use dpg_common::Money;
use intersolve::{
    helpers::{random_ref_pos, random_reference},
    VoucherApi,
    VoucherCredentials,
};
use log::*;

use crate::{
    db_types::{
        Fsp,
        NewTransaction,
        NewVoucher,
        NewVoucherIssueRequest,
        ReferenceId,
        Registration,
        Transaction,
        TransactionStatus,
        Voucher,
    },
    dpg_api::errors::OrchestrationError,
    events::{template_keys, EventProducers, MessageRequestEvent, PaymentCompletedEvent},
    scope::ScopeFilter,
    traits::{DisbursementDatabase, SecretsProvider, VoucherUpdate},
};

/// `VoucherOrchestrator` issues barcode+PIN vouchers and runs the reconciliation sweeps that
/// keep local voucher bookkeeping aligned with the provider.
///
/// The instrument state machine is deliberately small: a voucher either exists or it doesn't,
/// and an existing voucher is reusable for retry until it has been claimed (`send`). WhatsApp
/// delivery adds a second step: the transaction stays `Waiting` until the delivery receipt
/// arrives.
pub struct VoucherOrchestrator<B, V> {
    db: B,
    api: V,
    producers: EventProducers,
}

impl<B, V> Debug for VoucherOrchestrator<B, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VoucherOrchestrator")
    }
}

impl<B, V> VoucherOrchestrator<B, V> {
    pub fn new(db: B, api: V, producers: EventProducers) -> Self {
        Self { db, api, producers }
    }
}

impl<B, V> VoucherOrchestrator<B, V>
where
    B: DisbursementDatabase,
    V: VoucherApi,
{
    /// Disburse one voucher payment to one beneficiary.
    ///
    /// Returns `Ok(None)` when the job must be skipped without a ledger entry (a claimed voucher
    /// already exists for this cycle — a route that should never happen under normal operation).
    /// Transport failures surface as `Err` so the queue re-delivers the job.
    pub async fn pay_beneficiary(
        &self,
        registration: &Registration,
        payment_nr: i64,
        amount: Money,
        credentials: &VoucherCredentials,
    ) -> Result<Option<Transaction>, OrchestrationError> {
        if !registration.fsp.is_voucher() {
            return Err(OrchestrationError::WrongProvider(registration.reference_id.clone(), registration.fsp));
        }
        if let Some(existing) = self.db.latest_transaction(registration.id, payment_nr).await? {
            if existing.status != TransactionStatus::Error {
                debug!(
                    "🎟️ Payment {payment_nr} for [{}] already has a {} transaction; skipping re-delivered job",
                    registration.reference_id, existing.status
                );
                return Ok(Some(existing));
            }
        }
        if !credentials.is_complete() {
            let message = "Creating voucher failed. Error retrieving provider credentials".to_string();
            warn!("🎟️ {message} (program {})", registration.program_id);
            let transaction = self
                .db
                .insert_transaction(
                    NewTransaction::new(registration, payment_nr, amount, TransactionStatus::Error)
                        .with_error_message(message),
                )
                .await?;
            self.publish_completion(registration, &transaction).await;
            return Ok(Some(transaction));
        }

        match self.db.fetch_voucher(registration.id, payment_nr).await? {
            Some(voucher) if voucher.send => {
                // This route should never happen: the short-circuit above catches normal
                // redelivery. Abort without creating a duplicate.
                warn!(
                    "🎟️ Cannot submit payment {payment_nr} for [{}]: a claimed voucher already exists for this \
                     cycle",
                    registration.reference_id
                );
                return Ok(None);
            },
            Some(voucher) => {
                debug!(
                    "🎟️ Reusing unclaimed voucher [{}] for [{}] payment {payment_nr}",
                    voucher.barcode, registration.reference_id
                );
            },
            None => match self.issue_new_voucher(registration, payment_nr, amount, credentials).await? {
                Ok(voucher) => {
                    info!(
                        "🎟️ Voucher [{}] of {amount} issued for [{}] payment {payment_nr}",
                        voucher.barcode, registration.reference_id
                    );
                },
                Err(message) => {
                    warn!("🎟️ Payment {payment_nr} for [{}] failed: {message}", registration.reference_id);
                    let transaction = self
                        .db
                        .insert_transaction(
                            NewTransaction::new(registration, payment_nr, amount, TransactionStatus::Error)
                                .with_error_message(message),
                        )
                        .await?;
                    self.publish_completion(registration, &transaction).await;
                    return Ok(Some(transaction));
                },
            },
        }

        let transaction = match registration.fsp {
            // The voucher counts as delivered only once the message delivery receipt arrives.
            Fsp::IntersolveVoucherWhatsapp => {
                let message_ref = random_reference();
                self.publish_message(MessageRequestEvent {
                    registration_id: registration.id,
                    reference_id: registration.reference_id.clone(),
                    template_key: template_keys::WHATSAPP_PAYMENT.to_string(),
                    dynamic_params: vec![amount.major_units().to_string()],
                    message_ref: Some(message_ref.clone()),
                })
                .await;
                self.db
                    .insert_transaction(
                        NewTransaction::new(registration, payment_nr, amount, TransactionStatus::Waiting)
                            .with_message_ref(message_ref),
                    )
                    .await?
            },
            _ => {
                self.db
                    .insert_transaction(NewTransaction::new(registration, payment_nr, amount, TransactionStatus::Success))
                    .await?
            },
        };
        self.publish_completion(registration, &transaction).await;
        Ok(Some(transaction))
    }

    /// Calls the provider and persists the voucher. Returns `Ok(Err(message))` for terminal
    /// provider rejections, after marking the attempt for cancellation with whichever identifier
    /// the provider returned.
    async fn issue_new_voucher(
        &self,
        registration: &Registration,
        payment_nr: i64,
        amount: Money,
        credentials: &VoucherCredentials,
    ) -> Result<Result<Voucher, String>, OrchestrationError> {
        let ref_pos = random_ref_pos();
        let response = match self.api.issue_voucher(amount, ref_pos, credentials).await {
            Ok(response) => response,
            Err(e) if e.is_retryable() => {
                // The call may or may not have taken effect; the cancellation sweep can retire
                // the attempt by its ref_pos if it did.
                self.db
                    .insert_issue_request(NewVoucherIssueRequest {
                        program_id: registration.program_id,
                        ref_pos,
                        card_id: None,
                        transaction_id: None,
                        to_cancel: true,
                    })
                    .await?;
                return Err(OrchestrationError::ProviderUnavailable(format!("ISSUE VOUCHER ERROR: {e}")));
            },
            Err(e) => {
                self.db
                    .insert_issue_request(NewVoucherIssueRequest {
                        program_id: registration.program_id,
                        ref_pos,
                        card_id: None,
                        transaction_id: None,
                        to_cancel: true,
                    })
                    .await?;
                return Ok(Err(format!("ISSUE VOUCHER ERROR: {e}")));
            },
        };
        if !response.is_ok() {
            self.db
                .insert_issue_request(NewVoucherIssueRequest {
                    program_id: registration.program_id,
                    ref_pos,
                    card_id: response.card_id.clone(),
                    transaction_id: response.transaction_id.clone(),
                    to_cancel: true,
                })
                .await?;
            let message = format!(
                "Creating voucher failed. Status code: {:?} message: {}",
                response.result_code,
                response.result_description.as_deref().unwrap_or("unknown")
            );
            return Ok(Err(message));
        }
        let (Some(barcode), Some(pin)) = (response.card_id.clone(), response.pin.clone()) else {
            error!(
                "🚨️ Provider reported success for ref_pos {ref_pos} but omitted the card id or PIN. This is a \
                 bug signal, not a rejection."
            );
            self.db
                .insert_issue_request(NewVoucherIssueRequest {
                    program_id: registration.program_id,
                    ref_pos,
                    card_id: response.card_id,
                    transaction_id: response.transaction_id,
                    to_cancel: true,
                })
                .await?;
            return Ok(Err("ISSUE VOUCHER ERROR: provider response was missing the card id or PIN".to_string()));
        };
        let whatsapp_phone_number = match registration.fsp {
            Fsp::IntersolveVoucherWhatsapp => {
                registration.payment_address.clone().or_else(|| registration.phone_number.clone())
            },
            _ => None,
        };
        let voucher = self
            .db
            .insert_voucher(NewVoucher {
                registration_id: registration.id,
                payment_nr,
                barcode,
                pin,
                amount,
                whatsapp_phone_number,
            })
            .await?;
        Ok(Ok(voucher))
    }

    /// Feed a message-delivery receipt back into the ledger. A confirmed delivery claims the
    /// voucher; a failed delivery records the channel error. Receipts for unknown or already
    /// resolved references are no-ops.
    pub async fn process_message_status(
        &self,
        message_ref: &str,
        delivered: bool,
        channel_error: Option<&str>,
    ) -> Result<Option<Transaction>, OrchestrationError> {
        let status = if delivered { TransactionStatus::Success } else { TransactionStatus::Error };
        let error_message = channel_error
            .map(|e| format!("Voucher(s) created, but something went wrong in sending voucher.\n{e}"));
        let Some(transaction) =
            self.db.resolve_waiting_transaction(message_ref, status, error_message.as_deref()).await?
        else {
            debug!("🎟️ Delivery receipt for unknown or resolved message_ref {message_ref}; ignoring");
            return Ok(None);
        };
        if delivered {
            if let Some(voucher) = self.db.fetch_voucher(transaction.registration_id, transaction.payment_nr).await? {
                self.db.update_voucher(voucher.id, VoucherUpdate::claimed()).await?;
                debug!("🎟️ Voucher [{}] claimed after confirmed delivery", voucher.barcode);
            }
        }
        if let Some(registration) = self.db.fetch_registration_by_id(transaction.registration_id).await? {
            self.publish_completion(&registration, &transaction).await;
        }
        Ok(Some(transaction))
    }

    /// The stored voucher for rendering/export. No provider call; the render is deterministic
    /// from stored fields.
    pub async fn voucher_for_export(
        &self,
        reference_id: &ReferenceId,
        payment_nr: i64,
        scope: &ScopeFilter,
    ) -> Result<Voucher, OrchestrationError> {
        let registration = self
            .db
            .fetch_registration(reference_id, scope)
            .await?
            .ok_or_else(|| OrchestrationError::RegistrationNotFound(reference_id.clone()))?;
        self.db
            .fetch_voucher(registration.id, payment_nr)
            .await?
            .ok_or(OrchestrationError::VoucherNotFound)
    }

    //------------------------------------  Reconciliation sweeps  ---------------------------------------------------

    /// Retire issue attempts marked for cancellation, so funds are not stranded in a voucher
    /// nobody received. Safe to re-run: retired rows leave the pending set.
    pub async fn cancel_stuck_issuances<S: SecretsProvider>(
        &self,
        secrets: &S,
    ) -> Result<u64, OrchestrationError> {
        let pending = self.db.pending_cancellations().await?;
        let mut cancelled = 0u64;
        for request in pending {
            let credentials = match secrets.voucher_credentials(request.program_id) {
                Ok(credentials) => credentials,
                Err(e) => {
                    warn!("🕰️ Skipping cancellation #{}: {e}", request.id);
                    continue;
                },
            };
            let result = match (&request.card_id, &request.transaction_id) {
                (Some(card_id), Some(transaction_id)) => {
                    self.api.cancel(card_id, transaction_id, &credentials).await
                },
                _ => self.api.cancel_by_ref_pos(request.ref_pos, &credentials).await,
            };
            match result {
                Ok(()) => {
                    self.db.mark_cancellation_done(request.id).await?;
                    cancelled += 1;
                },
                Err(e) => warn!("🕰️ Could not cancel issue request #{}: {e}", request.id),
            }
        }
        Ok(cancelled)
    }

    /// Re-query provider balances for not-yet-spent vouchers in fixed-size id batches, and flip
    /// `balance_used` (and `send`) the first time the observed balance diverges from the issue
    /// amount. This is how in-person spending reaches the books. Returns the number of vouchers
    /// newly detected as spent.
    pub async fn refresh_voucher_balances<S: SecretsProvider>(
        &self,
        secrets: &S,
        batch_size: i64,
    ) -> Result<u64, OrchestrationError> {
        let Some(max_id) = self.db.max_voucher_id().await? else {
            return Ok(0);
        };
        let mut detected_spent = 0u64;
        let mut id = 1;
        while id <= max_id {
            let batch = self.db.unused_vouchers_in_id_range(id, id + batch_size - 1).await?;
            for sweep in batch {
                let voucher = sweep.voucher;
                let credentials = match secrets.voucher_credentials(sweep.program_id) {
                    Ok(credentials) => credentials,
                    Err(e) => {
                        warn!("🕰️ Skipping balance check for voucher [{}]: {e}", voucher.barcode);
                        continue;
                    },
                };
                let balance = match self.api.get_balance(&voucher.barcode, &voucher.pin, &credentials).await {
                    Ok(balance) => balance,
                    Err(e) => {
                        warn!("🕰️ Could not fetch balance for voucher [{}]: {e}", voucher.barcode);
                        continue;
                    },
                };
                let mut update = VoucherUpdate {
                    last_requested_balance: Some(balance),
                    balance_checked_at: Some(Utc::now()),
                    ..Default::default()
                };
                if balance != voucher.amount {
                    update.balance_used = Some(true);
                    update.send = Some(true);
                    detected_spent += 1;
                    debug!(
                        "🕰️ Voucher [{}] spent: issued {} but provider reports {balance}",
                        voucher.barcode, voucher.amount
                    );
                }
                self.db.update_voucher(voucher.id, update).await?;
            }
            id += batch_size;
        }
        Ok(detected_spent)
    }

    /// Remind beneficiaries about WhatsApp vouchers that were never claimed, up to a bounded
    /// number of reminders per voucher.
    pub async fn send_reminders(
        &self,
        unclaimed_after: Duration,
        max_reminders: i64,
    ) -> Result<u64, OrchestrationError> {
        let due = self.db.vouchers_needing_reminder(unclaimed_after, max_reminders).await?;
        let mut sent = 0u64;
        for sweep in due {
            let voucher = sweep.voucher;
            let Some(registration) = self.db.fetch_registration_by_id(voucher.registration_id).await? else {
                continue;
            };
            self.publish_message(MessageRequestEvent {
                registration_id: registration.id,
                reference_id: registration.reference_id.clone(),
                template_key: template_keys::WHATSAPP_PAYMENT_REMINDER.to_string(),
                dynamic_params: vec![voucher.amount.major_units().to_string()],
                message_ref: None,
            })
            .await;
            let update = VoucherUpdate { reminder_count: Some(voucher.reminder_count + 1), ..Default::default() };
            self.db.update_voucher(voucher.id, update).await?;
            sent += 1;
        }
        Ok(sent)
    }

    async fn publish_completion(&self, registration: &Registration, transaction: &Transaction) {
        let event = PaymentCompletedEvent {
            reference_id: registration.reference_id.clone(),
            transaction: transaction.clone(),
        };
        for producer in &self.producers.payment_completed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    async fn publish_message(&self, event: MessageRequestEvent) {
        for producer in &self.producers.message_request_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut B {
        &mut self.db
    }
}

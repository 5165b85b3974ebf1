use std::fmt::Debug;

use dpg_common::Money;
use intersolve::{IntersolveError, VisaApi};
use log::*;

use crate::{
    db_types::{
        Fsp,
        NewTransaction,
        NewVisaWallet,
        ReferenceId,
        Registration,
        Transaction,
        TransactionStatus,
        VisaCustomer,
        VisaWallet,
        WalletStatus,
    },
    dpg_api::{
        errors::OrchestrationError,
        payment_objects::{VisaPaymentDetails, WalletDetailsView},
    },
    events::{template_keys, CompensationFailedAlert, EventProducers, MessageRequestEvent, PaymentCompletedEvent},
    scope::ScopeFilter,
    traits::{DisbursementDatabase, WalletUpdate},
};

/// The outcome of the provisioning chain for one invocation: either the beneficiary ended up
/// funded (with zero or more notifications to send), or a step was rejected terminally.
enum ChainOutcome {
    Funded(Vec<MessageRequestEvent>),
    Failed(String),
}

/// Formats a step failure and decides its fate: transport failures bubble up so the queue can
/// retry, provider rejections terminate the chain with an operator-facing message.
fn classify(step: &str, e: IntersolveError) -> Result<String, OrchestrationError> {
    let message = format!("{step} ERROR: {e}");
    if e.is_retryable() {
        return Err(OrchestrationError::ProviderUnavailable(message));
    }
    if matches!(e, IntersolveError::UnexpectedResponse(_)) {
        error!("🚨️ Provider response was malformed; this is a bug signal, not a rejection: {message}");
    }
    Ok(message)
}

/// `VisaOrchestrator` drives a beneficiary's debit-card instrument through its provisioning
/// chain (customer → wallet → link → card) and loads payment funds, one payment job at a time.
///
/// Every milestone is persisted immediately after the corresponding remote call succeeds, so a
/// crashed or retried job resumes at the first incomplete step instead of repeating remote
/// actions that already took effect.
pub struct VisaOrchestrator<B, V> {
    db: B,
    api: V,
    producers: EventProducers,
}

impl<B, V> Debug for VisaOrchestrator<B, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VisaOrchestrator")
    }
}

impl<B, V> VisaOrchestrator<B, V> {
    pub fn new(db: B, api: V, producers: EventProducers) -> Self {
        Self { db, api, producers }
    }
}

impl<B, V> VisaOrchestrator<B, V>
where
    B: DisbursementDatabase,
    V: VisaApi,
{
    /// Disburse one payment to one beneficiary, producing exactly one ledger entry.
    ///
    /// Provider rejections are recorded as an Error transaction and returned as `Ok`; only
    /// retryable transport failures (and storage failures) surface as `Err`, which tells the
    /// queue to re-deliver the job.
    pub async fn pay_beneficiary(
        &self,
        registration: &Registration,
        payment_nr: i64,
        amount: Money,
    ) -> Result<Transaction, OrchestrationError> {
        if let Some(existing) = self.db.latest_transaction(registration.id, payment_nr).await? {
            if existing.status == TransactionStatus::Success {
                debug!(
                    "💳️ Payment {payment_nr} for [{}] already disbursed; skipping re-delivered job",
                    registration.reference_id
                );
                return Ok(existing);
            }
        }
        // Missing attributes or phone number fail fast, before any remote call.
        let details = self.payment_details(registration).await?;
        details.check_phone_number()?;

        match self.provision_and_fund(registration, payment_nr, amount, &details).await? {
            ChainOutcome::Funded(notifications) => {
                let transaction = self
                    .db
                    .insert_transaction(NewTransaction::new(registration, payment_nr, amount, TransactionStatus::Success))
                    .await?;
                info!(
                    "💳️ Payment {payment_nr} of {amount} disbursed to [{}]",
                    registration.reference_id
                );
                self.publish_completion(registration, &transaction).await;
                for notification in notifications {
                    self.publish_message(notification).await;
                }
                Ok(transaction)
            },
            ChainOutcome::Failed(message) => {
                warn!("💳️ Payment {payment_nr} for [{}] failed: {message}", registration.reference_id);
                let transaction = self
                    .db
                    .insert_transaction(
                        NewTransaction::new(registration, payment_nr, amount, TransactionStatus::Error)
                            .with_error_message(message),
                    )
                    .await?;
                self.publish_completion(registration, &transaction).await;
                Ok(transaction)
            },
        }
    }

    /// The provisioning chain. Each arm persists its milestone before the next remote call, and
    /// stops at the first failure.
    async fn provision_and_fund(
        &self,
        registration: &Registration,
        payment_nr: i64,
        amount: Money,
        details: &VisaPaymentDetails,
    ) -> Result<ChainOutcome, OrchestrationError> {
        // 1. Customer record: create lazily, exactly once per beneficiary.
        let customer = match self.db.fetch_visa_customer(registration.id).await? {
            Some(customer) => customer,
            None => {
                let request = details.customer_request(&registration.reference_id);
                match self.api.create_customer(&request).await {
                    Ok(info) => {
                        trace!("💳️ Customer {} created for [{}]", info.id, registration.reference_id);
                        self.db.insert_visa_customer(registration.id, &info.id).await?
                    },
                    Err(e) => return classify("CREATE CUSTOMER", e).map(ChainOutcome::Failed),
                }
            },
        };

        // 2. Current wallet: create one if the beneficiary has none, pre-loading the payment
        //    amount when the provider funds at creation time. No row is persisted on failure.
        let wallet = match self.db.current_wallet(customer.id).await? {
            Some(wallet) => wallet,
            None => {
                let initial = if self.api.fund_on_wallet_creation() { amount } else { Money::from(0) };
                match self.api.create_wallet(&customer.holder_id, initial).await {
                    Ok(token) => {
                        let status =
                            WalletStatus::derive(token.status.as_deref().unwrap_or("ACTIVE"), token.blocked);
                        let new_wallet = NewVisaWallet {
                            token_code: token.code,
                            balance: initial,
                            status,
                            token_blocked: token.blocked,
                        };
                        self.db.insert_wallet(customer.id, new_wallet).await?
                    },
                    Err(e) => return classify("CREATE WALLET", e).map(ChainOutcome::Failed),
                }
            },
        };

        // 3. Link the wallet to the customer. The wallet row persists across failures here, so a
        //    retry resumes at this step rather than creating a second wallet.
        let wallet = if wallet.linked_to_customer {
            wallet
        } else {
            match self.api.link_wallet_to_customer(&customer.holder_id, &wallet.token_code).await {
                Ok(()) => self.db.update_wallet(&wallet.token_code, WalletUpdate::linked()).await?,
                Err(e) => return classify("LINK CUSTOMER", e).map(ChainOutcome::Failed),
            }
        };

        let mut notifications = Vec::new();
        let sale_id = format!("{}-{payment_nr}", registration.reference_id);
        if !wallet.debit_card_created {
            // 4. First cycle for this wallet: issue the physical card. The amount is already
            //    reserved in the wallet when the provider funds at creation time.
            let request = details.debit_card_request(self.api.card_brand());
            match self.api.create_debit_card(&wallet.token_code, &request).await {
                Ok(()) => {
                    self.db.update_wallet(&wallet.token_code, WalletUpdate::card_created()).await?;
                    notifications.push(self.message_for(registration, template_keys::VISA_DEBIT_CARD_CREATED, amount));
                },
                Err(e) => return classify("CREATE DEBIT CARD", e).map(ChainOutcome::Failed),
            }
            if !self.api.fund_on_wallet_creation() {
                match self.api.load_balance(&wallet.token_code, amount, &sale_id).await {
                    Ok(()) => {
                        let update = WalletUpdate { balance: Some(wallet.balance + amount), ..Default::default() };
                        self.db.update_wallet(&wallet.token_code, update).await?;
                        notifications.push(self.message_for(registration, template_keys::VISA_LOAD, amount));
                    },
                    Err(e) => return classify("LOAD BALANCE", e).map(ChainOutcome::Failed),
                }
            }
        } else {
            // 5. Steady state for repeat cycles: top up the existing instrument.
            match self.api.load_balance(&wallet.token_code, amount, &sale_id).await {
                Ok(()) => {
                    let update = WalletUpdate { balance: Some(wallet.balance + amount), ..Default::default() };
                    self.db.update_wallet(&wallet.token_code, update).await?;
                    notifications.push(self.message_for(registration, template_keys::VISA_LOAD, amount));
                },
                Err(e) => return classify("LOAD BALANCE", e).map(ChainOutcome::Failed),
            }
        }
        Ok(ChainOutcome::Funded(notifications))
    }

    /// Block or unblock a wallet. Synchronous administrative operation; the local flag is
    /// updated when the provider applies the change or reports it was already in that state.
    pub async fn toggle_block_wallet(
        &self,
        token_code: &str,
        block: bool,
    ) -> Result<VisaWallet, OrchestrationError> {
        self.db
            .fetch_wallet_by_token(token_code)
            .await?
            .ok_or_else(|| crate::traits::StorageError::WalletNotFound(token_code.to_string()))?;
        let step = if block { "BLOCK WALLET" } else { "UNBLOCK WALLET" };
        match self.api.toggle_block(token_code, block).await {
            Ok(_) => {
                info!("💳️ Wallet {token_code} {}", if block { "blocked" } else { "unblocked" });
                Ok(self.db.update_wallet(token_code, WalletUpdate::blocked(block)).await?)
            },
            Err(e) if e.is_retryable() => Err(OrchestrationError::ProviderUnavailable(format!("{step} ERROR: {e}"))),
            Err(e) => Err(OrchestrationError::StepFailed(format!("{step} ERROR: {e}"))),
        }
    }

    /// Replace the beneficiary's current wallet and card, transferring the remaining balance.
    ///
    /// This is a compensating-transaction sequence: any failure after the old wallet has been
    /// activated triggers a best-effort re-block of the old wallet before the original error is
    /// surfaced, so the old instrument is never left both unblocked and abandoned. A new wallet
    /// that cannot be linked or carded is removed again.
    pub async fn reissue_wallet_and_card(
        &self,
        reference_id: &ReferenceId,
        scope: &ScopeFilter,
    ) -> Result<(), OrchestrationError> {
        let registration = self
            .db
            .fetch_registration(reference_id, scope)
            .await?
            .ok_or_else(|| OrchestrationError::RegistrationNotFound(reference_id.clone()))?;
        if registration.fsp != Fsp::IntersolveVisa {
            return Err(OrchestrationError::WrongProvider(reference_id.clone(), registration.fsp));
        }
        let customer = self
            .db
            .fetch_visa_customer(registration.id)
            .await?
            .ok_or_else(|| OrchestrationError::NoCustomerYet(reference_id.clone()))?;
        let wallets = self.db.fetch_wallets(customer.id).await?;
        let old_wallet =
            wallets.first().cloned().ok_or_else(|| OrchestrationError::NoWalletAvailable(reference_id.clone()))?;
        let details = self.payment_details(&registration).await?;
        details.check_phone_number()?;

        info!("💳️ Reissuing wallet and card for [{reference_id}], replacing {}", old_wallet.token_code);

        // 0. Customer data is normally synced during create-customer, which this flow skips.
        self.sync_customer(&customer, &details).await?;

        // 1. Activate the old wallet so its balance can be read and unloaded.
        if let Err(e) = self.api.activate_wallet(&old_wallet.token_code).await {
            return Err(OrchestrationError::StepFailed(format!("ACTIVATE OLD WALLET ERROR: {e}")));
        }

        // 2. Unblock it for the same reason. From here on, every failure re-blocks first.
        if let Err(e) = self.api.toggle_block(&old_wallet.token_code, false).await {
            self.try_block_wallet(&registration, &old_wallet.token_code).await;
            return Err(OrchestrationError::StepFailed(format!("UNBLOCK OLD WALLET ERROR: {e}")));
        }

        // 3. The remaining balance transfers to the new wallet.
        let balance = match self.api.get_wallet(&old_wallet.token_code).await {
            Ok(details) => details.balance,
            Err(e) => {
                self.try_block_wallet(&registration, &old_wallet.token_code).await;
                return Err(OrchestrationError::StepFailed(format!("GET WALLET ERROR: {e}")));
            },
        };

        // 4. Create the replacement wallet carrying that balance.
        let token = match self.api.create_wallet(&customer.holder_id, balance).await {
            Ok(token) => token,
            Err(e) => {
                self.try_block_wallet(&registration, &old_wallet.token_code).await;
                return Err(OrchestrationError::StepFailed(format!("CREATE WALLET ERROR: {e}")));
            },
        };
        let status = WalletStatus::derive(token.status.as_deref().unwrap_or("ACTIVE"), token.blocked);
        let new_wallet = self
            .db
            .insert_wallet(customer.id, NewVisaWallet {
                token_code: token.code,
                balance,
                status,
                token_blocked: token.blocked,
            })
            .await?;

        // 5. Link it. On failure the unlinked row is removed so no orphan is left behind.
        if let Err(e) = self.api.link_wallet_to_customer(&customer.holder_id, &new_wallet.token_code).await {
            self.try_block_wallet(&registration, &old_wallet.token_code).await;
            self.db.delete_wallet(&new_wallet.token_code).await?;
            return Err(OrchestrationError::StepFailed(format!("LINK CUSTOMER ERROR: {e}")));
        }
        self.db.update_wallet(&new_wallet.token_code, WalletUpdate::linked()).await?;

        // 6. Issue the replacement card.
        let card_request = details.debit_card_request(self.api.card_brand());
        if let Err(e) = self.api.create_debit_card(&new_wallet.token_code, &card_request).await {
            self.try_block_wallet(&registration, &old_wallet.token_code).await;
            self.db.delete_wallet(&new_wallet.token_code).await?;
            return Err(OrchestrationError::StepFailed(format!("CREATE DEBIT CARD ERROR: {e}")));
        }
        self.db.update_wallet(&new_wallet.token_code, WalletUpdate::card_created()).await?;

        // 7. Drain the old wallet. Failures from here are surfaced without compensation, since
        //    the new instrument is already live.
        if self.api.unload_balance(&old_wallet.token_code, balance).await.is_err() {
            return Err(OrchestrationError::ReissueUnloadFailed);
        }

        // 8. Block the old wallet, and all older ones best-effort.
        if self.api.toggle_block(&old_wallet.token_code, true).await.is_err() {
            return Err(OrchestrationError::ReissueBlockFailed);
        }
        self.db.update_wallet(&old_wallet.token_code, WalletUpdate::blocked(true)).await?;
        for wallet in wallets.iter().skip(1) {
            if self.api.toggle_block(&wallet.token_code, true).await.is_ok() {
                self.db.update_wallet(&wallet.token_code, WalletUpdate::blocked(true)).await?;
            }
        }

        if let Err(e) = self.refresh_customer_wallets(&customer).await {
            warn!("💳️ Reissue for [{reference_id}] succeeded but refreshing wallet details failed: {e}");
        }
        info!("💳️ Reissue complete for [{reference_id}]: {} replaces {}", new_wallet.token_code, old_wallet.token_code);
        Ok(())
    }

    /// Wallet details for administrative callers, refreshed from the provider.
    pub async fn wallet_details(
        &self,
        reference_id: &ReferenceId,
        scope: &ScopeFilter,
    ) -> Result<Vec<WalletDetailsView>, OrchestrationError> {
        let registration = self
            .db
            .fetch_registration(reference_id, scope)
            .await?
            .ok_or_else(|| OrchestrationError::RegistrationNotFound(reference_id.clone()))?;
        if registration.fsp != Fsp::IntersolveVisa {
            return Err(OrchestrationError::WrongProvider(reference_id.clone(), registration.fsp));
        }
        let customer = self
            .db
            .fetch_visa_customer(registration.id)
            .await?
            .ok_or_else(|| OrchestrationError::NoCustomerYet(reference_id.clone()))?;
        self.refresh_customer_wallets(&customer).await
    }

    /// Periodic sweep: refresh balance, status and last-used time of every wallet from the
    /// provider, in fixed-size id batches. Failures on individual wallets are logged and skipped
    /// so one bad token cannot stall the sweep.
    pub async fn refresh_all_wallets(&self, batch_size: i64) -> Result<u64, OrchestrationError> {
        let Some(max_id) = self.db.max_wallet_id().await? else {
            return Ok(0);
        };
        let mut refreshed = 0u64;
        let mut id = 1;
        while id <= max_id {
            let wallets = self.db.wallets_in_id_range(id, id + batch_size - 1).await?;
            for wallet in wallets {
                match self.refresh_wallet(&wallet).await {
                    Ok(_) => refreshed += 1,
                    Err(e) => warn!("🕰️ Could not refresh wallet {}: {e}", wallet.token_code),
                }
            }
            id += batch_size;
        }
        Ok(refreshed)
    }

    async fn refresh_customer_wallets(
        &self,
        customer: &VisaCustomer,
    ) -> Result<Vec<WalletDetailsView>, OrchestrationError> {
        let wallets = self.db.fetch_wallets(customer.id).await?;
        let mut views = Vec::with_capacity(wallets.len());
        for wallet in &wallets {
            views.push(self.refresh_wallet(wallet).await?);
        }
        Ok(views)
    }

    async fn refresh_wallet(&self, wallet: &VisaWallet) -> Result<WalletDetailsView, OrchestrationError> {
        let details = match self.api.get_wallet(&wallet.token_code).await {
            Ok(details) => details,
            Err(e) if e.is_retryable() => {
                return Err(OrchestrationError::ProviderUnavailable(format!("GET WALLET ERROR: {e}")))
            },
            Err(e) => return Err(OrchestrationError::StepFailed(format!("GET WALLET ERROR: {e}"))),
        };
        // Spending shows up as CHARGE transactions; the most recent one dates the last use.
        let last_used_at = match self.api.get_transactions(&wallet.token_code).await {
            Ok(transactions) => {
                transactions.iter().filter(|t| t.transaction_type == "CHARGE").map(|t| t.created_at).max()
            },
            Err(e) => {
                warn!("💳️ Could not fetch transactions for wallet {}: {e}", wallet.token_code);
                None
            },
        };
        let status = WalletStatus::derive(&details.status, wallet.token_blocked);
        let update = WalletUpdate {
            balance: Some(details.balance),
            status: Some(status),
            last_used_at,
            ..Default::default()
        };
        let updated = self.db.update_wallet(&wallet.token_code, update).await?;
        Ok(WalletDetailsView {
            token_code: updated.token_code,
            balance: updated.balance,
            status,
            debit_card_created: updated.debit_card_created,
            issued_at: updated.created_at,
            last_used_at: updated.last_used_at,
        })
    }

    /// Pushes the current phone number and address to the provider. Reissue skips
    /// create-customer, so stale contact data would otherwise end up on the new card.
    async fn sync_customer(
        &self,
        customer: &VisaCustomer,
        details: &VisaPaymentDetails,
    ) -> Result<(), OrchestrationError> {
        let mut failures = Vec::new();
        if let Err(e) = self.api.update_customer_phone(&customer.holder_id, &details.phone_number).await {
            failures.push(format!("Phone number update failed: {e}"));
        }
        let address = details.customer_address();
        if let Err(e) = self.api.update_customer_address(&customer.holder_id, &address).await {
            failures.push(format!("Address update failed: {e}"));
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(OrchestrationError::StepFailed(format!("SYNC CUSTOMER ERROR: {}", failures.join(", "))))
        }
    }

    /// Best-effort compensation: re-block a wallet after a failed reissue step. Its own failure
    /// is logged and alerted, but never masks the original error.
    async fn try_block_wallet(&self, registration: &Registration, token_code: &str) {
        match self.api.toggle_block(token_code, true).await {
            Ok(_) => {
                if let Err(e) = self.db.update_wallet(token_code, WalletUpdate::blocked(true)).await {
                    warn!("💳️ Wallet {token_code} re-blocked at the provider but the local flag update failed: {e}");
                }
            },
            Err(e) => {
                let message = format!("Compensating block of wallet {token_code} failed: {e}");
                error!("🚨️ {message} The instrument may be neither blocked nor replaced.");
                let alert = CompensationFailedAlert {
                    reference_id: registration.reference_id.clone(),
                    token_code: token_code.to_string(),
                    message,
                };
                for producer in &self.producers.compensation_failed_producer {
                    producer.publish_event(alert.clone()).await;
                }
            },
        }
    }

    async fn payment_details(
        &self,
        registration: &Registration,
    ) -> Result<VisaPaymentDetails, OrchestrationError> {
        let schema = self.db.fetch_attribute_schema(registration.program_id).await?;
        let rows = self.db.fetch_registration_attributes(registration.id).await?;
        let bag = crate::attributes::AttributeBag::from_rows(&schema, &rows)?;
        Ok(VisaPaymentDetails::from_registration(registration, &bag)?)
    }

    fn message_for(&self, registration: &Registration, template_key: &str, amount: Money) -> MessageRequestEvent {
        MessageRequestEvent {
            registration_id: registration.id,
            reference_id: registration.reference_id.clone(),
            template_key: template_key.to_string(),
            dynamic_params: vec![amount.major_units().to_string()],
            message_ref: None,
        }
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

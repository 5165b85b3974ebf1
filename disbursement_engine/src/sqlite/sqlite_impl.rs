//! `SqliteDatabase` is a concrete implementation of a disbursement engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the
//! [`crate::traits`] module.
use std::fmt::Debug;

use chrono::Duration;
use sqlx::SqlitePool;

use super::db::{jobs, new_pool, registrations, transactions, visa, vouchers};
use crate::{
    attributes::{AttributeKind, AttributeSchema},
    db_types::{
        Fsp,
        JobStatus,
        NewPaymentJob,
        NewRegistration,
        NewTransaction,
        NewVisaWallet,
        NewVoucher,
        NewVoucherIssueRequest,
        PaymentJob,
        ReferenceId,
        Registration,
        RegistrationStatus,
        Transaction,
        TransactionStatus,
        VisaCustomer,
        VisaWallet,
        Voucher,
        VoucherIssueRequest,
    },
    scope::ScopeFilter,
    traits::{
        DisbursementDatabase,
        InstrumentManagement,
        JobManagement,
        RegistrationManagement,
        StorageError,
        SweepVoucher,
        TransactionManagement,
        VoucherManagement,
        VoucherUpdate,
        WalletUpdate,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl RegistrationManagement for SqliteDatabase {
    async fn fetch_registration(
        &self,
        reference_id: &ReferenceId,
        scope: &ScopeFilter,
    ) -> Result<Option<Registration>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        registrations::fetch_registration(reference_id, scope, &mut conn).await
    }

    async fn fetch_registration_by_id(&self, id: i64) -> Result<Option<Registration>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        registrations::fetch_registration_by_id(id, &mut conn).await
    }

    async fn insert_registration(
        &self,
        registration: NewRegistration,
    ) -> Result<(Registration, bool), StorageError> {
        let mut conn = self.pool.acquire().await?;
        registrations::idempotent_insert(registration, &mut conn).await
    }

    async fn update_registration_status(
        &self,
        reference_id: &ReferenceId,
        status: RegistrationStatus,
    ) -> Result<Registration, StorageError> {
        let mut conn = self.pool.acquire().await?;
        registrations::update_status(reference_id, status, &mut conn).await
    }

    async fn fetch_attribute_schema(&self, program_id: i64) -> Result<AttributeSchema, StorageError> {
        let mut conn = self.pool.acquire().await?;
        registrations::fetch_attribute_schema(program_id, &mut conn).await
    }

    async fn declare_attribute(
        &self,
        program_id: i64,
        key: &str,
        kind: AttributeKind,
    ) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        registrations::declare_attribute(program_id, key, kind, &mut conn).await
    }

    async fn fetch_registration_attributes(
        &self,
        registration_id: i64,
    ) -> Result<Vec<(String, String)>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        registrations::fetch_attributes(registration_id, &mut conn).await
    }

    async fn upsert_registration_attribute(
        &self,
        registration_id: i64,
        key: &str,
        value: &str,
    ) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        registrations::upsert_attribute(registration_id, key, value, &mut conn).await
    }
}

impl InstrumentManagement for SqliteDatabase {
    async fn fetch_visa_customer(&self, registration_id: i64) -> Result<Option<VisaCustomer>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        visa::fetch_customer(registration_id, &mut conn).await
    }

    async fn insert_visa_customer(
        &self,
        registration_id: i64,
        holder_id: &str,
    ) -> Result<VisaCustomer, StorageError> {
        let mut conn = self.pool.acquire().await?;
        visa::idempotent_insert_customer(registration_id, holder_id, &mut conn).await
    }

    async fn fetch_wallets(&self, customer_id: i64) -> Result<Vec<VisaWallet>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        visa::fetch_wallets(customer_id, &mut conn).await
    }

    async fn current_wallet(&self, customer_id: i64) -> Result<Option<VisaWallet>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        let wallets = visa::fetch_wallets(customer_id, &mut conn).await?;
        Ok(wallets.into_iter().next())
    }

    async fn fetch_wallet_by_token(&self, token_code: &str) -> Result<Option<VisaWallet>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        visa::fetch_wallet_by_token(token_code, &mut conn).await
    }

    async fn insert_wallet(&self, customer_id: i64, wallet: NewVisaWallet) -> Result<VisaWallet, StorageError> {
        let mut conn = self.pool.acquire().await?;
        visa::insert_wallet(customer_id, wallet, &mut conn).await
    }

    async fn update_wallet(&self, token_code: &str, update: WalletUpdate) -> Result<VisaWallet, StorageError> {
        let mut conn = self.pool.acquire().await?;
        visa::update_wallet(token_code, update, &mut conn).await
    }

    async fn delete_wallet(&self, token_code: &str) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        visa::delete_wallet(token_code, &mut conn).await
    }

    async fn wallets_in_id_range(&self, start: i64, end: i64) -> Result<Vec<VisaWallet>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        visa::wallets_in_id_range(start, end, &mut conn).await
    }

    async fn max_wallet_id(&self) -> Result<Option<i64>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        visa::max_wallet_id(&mut conn).await
    }
}

impl VoucherManagement for SqliteDatabase {
    async fn fetch_voucher(
        &self,
        registration_id: i64,
        payment_nr: i64,
    ) -> Result<Option<Voucher>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        vouchers::fetch_voucher(registration_id, payment_nr, &mut conn).await
    }

    async fn insert_voucher(&self, voucher: NewVoucher) -> Result<Voucher, StorageError> {
        let mut conn = self.pool.acquire().await?;
        vouchers::insert_voucher(voucher, &mut conn).await
    }

    async fn update_voucher(&self, id: i64, update: VoucherUpdate) -> Result<Voucher, StorageError> {
        let mut conn = self.pool.acquire().await?;
        vouchers::update_voucher(id, update, &mut conn).await
    }

    async fn unused_vouchers_in_id_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<SweepVoucher>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        vouchers::unused_vouchers_in_id_range(start, end, &mut conn).await
    }

    async fn max_voucher_id(&self) -> Result<Option<i64>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        vouchers::max_voucher_id(&mut conn).await
    }

    async fn vouchers_needing_reminder(
        &self,
        min_age: Duration,
        max_reminders: i64,
    ) -> Result<Vec<SweepVoucher>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        vouchers::vouchers_needing_reminder(min_age, max_reminders, &mut conn).await
    }

    async fn insert_issue_request(
        &self,
        request: NewVoucherIssueRequest,
    ) -> Result<VoucherIssueRequest, StorageError> {
        let mut conn = self.pool.acquire().await?;
        vouchers::insert_issue_request(request, &mut conn).await
    }

    async fn pending_cancellations(&self) -> Result<Vec<VoucherIssueRequest>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        vouchers::pending_cancellations(&mut conn).await
    }

    async fn mark_cancellation_done(&self, id: i64) -> Result<(), StorageError> {
        let mut conn = self.pool.acquire().await?;
        vouchers::mark_cancellation_done(id, &mut conn).await
    }
}

impl TransactionManagement for SqliteDatabase {
    async fn insert_transaction(&self, transaction: NewTransaction) -> Result<Transaction, StorageError> {
        let mut conn = self.pool.acquire().await?;
        transactions::insert_transaction(transaction, &mut conn).await
    }

    async fn transactions_for_registration(
        &self,
        registration_id: i64,
    ) -> Result<Vec<Transaction>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        transactions::transactions_for_registration(registration_id, &mut conn).await
    }

    async fn latest_transaction(
        &self,
        registration_id: i64,
        payment_nr: i64,
    ) -> Result<Option<Transaction>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        transactions::latest_transaction(registration_id, payment_nr, &mut conn).await
    }

    async fn resolve_waiting_transaction(
        &self,
        message_ref: &str,
        status: TransactionStatus,
        error_message: Option<&str>,
    ) -> Result<Option<Transaction>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        transactions::resolve_waiting_transaction(message_ref, status, error_message, &mut conn).await
    }
}

impl JobManagement for SqliteDatabase {
    async fn enqueue_job(&self, job: NewPaymentJob) -> Result<(PaymentJob, bool), StorageError> {
        let mut conn = self.pool.acquire().await?;
        jobs::idempotent_enqueue(job, &mut conn).await
    }

    async fn claim_next_job(&self, fsps: &[Fsp]) -> Result<Option<PaymentJob>, StorageError> {
        let mut conn = self.pool.acquire().await?;
        jobs::claim_next_job(fsps, &mut conn).await
    }

    async fn release_job(&self, id: i64, error: &str) -> Result<PaymentJob, StorageError> {
        let mut conn = self.pool.acquire().await?;
        jobs::release_job(id, error, &mut conn).await
    }

    async fn complete_job(
        &self,
        id: i64,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<PaymentJob, StorageError> {
        let mut conn = self.pool.acquire().await?;
        jobs::complete_job(id, status, error, &mut conn).await
    }

    async fn pending_job_count(&self, program_id: i64) -> Result<i64, StorageError> {
        let mut conn = self.pool.acquire().await?;
        jobs::pending_job_count(program_id, &mut conn).await
    }
}

impl DisbursementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn close(&mut self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

use std::future::Future;

use chrono::Duration;

use crate::{
    db_types::{NewVoucher, NewVoucherIssueRequest, Voucher, VoucherIssueRequest},
    traits::{StorageError, VoucherUpdate},
};

/// A voucher joined with the program that owns its registration, as the reconciliation sweeps
/// need both.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SweepVoucher {
    #[sqlx(flatten)]
    pub voucher: Voucher,
    pub program_id: i64,
}

/// Access to issued vouchers and the issue-request bookkeeping behind the cancellation sweep.
pub trait VoucherManagement: Clone {
    /// The voucher for (registration, payment cycle), if one was ever issued.
    fn fetch_voucher(
        &self,
        registration_id: i64,
        payment_nr: i64,
    ) -> impl Future<Output = Result<Option<Voucher>, StorageError>> + Send;

    fn insert_voucher(
        &self,
        voucher: NewVoucher,
    ) -> impl Future<Output = Result<Voucher, StorageError>> + Send;

    fn update_voucher(
        &self,
        id: i64,
        update: VoucherUpdate,
    ) -> impl Future<Output = Result<Voucher, StorageError>> + Send;

    /// Not-yet-spent vouchers with ids in `[start, end]`, joined with their program. Batched so
    /// the balance-refresh sweep bounds its memory and per-call concurrency.
    fn unused_vouchers_in_id_range(
        &self,
        start: i64,
        end: i64,
    ) -> impl Future<Output = Result<Vec<SweepVoucher>, StorageError>> + Send;

    fn max_voucher_id(&self) -> impl Future<Output = Result<Option<i64>, StorageError>> + Send;

    /// WhatsApp vouchers older than `min_age` that are still unclaimed and have received fewer
    /// than `max_reminders` reminders.
    fn vouchers_needing_reminder(
        &self,
        min_age: Duration,
        max_reminders: i64,
    ) -> impl Future<Output = Result<Vec<SweepVoucher>, StorageError>> + Send;

    fn insert_issue_request(
        &self,
        request: NewVoucherIssueRequest,
    ) -> impl Future<Output = Result<VoucherIssueRequest, StorageError>> + Send;

    /// Issue requests still marked for cancellation.
    fn pending_cancellations(
        &self,
    ) -> impl Future<Output = Result<Vec<VoucherIssueRequest>, StorageError>> + Send;

    fn mark_cancellation_done(&self, id: i64) -> impl Future<Output = Result<(), StorageError>> + Send;
}

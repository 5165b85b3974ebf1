use std::future::Future;

use crate::{
    db_types::{NewTransaction, Transaction, TransactionStatus},
    traits::StorageError,
};

/// The transaction ledger: one row per disbursement attempt outcome, no silent drops.
pub trait TransactionManagement: Clone {
    fn insert_transaction(
        &self,
        transaction: NewTransaction,
    ) -> impl Future<Output = Result<Transaction, StorageError>> + Send;

    /// All ledger entries for a registration, newest first.
    fn transactions_for_registration(
        &self,
        registration_id: i64,
    ) -> impl Future<Output = Result<Vec<Transaction>, StorageError>> + Send;

    /// The most recent ledger entry for (registration, payment cycle), if any.
    fn latest_transaction(
        &self,
        registration_id: i64,
        payment_nr: i64,
    ) -> impl Future<Output = Result<Option<Transaction>, StorageError>> + Send;

    /// Resolve a `Waiting` transaction identified by its message correlation reference. Returns
    /// `None` when no waiting transaction carries the reference (late or duplicate receipts are
    /// no-ops).
    fn resolve_waiting_transaction(
        &self,
        message_ref: &str,
        status: TransactionStatus,
        error_message: Option<&str>,
    ) -> impl Future<Output = Result<Option<Transaction>, StorageError>> + Send;
}

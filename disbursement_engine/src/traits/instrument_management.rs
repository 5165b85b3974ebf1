use std::future::Future;

use crate::{
    db_types::{NewVisaWallet, VisaCustomer, VisaWallet},
    traits::{StorageError, WalletUpdate},
};

/// Access to provider-side financial instruments: customers (holders) and wallets (tokens).
pub trait InstrumentManagement: Clone {
    fn fetch_visa_customer(
        &self,
        registration_id: i64,
    ) -> impl Future<Output = Result<Option<VisaCustomer>, StorageError>> + Send;

    /// Persist the customer created at the provider. Idempotent: guarded by the unique constraint
    /// on the registration, a second insert returns the existing row.
    fn insert_visa_customer(
        &self,
        registration_id: i64,
        holder_id: &str,
    ) -> impl Future<Output = Result<VisaCustomer, StorageError>> + Send;

    /// All wallets for a customer, newest first. The first element is the current wallet.
    fn fetch_wallets(
        &self,
        customer_id: i64,
    ) -> impl Future<Output = Result<Vec<VisaWallet>, StorageError>> + Send;

    /// The customer's current wallet (most recently created), if any.
    fn current_wallet(
        &self,
        customer_id: i64,
    ) -> impl Future<Output = Result<Option<VisaWallet>, StorageError>> + Send;

    fn fetch_wallet_by_token(
        &self,
        token_code: &str,
    ) -> impl Future<Output = Result<Option<VisaWallet>, StorageError>> + Send;

    fn insert_wallet(
        &self,
        customer_id: i64,
        wallet: NewVisaWallet,
    ) -> impl Future<Output = Result<VisaWallet, StorageError>> + Send;

    fn update_wallet(
        &self,
        token_code: &str,
        update: WalletUpdate,
    ) -> impl Future<Output = Result<VisaWallet, StorageError>> + Send;

    /// Remove a wallet row again after an incomplete provisioning flow. Only ever called for a
    /// wallet that was never linked to its customer.
    fn delete_wallet(&self, token_code: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Wallets with ids in `[start, end]`, for batched reconciliation sweeps.
    fn wallets_in_id_range(
        &self,
        start: i64,
        end: i64,
    ) -> impl Future<Output = Result<Vec<VisaWallet>, StorageError>> + Send;

    fn max_wallet_id(&self) -> impl Future<Output = Result<Option<i64>, StorageError>> + Send;
}

use std::future::Future;

use crate::traits::{
    InstrumentManagement,
    JobManagement,
    RegistrationManagement,
    StorageError,
    TransactionManagement,
    VoucherManagement,
};

/// The full storage contract required by the orchestrators and queue workers.
///
/// Cross-step coordination happens exclusively through persisted row state, never in-memory
/// state, so every worker on every instance sees the same provisioning progress.
pub trait DisbursementDatabase:
    Clone
    + Send
    + Sync
    + RegistrationManagement
    + InstrumentManagement
    + VoucherManagement
    + TransactionManagement
    + JobManagement
{
    /// The URL of the database.
    fn url(&self) -> &str;

    /// Closes the database connection.
    fn close(&mut self) -> impl Future<Output = Result<(), StorageError>> + Send {
        async { Ok(()) }
    }
}

//! Behaviour contracts for storage backends.
//!
//! The engine is written against these traits; [`crate::SqliteDatabase`] is the bundled
//! implementation. Each trait covers one slice of the data model, and
//! [`DisbursementDatabase`] ties them together as the bound the orchestrators and queue
//! workers require.
mod data_objects;
mod disbursement_database;
mod instrument_management;
mod job_management;
mod registration_management;
mod secrets;
mod transaction_management;
mod voucher_management;

use thiserror::Error;

pub use data_objects::{VoucherUpdate, WalletUpdate};
pub use disbursement_database::DisbursementDatabase;
pub use instrument_management::InstrumentManagement;
pub use job_management::JobManagement;
pub use registration_management::RegistrationManagement;
pub use secrets::{ConfigurationError, SecretsProvider, StaticSecrets};
pub use transaction_management::TransactionManagement;
pub use voucher_management::{SweepVoucher, VoucherManagement};

use crate::db_types::ReferenceId;

#[derive(Debug, Clone, Error)]
pub enum StorageError {
    #[error("Internal database error: {0}")]
    DatabaseError(String),
    #[error("No registration found with reference id {0} (within your scope)")]
    RegistrationNotFound(ReferenceId),
    #[error("No wallet found with token code {0}")]
    WalletNotFound(String),
    #[error("No voucher row with id {0}")]
    VoucherNotFound(i64),
    #[error("The requested job {0} does not exist")]
    JobNotFound(i64),
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::DatabaseError(e.to_string())
    }
}

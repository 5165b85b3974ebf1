//! Disbursement Payment Engine
//!
//! The core library of the disbursement gateway: it pays out cash-assistance transfers to
//! beneficiaries through external financial service providers and keeps authoritative local
//! bookkeeping of every attempt.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`] and the contracts in [`mod@traits`]).
//!    SQLite is the bundled backend. You should never need to access the database directly;
//!    use the public API instead. The exception is the data types, which are defined in the
//!    [`mod@db_types`] module and are public.
//! 2. The orchestration API: [`VisaOrchestrator`] and [`VoucherOrchestrator`] drive a
//!    beneficiary's financial instrument through its provider-specific provisioning steps, and
//!    [`PaymentRunApi`] fans payment runs out into the durable job queue drained by the worker
//!    pools in [`mod@queue`].
//! 3. A set of events that can be subscribed to ([`mod@events`]). Notification dispatch and
//!    operator alerting hook into these; the engine itself only publishes.
pub mod attributes;
pub mod db_types;
mod dpg_api;
pub mod events;
pub mod queue;
pub mod scope;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use dpg_api::{
    errors::OrchestrationError,
    payment_api::PaymentRunApi,
    payment_objects,
    visa_orchestrator::VisaOrchestrator,
    voucher_orchestrator::VoucherOrchestrator,
};

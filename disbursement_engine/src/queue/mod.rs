//! Worker pools that drain the durable payment job queue.
//!
//! The queue itself is the `payment_jobs` table (see [`crate::traits::JobManagement`]); workers
//! are plain tokio tasks that claim jobs atomically and run the matching orchestrator. Each
//! provider family gets its own pool so a rate-limited provider can be given fewer concurrent
//! slots without starving the others.
mod worker;

pub use worker::{start_visa_workers, start_voucher_workers, WorkerConfig};

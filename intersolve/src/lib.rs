//! Intersolve provider API clients.
//!
//! Two provider families are supported:
//! * **Visa** ([`VisaApi`]): prepaid debit cards. Customers, wallets (tokens), card issuance and
//!   balance loads against the Intersolve wallet API.
//! * **Voucher** ([`VoucherApi`]): single-use barcode+PIN vouchers, issued and cancelled against
//!   the Intersolve voucher API with per-program credentials.
//!
//! The traits describe the remote contract; [`IntersolveVisaClient`] and
//! [`IntersolveVoucherClient`] implement them over HTTP, and the [`mock`] module provides
//! in-memory implementations for tests and demo environments.
mod config;
mod data_objects;
mod error;
pub mod helpers;
pub mod mock;
mod visa;
mod voucher;

pub use config::{IntersolveVisaConfig, IntersolveVoucherConfig};
pub use data_objects::*;
pub use error::{errors_to_message, IntersolveError};
pub use visa::{IntersolveVisaClient, VisaApi};
pub use voucher::{IntersolveVoucherClient, VoucherApi, VoucherCredentials};

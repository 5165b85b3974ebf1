pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod notify;
pub mod reconciliation_worker;
pub mod routes;
pub mod server;
pub mod voucher_image;

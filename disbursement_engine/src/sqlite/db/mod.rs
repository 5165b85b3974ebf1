//! # SQLite Database methods
//!
//! This module contains "low-level" SQLite database interactions.
//!
//! All these interactions are maintained by simple functions (rather than stateful structs) that
//! accept a `&mut SqliteConnection` argument. Callers can obtain a connection from a pool, or
//! create an atomic transaction as the need arises and call through to the functions without any
//! other changes.
use std::env;
use std::str::FromStr;

use log::info;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Error as SqlxError,
    SqlitePool,
};

pub mod jobs;
pub mod registrations;
pub mod transactions;
pub mod visa;
pub mod vouchers;

const SQLITE_DB_URL: &str = "sqlite://data/dpg_store.db";

pub fn db_url() -> String {
    let result = env::var("DPG_DATABASE_URL").unwrap_or_else(|_| {
        info!("DPG_DATABASE_URL is not set. Using the default.");
        SQLITE_DB_URL.to_string()
    });
    info!("Using database URL: {result}");
    result
}

pub async fn new_pool(url: &str, max_connections: u32) -> Result<SqlitePool, SqlxError> {
    // Use the rollback journal rather than sqlx's implicit WAL default: WAL's shared-memory index
    // is not reliably visible across pooled connections on every filesystem, which can let a read
    // on one connection miss a write just committed on another. The rollback journal gives all
    // connections a consistent read-your-writes view.
    let opts = SqliteConnectOptions::from_str(url)?.journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(opts).await?;
    Ok(pool)
}

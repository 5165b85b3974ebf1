use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewVisaWallet, VisaCustomer, VisaWallet},
    traits::{StorageError, WalletUpdate},
};

pub async fn fetch_customer(
    registration_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<VisaCustomer>, StorageError> {
    let customer = sqlx::query_as("SELECT * FROM visa_customers WHERE registration_id = $1")
        .bind(registration_id)
        .fetch_optional(conn)
        .await?;
    Ok(customer)
}

/// Persists a customer record. The unique constraint on `registration_id` guards against a
/// duplicate from a re-delivered job; on conflict the existing record is returned unchanged so
/// the holder id assigned by the first successful call wins.
pub async fn idempotent_insert_customer(
    registration_id: i64,
    holder_id: &str,
    conn: &mut SqliteConnection,
) -> Result<VisaCustomer, StorageError> {
    if let Some(existing) = fetch_customer(registration_id, &mut *conn).await? {
        return Ok(existing);
    }
    let customer: VisaCustomer =
        sqlx::query_as("INSERT INTO visa_customers (registration_id, holder_id) VALUES ($1, $2) RETURNING *")
            .bind(registration_id)
            .bind(holder_id)
            .fetch_one(conn)
            .await?;
    debug!("🗃️ Visa customer for registration #{registration_id} saved with holder id {holder_id}");
    Ok(customer)
}

/// All wallets for the customer, newest first, so the first element is the current wallet.
pub async fn fetch_wallets(
    customer_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<VisaWallet>, StorageError> {
    let wallets =
        sqlx::query_as("SELECT * FROM visa_wallets WHERE customer_id = $1 ORDER BY created_at DESC, id DESC")
            .bind(customer_id)
            .fetch_all(conn)
            .await?;
    Ok(wallets)
}

pub async fn fetch_wallet_by_token(
    token_code: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<VisaWallet>, StorageError> {
    let wallet = sqlx::query_as("SELECT * FROM visa_wallets WHERE token_code = $1")
        .bind(token_code)
        .fetch_optional(conn)
        .await?;
    Ok(wallet)
}

pub async fn insert_wallet(
    customer_id: i64,
    wallet: NewVisaWallet,
    conn: &mut SqliteConnection,
) -> Result<VisaWallet, StorageError> {
    let inserted: VisaWallet = sqlx::query_as(
        r#"
            INSERT INTO visa_wallets (customer_id, token_code, balance, status, token_blocked)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(customer_id)
    .bind(wallet.token_code)
    .bind(wallet.balance)
    .bind(wallet.status.to_string())
    .bind(wallet.token_blocked)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Wallet {} saved for customer #{customer_id}", inserted.token_code);
    Ok(inserted)
}

pub async fn update_wallet(
    token_code: &str,
    update: WalletUpdate,
    conn: &mut SqliteConnection,
) -> Result<VisaWallet, StorageError> {
    if update.is_empty() {
        return fetch_wallet_by_token(token_code, conn)
            .await?
            .ok_or_else(|| StorageError::WalletNotFound(token_code.to_string()));
    }
    let mut builder = QueryBuilder::new("UPDATE visa_wallets SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    if let Some(linked) = update.linked_to_customer {
        set_clause.push("linked_to_customer = ");
        set_clause.push_bind_unseparated(linked);
    }
    if let Some(carded) = update.debit_card_created {
        set_clause.push("debit_card_created = ");
        set_clause.push_bind_unseparated(carded);
    }
    if let Some(blocked) = update.token_blocked {
        set_clause.push("token_blocked = ");
        set_clause.push_bind_unseparated(blocked);
    }
    if let Some(status) = update.status {
        set_clause.push("status = ");
        set_clause.push_bind_unseparated(status.to_string());
    }
    if let Some(balance) = update.balance {
        set_clause.push("balance = ");
        set_clause.push_bind_unseparated(balance);
    }
    if let Some(last_used) = update.last_used_at {
        set_clause.push("last_used_at = ");
        set_clause.push_bind_unseparated(last_used);
    }
    builder.push(" WHERE token_code = ");
    builder.push_bind(token_code);
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let wallet = builder
        .build()
        .fetch_optional(conn)
        .await?
        .map(|row: SqliteRow| VisaWallet::from_row(&row))
        .transpose()?;
    wallet.ok_or_else(|| StorageError::WalletNotFound(token_code.to_string()))
}

pub async fn delete_wallet(token_code: &str, conn: &mut SqliteConnection) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM visa_wallets WHERE token_code = $1").bind(token_code).execute(conn).await?;
    debug!("🗃️ Wallet {token_code} removed after incomplete provisioning flow");
    Ok(())
}

pub async fn wallets_in_id_range(
    start: i64,
    end: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<VisaWallet>, StorageError> {
    let wallets = sqlx::query_as("SELECT * FROM visa_wallets WHERE id BETWEEN $1 AND $2 ORDER BY id")
        .bind(start)
        .bind(end)
        .fetch_all(conn)
        .await?;
    Ok(wallets)
}

pub async fn max_wallet_id(conn: &mut SqliteConnection) -> Result<Option<i64>, StorageError> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM visa_wallets").fetch_one(conn).await?;
    Ok(max)
}

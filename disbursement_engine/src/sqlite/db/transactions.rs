use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewTransaction, Transaction, TransactionStatus},
    traits::StorageError,
};

pub async fn insert_transaction(
    transaction: NewTransaction,
    conn: &mut SqliteConnection,
) -> Result<Transaction, StorageError> {
    let NewTransaction {
        registration_id,
        program_id,
        payment_nr,
        fsp,
        status,
        amount,
        error_message,
        transaction_step,
        message_ref,
    } = transaction;
    let transaction: Transaction = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                registration_id,
                program_id,
                payment_nr,
                fsp,
                status,
                amount,
                error_message,
                transaction_step,
                message_ref
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *;
        "#,
    )
    .bind(registration_id)
    .bind(program_id)
    .bind(payment_nr)
    .bind(fsp.to_string())
    .bind(status.to_string())
    .bind(amount)
    .bind(error_message)
    .bind(transaction_step)
    .bind(message_ref)
    .fetch_one(conn)
    .await?;
    debug!(
        "🗃️ Transaction #{} recorded for registration #{registration_id} payment {payment_nr} with status {}",
        transaction.id, transaction.status
    );
    Ok(transaction)
}

/// All ledger entries for the registration, newest first.
pub async fn transactions_for_registration(
    registration_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Transaction>, StorageError> {
    let transactions = sqlx::query_as(
        "SELECT * FROM transactions WHERE registration_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(registration_id)
    .fetch_all(conn)
    .await?;
    Ok(transactions)
}

pub async fn latest_transaction(
    registration_id: i64,
    payment_nr: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, StorageError> {
    let transaction = sqlx::query_as(
        "SELECT * FROM transactions WHERE registration_id = $1 AND payment_nr = $2 ORDER BY created_at DESC, id \
         DESC LIMIT 1",
    )
    .bind(registration_id)
    .bind(payment_nr)
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

/// Resolves the waiting transaction carrying `message_ref`, advancing it to step 2 with the
/// delivery outcome. Late or duplicate receipts find no waiting row and resolve to `None`.
pub async fn resolve_waiting_transaction(
    message_ref: &str,
    status: TransactionStatus,
    error_message: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, StorageError> {
    let transaction: Option<Transaction> = sqlx::query_as(
        r#"
            UPDATE transactions
            SET status = $1, error_message = $2, transaction_step = 2, updated_at = CURRENT_TIMESTAMP
            WHERE message_ref = $3 AND status = 'Waiting'
            RETURNING *;
        "#,
    )
    .bind(status.to_string())
    .bind(error_message)
    .bind(message_ref)
    .fetch_optional(conn)
    .await?;
    Ok(transaction)
}

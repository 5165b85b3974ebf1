use chrono::Duration;
use log::{debug, trace};
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewVoucher, NewVoucherIssueRequest, Voucher, VoucherIssueRequest},
    traits::{StorageError, SweepVoucher, VoucherUpdate},
};

/// The most recent voucher for (registration, payment cycle), if any was ever issued.
pub async fn fetch_voucher(
    registration_id: i64,
    payment_nr: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Voucher>, StorageError> {
    let voucher = sqlx::query_as(
        "SELECT * FROM vouchers WHERE registration_id = $1 AND payment_nr = $2 ORDER BY id DESC LIMIT 1",
    )
    .bind(registration_id)
    .bind(payment_nr)
    .fetch_optional(conn)
    .await?;
    Ok(voucher)
}

pub async fn insert_voucher(voucher: NewVoucher, conn: &mut SqliteConnection) -> Result<Voucher, StorageError> {
    let NewVoucher { registration_id, payment_nr, barcode, pin, amount, whatsapp_phone_number } = voucher;
    let voucher: Voucher = sqlx::query_as(
        r#"
            INSERT INTO vouchers (registration_id, payment_nr, barcode, pin, amount, whatsapp_phone_number)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *;
        "#,
    )
    .bind(registration_id)
    .bind(payment_nr)
    .bind(barcode)
    .bind(pin)
    .bind(amount)
    .bind(whatsapp_phone_number)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Voucher [{}] saved for registration #{registration_id} payment {payment_nr}", voucher.barcode);
    Ok(voucher)
}

pub async fn update_voucher(
    id: i64,
    update: VoucherUpdate,
    conn: &mut SqliteConnection,
) -> Result<Voucher, StorageError> {
    if update.is_empty() {
        let voucher: Option<Voucher> =
            sqlx::query_as("SELECT * FROM vouchers WHERE id = $1").bind(id).fetch_optional(conn).await?;
        return voucher.ok_or(StorageError::VoucherNotFound(id));
    }
    let mut builder = QueryBuilder::new("UPDATE vouchers SET updated_at = CURRENT_TIMESTAMP, ");
    let mut set_clause = builder.separated(", ");
    if let Some(send) = update.send {
        set_clause.push("send = ");
        set_clause.push_bind_unseparated(send);
    }
    if let Some(balance_used) = update.balance_used {
        set_clause.push("balance_used = ");
        set_clause.push_bind_unseparated(balance_used);
    }
    if let Some(balance) = update.last_requested_balance {
        set_clause.push("last_requested_balance = ");
        set_clause.push_bind_unseparated(balance);
    }
    if let Some(checked_at) = update.balance_checked_at {
        set_clause.push("balance_checked_at = ");
        set_clause.push_bind_unseparated(checked_at);
    }
    if let Some(count) = update.reminder_count {
        set_clause.push("reminder_count = ");
        set_clause.push_bind_unseparated(count);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(" RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let voucher =
        builder.build().fetch_optional(conn).await?.map(|row: SqliteRow| Voucher::from_row(&row)).transpose()?;
    voucher.ok_or(StorageError::VoucherNotFound(id))
}

/// Not-yet-spent vouchers in an id range, joined with the owning program. The range bound keeps
/// the balance-refresh sweep's memory and provider-call fan-out fixed regardless of table size.
pub async fn unused_vouchers_in_id_range(
    start: i64,
    end: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SweepVoucher>, StorageError> {
    let vouchers = sqlx::query_as(
        r#"
        SELECT vouchers.*, registrations.program_id AS program_id
        FROM vouchers JOIN registrations ON vouchers.registration_id = registrations.id
        WHERE vouchers.balance_used = 0 AND vouchers.id BETWEEN $1 AND $2
        ORDER BY vouchers.id
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_all(conn)
    .await?;
    Ok(vouchers)
}

pub async fn max_voucher_id(conn: &mut SqliteConnection) -> Result<Option<i64>, StorageError> {
    let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM vouchers").fetch_one(conn).await?;
    Ok(max)
}

/// Unclaimed WhatsApp vouchers older than `min_age` that have not hit the reminder cap.
pub async fn vouchers_needing_reminder(
    min_age: Duration,
    max_reminders: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<SweepVoucher>, StorageError> {
    let vouchers = sqlx::query_as(
        r#"
        SELECT vouchers.*, registrations.program_id AS program_id
        FROM vouchers JOIN registrations ON vouchers.registration_id = registrations.id
        WHERE vouchers.send = 0
          AND vouchers.whatsapp_phone_number IS NOT NULL
          AND (unixepoch(CURRENT_TIMESTAMP) - unixepoch(vouchers.created_at)) > $1
          AND vouchers.reminder_count < $2
        ORDER BY vouchers.id
        "#,
    )
    .bind(min_age.num_seconds())
    .bind(max_reminders)
    .fetch_all(conn)
    .await?;
    Ok(vouchers)
}

pub async fn insert_issue_request(
    request: NewVoucherIssueRequest,
    conn: &mut SqliteConnection,
) -> Result<VoucherIssueRequest, StorageError> {
    let NewVoucherIssueRequest { program_id, ref_pos, card_id, transaction_id, to_cancel } = request;
    let request: VoucherIssueRequest = sqlx::query_as(
        r#"
            INSERT INTO voucher_issue_requests (program_id, ref_pos, card_id, transaction_id, to_cancel)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *;
        "#,
    )
    .bind(program_id)
    .bind(ref_pos)
    .bind(card_id)
    .bind(transaction_id)
    .bind(to_cancel)
    .fetch_one(conn)
    .await?;
    Ok(request)
}

pub async fn pending_cancellations(
    conn: &mut SqliteConnection,
) -> Result<Vec<VoucherIssueRequest>, StorageError> {
    let requests = sqlx::query_as("SELECT * FROM voucher_issue_requests WHERE to_cancel = 1 ORDER BY id")
        .fetch_all(conn)
        .await?;
    Ok(requests)
}

pub async fn mark_cancellation_done(id: i64, conn: &mut SqliteConnection) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE voucher_issue_requests SET to_cancel = 0, cancelled_at = CURRENT_TIMESTAMP, updated_at = \
         CURRENT_TIMESTAMP WHERE id = $1",
    )
    .bind(id)
    .execute(conn)
    .await?;
    Ok(())
}

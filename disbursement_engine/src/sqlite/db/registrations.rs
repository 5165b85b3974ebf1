use log::debug;
use sqlx::SqliteConnection;

use crate::{
    attributes::{AttributeKind, AttributeSchema},
    db_types::{NewRegistration, ReferenceId, Registration, RegistrationStatus},
    scope::ScopeFilter,
    traits::StorageError,
};

/// Fetches a registration by reference id, restricted to the given scope. A row outside the
/// scope is reported as absent.
pub async fn fetch_registration(
    reference_id: &ReferenceId,
    scope: &ScopeFilter,
    conn: &mut SqliteConnection,
) -> Result<Option<Registration>, StorageError> {
    let registration: Option<Registration> = match scope.scope() {
        Some(scope) => {
            sqlx::query_as(
                "SELECT * FROM registrations WHERE reference_id = $1 AND (scope = $2 OR scope LIKE $2 || '.%')",
            )
            .bind(reference_id.as_str())
            .bind(scope)
            .fetch_optional(conn)
            .await?
        },
        None => {
            sqlx::query_as("SELECT * FROM registrations WHERE reference_id = $1")
                .bind(reference_id.as_str())
                .fetch_optional(conn)
                .await?
        },
    };
    Ok(registration)
}

pub async fn fetch_registration_by_id(
    id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Registration>, StorageError> {
    let registration =
        sqlx::query_as("SELECT * FROM registrations WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(registration)
}

/// Inserts the registration, returning `false` in the second parameter if the reference id
/// already exists.
pub async fn idempotent_insert(
    registration: NewRegistration,
    conn: &mut SqliteConnection,
) -> Result<(Registration, bool), StorageError> {
    if let Some(existing) = fetch_registration(&registration.reference_id, &ScopeFilter::all(), conn).await? {
        return Ok((existing, false));
    }
    let NewRegistration {
        reference_id,
        program_id,
        fsp,
        phone_number,
        payment_address,
        preferred_language,
        payment_amount_multiplier,
        scope,
    } = registration;
    let registration: Registration = sqlx::query_as(
        r#"
            INSERT INTO registrations (
                reference_id,
                program_id,
                fsp,
                phone_number,
                payment_address,
                preferred_language,
                payment_amount_multiplier,
                scope
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *;
        "#,
    )
    .bind(reference_id.0)
    .bind(program_id)
    .bind(fsp.to_string())
    .bind(phone_number)
    .bind(payment_address)
    .bind(preferred_language)
    .bind(payment_amount_multiplier)
    .bind(scope)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Registration [{}] inserted with id {}", registration.reference_id, registration.id);
    Ok((registration, true))
}

pub async fn update_status(
    reference_id: &ReferenceId,
    status: RegistrationStatus,
    conn: &mut SqliteConnection,
) -> Result<Registration, StorageError> {
    let result: Option<Registration> = sqlx::query_as(
        "UPDATE registrations SET status = $1, updated_at = CURRENT_TIMESTAMP WHERE reference_id = $2 RETURNING *",
    )
    .bind(status.to_string())
    .bind(reference_id.as_str())
    .fetch_optional(conn)
    .await?;
    result.ok_or_else(|| StorageError::RegistrationNotFound(reference_id.clone()))
}

pub async fn fetch_attribute_schema(
    program_id: i64,
    conn: &mut SqliteConnection,
) -> Result<AttributeSchema, StorageError> {
    let rows: Vec<(String, AttributeKind)> =
        sqlx::query_as("SELECT attribute_key, kind FROM program_attribute_schema WHERE program_id = $1")
            .bind(program_id)
            .fetch_all(conn)
            .await?;
    let mut schema = AttributeSchema::new(program_id);
    for (key, kind) in rows {
        schema.declare(&key, kind);
    }
    Ok(schema)
}

pub async fn declare_attribute(
    program_id: i64,
    key: &str,
    kind: AttributeKind,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
            INSERT INTO program_attribute_schema (program_id, attribute_key, kind) VALUES ($1, $2, $3)
            ON CONFLICT (program_id, attribute_key) DO UPDATE SET kind = excluded.kind
        "#,
    )
    .bind(program_id)
    .bind(key)
    .bind(kind.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

pub async fn fetch_attributes(
    registration_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<(String, String)>, StorageError> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT attribute_key, value FROM registration_attributes WHERE registration_id = $1")
            .bind(registration_id)
            .fetch_all(conn)
            .await?;
    Ok(rows)
}

pub async fn upsert_attribute(
    registration_id: i64,
    key: &str,
    value: &str,
    conn: &mut SqliteConnection,
) -> Result<(), StorageError> {
    sqlx::query(
        r#"
            INSERT INTO registration_attributes (registration_id, attribute_key, value) VALUES ($1, $2, $3)
            ON CONFLICT (registration_id, attribute_key) DO UPDATE SET value = excluded.value
        "#,
    )
    .bind(registration_id)
    .bind(key)
    .bind(value)
    .execute(conn)
    .await?;
    Ok(())
}

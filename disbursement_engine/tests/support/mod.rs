//! Shared setup for the integration tests: a throwaway SQLite database per test, with a seeded
//! program attribute schema and registration helpers.
#![allow(dead_code)]

use disbursement_engine::{
    attributes::AttributeKind,
    db_types::{Fsp, NewRegistration, ReferenceId, Registration},
    payment_objects::{visa_attributes, VisaPaymentDetails},
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{DisbursementDatabase, RegistrationManagement},
    SqliteDatabase,
};
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

pub const PROGRAM_ID: i64 = 3;

pub async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    for (key, kind) in VisaPaymentDetails::required_attributes() {
        db.declare_attribute(PROGRAM_ID, key, kind).await.expect("Error declaring attribute");
    }
    db.declare_attribute(PROGRAM_ID, "householdSize", AttributeKind::Number)
        .await
        .expect("Error declaring attribute");
    db
}

pub async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    if let Err(e) = db.close().await {
        error!("🚀️ Failed to close database: {e}");
    }
    Sqlite::drop_database(&url).await.unwrap();
}

/// A Visa registration with a complete set of card-issuance attributes. The last name doubles as
/// the mock provider's failure selector.
pub async fn seed_visa_registration(db: &SqliteDatabase, reference_id: &str, last_name: &str) -> Registration {
    let new_registration = NewRegistration::new(ReferenceId::from(reference_id), PROGRAM_ID, Fsp::IntersolveVisa)
        .with_phone_number("31612345678");
    let (registration, _) = db.insert_registration(new_registration).await.expect("Error inserting registration");
    let attributes = [
        (visa_attributes::FIRST_NAME, "Test"),
        (visa_attributes::LAST_NAME, last_name),
        (visa_attributes::ADDRESS_STREET, "Teststraat"),
        (visa_attributes::ADDRESS_HOUSE_NUMBER, "1"),
        (visa_attributes::ADDRESS_HOUSE_NUMBER_ADDITION, "A"),
        (visa_attributes::ADDRESS_POSTAL_CODE, "1234AB"),
        (visa_attributes::ADDRESS_CITY, "Den Haag"),
    ];
    for (key, value) in attributes {
        db.upsert_registration_attribute(registration.id, key, value)
            .await
            .expect("Error inserting attribute");
    }
    registration
}

pub async fn seed_voucher_registration(db: &SqliteDatabase, reference_id: &str, fsp: Fsp) -> Registration {
    assert!(fsp.is_voucher());
    let new_registration = NewRegistration::new(ReferenceId::from(reference_id), PROGRAM_ID, fsp)
        .with_phone_number("31612345678")
        .with_payment_address("31687654321");
    let (registration, _) = db.insert_registration(new_registration).await.expect("Error inserting registration");
    registration
}

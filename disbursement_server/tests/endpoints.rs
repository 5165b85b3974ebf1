use actix_web::{test, web, App};
use disbursement_engine::{
    db_types::{Fsp, NewRegistration, NewVoucher, ReferenceId},
    events::EventProducers,
    payment_objects::VisaPaymentDetails,
    test_utils::prepare_env::{prepare_test_env, random_db_path},
    traits::{DisbursementDatabase, RegistrationManagement, VoucherManagement},
    PaymentRunApi,
    SqliteDatabase,
    VisaOrchestrator,
    VoucherOrchestrator,
};
use dpg_common::Money;
use intersolve::mock::{MockVisaApi, MockVoucherApi};
use sqlx::{migrate::MigrateDatabase, Sqlite};

use disbursement_server::server::configure_routes;

const PROGRAM_ID: i64 = 3;

async fn setup() -> SqliteDatabase {
    let url = random_db_path();
    prepare_test_env(&url).await;
    let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
    for (key, kind) in VisaPaymentDetails::required_attributes() {
        db.declare_attribute(PROGRAM_ID, key, kind).await.unwrap();
    }
    db
}

async fn tear_down(mut db: SqliteDatabase) {
    let url = db.url().to_string();
    db.close().await.unwrap();
    Sqlite::drop_database(&url).await.unwrap();
}

macro_rules! test_app {
    ($db:expr, $visa:expr, $voucher:expr) => {{
        let producers = EventProducers::default();
        test::init_service(
            App::new()
                .app_data(web::Data::new(PaymentRunApi::new($db.clone())))
                .app_data(web::Data::new(VisaOrchestrator::new($db.clone(), $visa.clone(), producers.clone())))
                .app_data(web::Data::new(VoucherOrchestrator::new($db.clone(), $voucher.clone(), producers)))
                .configure(configure_routes::<MockVisaApi, MockVoucherApi>),
        )
        .await
    }};
}

#[actix_web::test]
async fn health_check() {
    let db = setup().await;
    let app = test_app!(db, MockVisaApi::default(), MockVoucherApi::new());
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    tear_down(db).await;
}

#[actix_web::test]
async fn payment_run_submission_reports_job_count_and_progress() {
    let db = setup().await;
    db.insert_registration(
        NewRegistration::new(ReferenceId::from("E-1"), PROGRAM_ID, Fsp::IntersolveVoucherPaper)
            .with_phone_number("31612345678"),
    )
    .await
    .unwrap();
    let app = test_app!(db, MockVisaApi::default(), MockVoucherApi::new());

    let req = test::TestRequest::post()
        .uri(&format!("/api/programs/{PROGRAM_ID}/payments"))
        .set_json(serde_json::json!({
            "paymentNr": 1,
            "transferAmount": 2500,
            "referenceIds": ["E-1", "E-unknown"]
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["jobCount"], 1);
    assert_eq!(body["skipped"][0], "E-unknown");

    let req = test::TestRequest::get()
        .uri(&format!("/api/programs/{PROGRAM_ID}/payments/progress"))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["pendingJobCount"], 1);
    tear_down(db).await;
}

#[actix_web::test]
async fn voucher_image_renders_a_png() {
    let db = setup().await;
    let (registration, _) = db
        .insert_registration(
            NewRegistration::new(ReferenceId::from("E-img"), PROGRAM_ID, Fsp::IntersolveVoucherPaper)
                .with_phone_number("31612345678"),
        )
        .await
        .unwrap();
    db.insert_voucher(NewVoucher {
        registration_id: registration.id,
        payment_nr: 2,
        barcode: "2668287205".to_string(),
        pin: "1234".to_string(),
        amount: Money::from_major(25),
        whatsapp_phone_number: None,
    })
    .await
    .unwrap();
    let app = test_app!(db, MockVisaApi::default(), MockVoucherApi::new());

    let req = test::TestRequest::get().uri("/api/registrations/E-img/vouchers/2/image").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    assert_eq!(resp.headers().get("content-type").unwrap(), "image/png");
    let body = test::read_body(resp).await;
    assert_eq!(&body[..8], &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]);

    // A cycle with no voucher is a 404, not an empty image.
    let req = test::TestRequest::get().uri("/api/registrations/E-img/vouchers/9/image").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
    tear_down(db).await;
}

#[actix_web::test]
async fn interim_delivery_statuses_are_acknowledged_without_effect() {
    let db = setup().await;
    let app = test_app!(db, MockVisaApi::default(), MockVoucherApi::new());
    let req = test::TestRequest::post()
        .uri("/callbacks/message-status")
        .set_json(serde_json::json!({
            "messageRef": "no-such-ref",
            "messageStatus": "sent"
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    tear_down(db).await;
}

#[actix_web::test]
async fn blocking_an_unknown_wallet_is_a_404() {
    let db = setup().await;
    let app = test_app!(db, MockVisaApi::default(), MockVoucherApi::new());
    let req = test::TestRequest::put().uri("/api/wallets/no-such-token/block").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status().as_u16(), 404);
    tear_down(db).await;
}

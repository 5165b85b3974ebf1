mod support;

use std::sync::{Arc, Mutex};

use disbursement_engine::{
    db_types::{Fsp, NewVoucher, TransactionStatus},
    events::{EventHandlers, EventHooks, EventProducers, MessageRequestEvent},
    traits::{TransactionManagement, VoucherManagement},
    OrchestrationError,
    VoucherOrchestrator,
};
use dpg_common::Money;
use futures_util::FutureExt;
use intersolve::{mock::MockVoucherApi, VoucherCredentials};

use support::{seed_voucher_registration, setup, tear_down};

fn credentials() -> VoucherCredentials {
    VoucherCredentials::new("intersolve-user", "intersolve-pass")
}

/// Captures message-request events so tests can assert on the notification boundary.
fn message_capture() -> (EventHandlers, Arc<Mutex<Vec<MessageRequestEvent>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = captured.clone();
    let mut hooks = EventHooks::default();
    hooks.on_message_request(move |event| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(event);
        }
        .boxed()
    });
    (EventHandlers::new(16, hooks), captured)
}

#[tokio::test]
async fn paper_voucher_is_issued_and_succeeds_synchronously() {
    let db = setup().await;
    let api = MockVoucherApi::new();
    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_voucher_registration(&db, "V-paper", Fsp::IntersolveVoucherPaper).await;

    let transaction = orchestrator
        .pay_beneficiary(&registration, 1, Money::from_major(25), &credentials())
        .await
        .expect("payment failed")
        .expect("payment skipped");

    assert_eq!(transaction.status, TransactionStatus::Success);
    let voucher = db.fetch_voucher(registration.id, 1).await.unwrap().expect("voucher missing");
    assert_eq!(voucher.amount, Money::from_major(25));
    assert!(!voucher.send, "a paper voucher is only claimed once spending is observed");
    assert!(voucher.whatsapp_phone_number.is_none());
    assert_eq!(api.voucher(&voucher.barcode).unwrap().amount, Money::from_major(25));
    tear_down(db).await;
}

#[tokio::test]
async fn whatsapp_voucher_waits_for_the_delivery_receipt() {
    let db = setup().await;
    let api = MockVoucherApi::new();
    let (handlers, captured) = message_capture();
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), producers);
    let registration = seed_voucher_registration(&db, "V-wa", Fsp::IntersolveVoucherWhatsapp).await;

    let transaction = orchestrator
        .pay_beneficiary(&registration, 1, Money::from_major(25), &credentials())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Waiting);
    let message_ref = transaction.message_ref.clone().expect("waiting transaction must carry a message ref");

    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    {
        let messages = captured.lock().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].template_key, "whatsappPayment");
        assert_eq!(messages[0].message_ref.as_deref(), Some(message_ref.as_str()));
    }

    let resolved = orchestrator
        .process_message_status(&message_ref, true, None)
        .await
        .unwrap()
        .expect("receipt must resolve the waiting transaction");
    assert_eq!(resolved.status, TransactionStatus::Success);
    assert_eq!(resolved.transaction_step, 2);

    let voucher = db.fetch_voucher(registration.id, 1).await.unwrap().unwrap();
    assert!(voucher.send, "confirmed delivery claims the voucher");

    // A duplicate receipt finds no waiting transaction and is a no-op.
    let duplicate = orchestrator.process_message_status(&message_ref, true, None).await.unwrap();
    assert!(duplicate.is_none());
    tear_down(db).await;
}

#[tokio::test]
async fn failed_delivery_marks_the_transaction_as_error() {
    let db = setup().await;
    let api = MockVoucherApi::new();
    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_voucher_registration(&db, "V-undelivered", Fsp::IntersolveVoucherWhatsapp).await;

    let transaction = orchestrator
        .pay_beneficiary(&registration, 1, Money::from_major(25), &credentials())
        .await
        .unwrap()
        .unwrap();
    let message_ref = transaction.message_ref.unwrap();

    let resolved = orchestrator
        .process_message_status(&message_ref, false, Some("Unknown destination (ErrorCode: 63003)"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.status, TransactionStatus::Error);
    let message = resolved.error_message.unwrap();
    assert!(message.contains("something went wrong in sending voucher"), "unexpected message: {message}");
    assert!(message.contains("63003"));

    let voucher = db.fetch_voucher(registration.id, 1).await.unwrap().unwrap();
    assert!(!voucher.send, "an undelivered voucher stays reusable");
    tear_down(db).await;
}

#[tokio::test]
async fn unclaimed_voucher_is_reused_instead_of_issuing_a_new_one() {
    let db = setup().await;
    let api = MockVoucherApi::new();
    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_voucher_registration(&db, "V-reuse", Fsp::IntersolveVoucherPaper).await;

    db.insert_voucher(NewVoucher {
        registration_id: registration.id,
        payment_nr: 1,
        barcode: "5550001".to_string(),
        pin: "4321".to_string(),
        amount: Money::from_major(25),
        whatsapp_phone_number: None,
    })
    .await
    .unwrap();

    let transaction = orchestrator
        .pay_beneficiary(&registration, 1, Money::from_major(25), &credentials())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Success);
    assert!(api.call_log().is_empty(), "an unclaimed voucher must be reused, not re-issued");
    tear_down(db).await;
}

#[tokio::test]
async fn claimed_voucher_aborts_without_a_duplicate() {
    let db = setup().await;
    let api = MockVoucherApi::new();
    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_voucher_registration(&db, "V-claimed", Fsp::IntersolveVoucherPaper).await;

    let voucher = db
        .insert_voucher(NewVoucher {
            registration_id: registration.id,
            payment_nr: 1,
            barcode: "5550002".to_string(),
            pin: "4321".to_string(),
            amount: Money::from_major(25),
            whatsapp_phone_number: None,
        })
        .await
        .unwrap();
    db.update_voucher(voucher.id, disbursement_engine::traits::VoucherUpdate::claimed()).await.unwrap();

    let result =
        orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25), &credentials()).await.unwrap();
    assert!(result.is_none(), "a claimed voucher must abort the job");
    assert!(api.call_log().is_empty());
    assert!(db.transactions_for_registration(registration.id).await.unwrap().is_empty());
    tear_down(db).await;
}

#[tokio::test]
async fn provider_rejection_marks_the_attempt_for_cancellation() {
    let db = setup().await;
    let api = MockVoucherApi::new();
    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_voucher_registration(&db, "V-rejected", Fsp::IntersolveVoucherPaper).await;

    api.fail_next_issue("Insufficient point-of-sale balance");
    let transaction = orchestrator
        .pay_beneficiary(&registration, 1, Money::from_major(25), &credentials())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Error);
    let message = transaction.error_message.unwrap();
    assert!(message.contains("Creating voucher failed. Status code:"), "unexpected message: {message}");

    let pending = db.pending_cancellations().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].card_id.is_none(), "no identifiers were returned, so the ref_pos is the handle");
    assert!(pending[0].ref_pos > 0);
    assert!(db.fetch_voucher(registration.id, 1).await.unwrap().is_none());
    tear_down(db).await;
}

#[tokio::test]
async fn missing_credentials_record_an_error_transaction() {
    let db = setup().await;
    let api = MockVoucherApi::new();
    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_voucher_registration(&db, "V-nocreds", Fsp::IntersolveVoucherPaper).await;

    let transaction = orchestrator
        .pay_beneficiary(&registration, 1, Money::from_major(25), &VoucherCredentials::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(transaction.status, TransactionStatus::Error);
    assert!(transaction.error_message.unwrap().contains("Error retrieving provider credentials"));
    assert!(api.call_log().is_empty(), "configuration errors must fail before any remote call");
    tear_down(db).await;
}

#[tokio::test]
async fn transport_failure_is_retryable_and_the_retry_succeeds() {
    let db = setup().await;
    let api = MockVoucherApi::new();
    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_voucher_registration(&db, "V-retry", Fsp::IntersolveVoucherPaper).await;

    api.drop_next_issue();
    let first = orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25), &credentials()).await;
    assert!(matches!(first, Err(OrchestrationError::ProviderUnavailable(_))));
    // The ambiguous attempt is marked for cancellation, in case it took effect remotely.
    assert_eq!(db.pending_cancellations().await.unwrap().len(), 1);

    let second = orchestrator
        .pay_beneficiary(&registration, 1, Money::from_major(25), &credentials())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.status, TransactionStatus::Success);
    assert!(db.fetch_voucher(registration.id, 1).await.unwrap().is_some());
    tear_down(db).await;
}

mod support;

use disbursement_engine::{
    db_types::Fsp,
    events::{EventHandlers, EventHooks, EventProducers},
    traits::{StaticSecrets, TransactionManagement, VoucherManagement},
    VoucherOrchestrator,
};
use dpg_common::Money;
use futures_util::FutureExt;
use intersolve::{
    mock::{CancelledVoucher, MockVoucherApi},
    VoucherCredentials,
};

use support::{seed_voucher_registration, setup, tear_down};

fn credentials() -> VoucherCredentials {
    VoucherCredentials::new("intersolve-user", "intersolve-pass")
}

fn secrets() -> StaticSecrets {
    StaticSecrets::new(credentials())
}

#[tokio::test]
async fn cancellation_sweep_retires_stuck_issuances_by_either_identifier() {
    let db = setup().await;
    let api = MockVoucherApi::new();
    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let reg_a = seed_voucher_registration(&db, "V-stuck-a", Fsp::IntersolveVoucherPaper).await;
    let reg_b = seed_voucher_registration(&db, "V-stuck-b", Fsp::IntersolveVoucherPaper).await;

    // One rejection where the provider already assigned identifiers, one without.
    api.fail_next_issue_with_identifiers("mocked rejection");
    orchestrator.pay_beneficiary(&reg_a, 1, Money::from_major(25), &credentials()).await.unwrap();
    api.fail_next_issue("mocked rejection");
    orchestrator.pay_beneficiary(&reg_b, 1, Money::from_major(25), &credentials()).await.unwrap();
    assert_eq!(db.pending_cancellations().await.unwrap().len(), 2);

    let cancelled = orchestrator.cancel_stuck_issuances(&secrets()).await.unwrap();
    assert_eq!(cancelled, 2);
    assert!(db.pending_cancellations().await.unwrap().is_empty());

    let calls = api.cancelled();
    assert!(calls.iter().any(|c| matches!(c, CancelledVoucher::ByCardId { .. })));
    assert!(calls.iter().any(|c| matches!(c, CancelledVoucher::ByRefPos(_))));

    // Re-running the sweep immediately is a no-op.
    assert_eq!(orchestrator.cancel_stuck_issuances(&secrets()).await.unwrap(), 0);
    tear_down(db).await;
}

#[tokio::test]
async fn balance_refresh_detects_spent_vouchers() {
    let db = setup().await;
    let api = MockVoucherApi::new();
    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let reg_spent = seed_voucher_registration(&db, "V-spent", Fsp::IntersolveVoucherPaper).await;
    let reg_untouched = seed_voucher_registration(&db, "V-untouched", Fsp::IntersolveVoucherPaper).await;

    orchestrator.pay_beneficiary(&reg_spent, 1, Money::from_major(25), &credentials()).await.unwrap();
    orchestrator.pay_beneficiary(&reg_untouched, 1, Money::from_major(25), &credentials()).await.unwrap();
    let spent = db.fetch_voucher(reg_spent.id, 1).await.unwrap().unwrap();

    // First pass: balances match the issue amount, nothing flips.
    assert_eq!(orchestrator.refresh_voucher_balances(&secrets(), 1000).await.unwrap(), 0);
    let voucher = db.fetch_voucher(reg_spent.id, 1).await.unwrap().unwrap();
    assert_eq!(voucher.last_requested_balance, Some(Money::from_major(25)));
    assert!(!voucher.balance_used);

    // The voucher is spent in person; the provider now reports a lower balance.
    api.set_balance(&spent.barcode, Money::from_major(4));
    assert_eq!(orchestrator.refresh_voucher_balances(&secrets(), 1000).await.unwrap(), 1);

    let voucher = db.fetch_voucher(reg_spent.id, 1).await.unwrap().unwrap();
    assert!(voucher.balance_used);
    assert!(voucher.send);
    assert_eq!(voucher.last_requested_balance, Some(Money::from_major(4)));
    let untouched = db.fetch_voucher(reg_untouched.id, 1).await.unwrap().unwrap();
    assert!(!untouched.balance_used);

    // Spent vouchers leave the unused set, so a re-run detects nothing new.
    assert_eq!(orchestrator.refresh_voucher_balances(&secrets(), 1000).await.unwrap(), 0);
    tear_down(db).await;
}

#[tokio::test]
async fn reminder_sweep_is_bounded_per_voucher() {
    let db = setup().await;
    let api = MockVoucherApi::new();

    let reminders = std::sync::Arc::new(std::sync::atomic::AtomicI32::new(0));
    let count = reminders.clone();
    let mut hooks = EventHooks::default();
    hooks.on_message_request(move |event| {
        let count = count.clone();
        async move {
            assert_eq!(event.template_key, "whatsappPaymentReminder");
            count.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
        .boxed()
    });
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let orchestrator = VoucherOrchestrator::new(db.clone(), api.clone(), producers);
    let registration = seed_voucher_registration(&db, "V-reminder", Fsp::IntersolveVoucherWhatsapp).await;
    db.insert_voucher(disbursement_engine::db_types::NewVoucher {
        registration_id: registration.id,
        payment_nr: 1,
        barcode: "5550003".to_string(),
        pin: "1111".to_string(),
        amount: Money::from_major(25),
        whatsapp_phone_number: Some("31687654321".to_string()),
    })
    .await
    .unwrap();

    // Not yet old enough for a reminder.
    assert_eq!(orchestrator.send_reminders(chrono::Duration::hours(24), 1).await.unwrap(), 0);

    tokio::time::sleep(std::time::Duration::from_millis(2000)).await;
    assert_eq!(orchestrator.send_reminders(chrono::Duration::seconds(1), 1).await.unwrap(), 1);
    let voucher = db.fetch_voucher(registration.id, 1).await.unwrap().unwrap();
    assert_eq!(voucher.reminder_count, 1);

    // The cap stops further reminders.
    assert_eq!(orchestrator.send_reminders(chrono::Duration::seconds(1), 1).await.unwrap(), 0);

    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    assert_eq!(reminders.load(std::sync::atomic::Ordering::SeqCst), 1);
    // No transactions are written by the reminder path.
    assert!(db.transactions_for_registration(registration.id).await.unwrap().is_empty());
    tear_down(db).await;
}

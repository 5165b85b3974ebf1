mod support;

use disbursement_engine::{
    db_types::{Fsp, NewRegistration, ReferenceId, TransactionStatus},
    events::EventProducers,
    traits::{InstrumentManagement, RegistrationManagement, TransactionManagement},
    OrchestrationError,
    VisaOrchestrator,
};
use dpg_common::Money;
use intersolve::mock::MockVisaApi;

use support::{seed_visa_registration, setup, tear_down};

#[tokio::test]
async fn fresh_beneficiary_provisions_the_full_chain() {
    let db = setup().await;
    let api = MockVisaApi::default();
    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_visa_registration(&db, "R-fresh", "de Vries").await;

    let transaction =
        orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await.expect("payment failed");

    assert_eq!(transaction.status, TransactionStatus::Success);
    assert_eq!(transaction.amount, Money::from_major(25));
    let customer = db.fetch_visa_customer(registration.id).await.unwrap().expect("customer missing");
    let wallets = db.fetch_wallets(customer.id).await.unwrap();
    assert_eq!(wallets.len(), 1);
    let wallet = &wallets[0];
    assert!(wallet.linked_to_customer);
    assert!(wallet.debit_card_created);
    assert_eq!(wallet.balance, Money::from_major(25));
    // The provider funds at wallet creation, so the chain ends at card creation with no separate
    // load call.
    assert_eq!(
        api.call_log(),
        vec!["create_customer", "create_wallet", "link_wallet_to_customer", "create_debit_card"]
    );
    tear_down(db).await;
}

#[tokio::test]
async fn create_customer_rejection_yields_an_error_transaction() {
    let db = setup().await;
    let api = MockVisaApi::default();
    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_visa_registration(&db, "R-reject", "mock-fail-create-customer").await;

    let transaction =
        orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await.expect("payment errored");

    assert_eq!(transaction.status, TransactionStatus::Error);
    let message = transaction.error_message.expect("error message missing");
    assert!(message.contains("CREATE CUSTOMER ERROR: NOT_FOUND"), "unexpected message: {message}");
    // The chain stops at the first failure; no customer or wallet is persisted.
    assert!(db.fetch_visa_customer(registration.id).await.unwrap().is_none());
    assert_eq!(api.call_log(), vec!["create_customer"]);
    tear_down(db).await;
}

/// Beneficiary R1, program 3, payment 1, amount 25: the first run creates the customer and
/// wallet but the link call drops with a transport failure. The retried job resumes at the link
/// step with the same wallet, then issues the card, and no duplicate rows exist.
#[tokio::test]
async fn retry_after_transport_failure_resumes_at_the_link_step() {
    let db = setup().await;
    let api = MockVisaApi::default();
    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_visa_registration(&db, "R1", "mock-drop-link-customer-wallet").await;

    let first = orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await;
    assert!(matches!(first, Err(OrchestrationError::ProviderUnavailable(_))), "expected a retryable failure");

    // Customer and wallet survived the failed attempt.
    let customer = db.fetch_visa_customer(registration.id).await.unwrap().expect("customer missing");
    let wallets = db.fetch_wallets(customer.id).await.unwrap();
    assert_eq!(wallets.len(), 1);
    let w1 = wallets[0].token_code.clone();
    assert!(!wallets[0].linked_to_customer);

    let second =
        orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await.expect("retry failed");
    assert_eq!(second.status, TransactionStatus::Success);

    let wallets = db.fetch_wallets(customer.id).await.unwrap();
    assert_eq!(wallets.len(), 1, "retry must not create a second wallet");
    assert_eq!(wallets[0].token_code, w1);
    assert!(wallets[0].linked_to_customer);
    assert!(wallets[0].debit_card_created);
    assert_eq!(
        api.call_log(),
        vec![
            "create_customer",
            "create_wallet",
            "link_wallet_to_customer", // dropped
            "link_wallet_to_customer",
            "create_debit_card"
        ]
    );
    tear_down(db).await;
}

#[tokio::test]
async fn repeat_cycle_takes_the_load_balance_branch_only() {
    let db = setup().await;
    let api = MockVisaApi::default();
    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_visa_registration(&db, "R-repeat", "Jansen").await;

    orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await.expect("first cycle failed");
    let calls_after_first = api.call_log().len();

    let second =
        orchestrator.pay_beneficiary(&registration, 2, Money::from_major(25)).await.expect("second cycle failed");
    assert_eq!(second.status, TransactionStatus::Success);

    let mut full_log = api.call_log();
    let new_calls = full_log.split_off(calls_after_first);
    assert_eq!(new_calls, vec!["load_balance"], "a provisioned instrument must only be topped up");

    let customer = db.fetch_visa_customer(registration.id).await.unwrap().unwrap();
    let wallets = db.fetch_wallets(customer.id).await.unwrap();
    assert_eq!(wallets.len(), 1);
    assert_eq!(wallets[0].balance, Money::from_major(50));
    tear_down(db).await;
}

#[tokio::test]
async fn redelivered_job_for_a_disbursed_cycle_is_a_no_op() {
    let db = setup().await;
    let api = MockVisaApi::default();
    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_visa_registration(&db, "R-redelivery", "Jansen").await;

    let first = orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await.unwrap();
    let calls_after_first = api.call_log();

    let second = orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await.unwrap();
    assert_eq!(second.id, first.id, "redelivery must return the existing ledger entry");
    assert_eq!(api.call_log(), calls_after_first, "redelivery must not touch the provider");

    let transactions = db.transactions_for_registration(registration.id).await.unwrap();
    assert_eq!(transactions.len(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn missing_attributes_fail_fast_without_remote_calls() {
    let db = setup().await;
    let api = MockVisaApi::default();
    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    // Registered, but no attributes seeded at all.
    let (registration, _) = db
        .insert_registration(
            NewRegistration::new(ReferenceId::from("R-bare"), support::PROGRAM_ID, Fsp::IntersolveVisa)
                .with_phone_number("31612345678"),
        )
        .await
        .unwrap();

    let result = orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await;
    assert!(matches!(result, Err(OrchestrationError::Attribute(_))));
    assert!(api.call_log().is_empty(), "no provider call may happen before configuration validates");
    tear_down(db).await;
}

mod support;

use std::sync::{
    atomic::{AtomicI32, Ordering},
    Arc,
};

use chrono::Utc;
use disbursement_engine::{
    db_types::{NewVisaWallet, WalletStatus},
    events::{EventHandlers, EventHooks, EventProducers},
    scope::ScopeFilter,
    traits::{InstrumentManagement, WalletUpdate},
    OrchestrationError,
    VisaOrchestrator,
};
use dpg_common::Money;
use futures_util::FutureExt;
use intersolve::{mock::MockVisaApi, VisaApi};
use log::*;

use support::{seed_visa_registration, setup, tear_down};

#[tokio::test]
async fn toggle_block_updates_provider_and_local_flag() {
    let db = setup().await;
    let api = MockVisaApi::default();
    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_visa_registration(&db, "R-block", "Jansen").await;
    orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await.unwrap();
    let customer = db.fetch_visa_customer(registration.id).await.unwrap().unwrap();
    let token = db.fetch_wallets(customer.id).await.unwrap()[0].token_code.clone();

    let wallet = orchestrator.toggle_block_wallet(&token, true).await.expect("block failed");
    assert!(wallet.token_blocked);
    assert!(api.wallet(&token).unwrap().blocked);

    // Blocking an already blocked wallet is reported by the provider as already-in-state, which
    // still counts as success.
    let wallet = orchestrator.toggle_block_wallet(&token, true).await.expect("re-block failed");
    assert!(wallet.token_blocked);

    let wallet = orchestrator.toggle_block_wallet(&token, false).await.expect("unblock failed");
    assert!(!wallet.token_blocked);
    assert!(!api.wallet(&token).unwrap().blocked);
    tear_down(db).await;
}

#[tokio::test]
async fn reissue_transfers_balance_and_blocks_the_old_wallet() {
    let db = setup().await;
    let api = MockVisaApi::default();
    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_visa_registration(&db, "R-reissue", "Jansen").await;
    orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await.unwrap();
    let customer = db.fetch_visa_customer(registration.id).await.unwrap().unwrap();
    let old_token = db.fetch_wallets(customer.id).await.unwrap()[0].token_code.clone();

    // The beneficiary spent part of the balance in the meantime.
    api.record_charge(&old_token, Money::from_major(15), Utc::now());

    orchestrator
        .reissue_wallet_and_card(&registration.reference_id, &ScopeFilter::all())
        .await
        .expect("reissue failed");

    let wallets = db.fetch_wallets(customer.id).await.unwrap();
    assert_eq!(wallets.len(), 2);
    let new_wallet = &wallets[0];
    let old_wallet = &wallets[1];
    assert_eq!(old_wallet.token_code, old_token);
    assert!(old_wallet.token_blocked, "the replaced wallet must end up blocked");
    assert!(new_wallet.linked_to_customer);
    assert!(new_wallet.debit_card_created);
    assert_eq!(new_wallet.balance, Money::from_major(10), "the remaining balance moves to the new wallet");
    // Provider-side: the old wallet is drained and blocked, the new one carries the balance.
    assert_eq!(api.wallet(&old_token).unwrap().balance, Money::from(0));
    assert!(api.wallet(&old_token).unwrap().blocked);
    assert_eq!(api.wallet(&new_wallet.token_code).unwrap().balance, Money::from_major(10));
    tear_down(db).await;
}

/// When linking the new wallet fails, the old wallet must end up blocked and the new wallet row
/// must be removed again, leaving no orphaned unlinked wallet behind.
#[tokio::test]
async fn reissue_link_failure_blocks_old_wallet_and_removes_the_new_row() {
    let db = setup().await;
    let api = MockVisaApi::default();
    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_visa_registration(&db, "R-reissue-fail", "Jansen").await;

    // Provision the existing instrument by hand with a holder id that makes link calls fail.
    let holder_id = "mock-fail-link-customer-wallet";
    let customer = db.insert_visa_customer(registration.id, holder_id).await.unwrap();
    let token = api.create_wallet(holder_id, Money::from_major(25)).await.unwrap();
    let old_token = token.code.clone();
    db.insert_wallet(customer.id, NewVisaWallet {
        token_code: token.code,
        balance: Money::from_major(25),
        status: WalletStatus::Active,
        token_blocked: false,
    })
    .await
    .unwrap();
    db.update_wallet(
        &old_token,
        WalletUpdate { linked_to_customer: Some(true), debit_card_created: Some(true), ..Default::default() },
    )
    .await
    .unwrap();

    let result = orchestrator.reissue_wallet_and_card(&registration.reference_id, &ScopeFilter::all()).await;
    let Err(OrchestrationError::StepFailed(message)) = result else {
        panic!("expected the link step to fail, got {result:?}");
    };
    assert!(message.contains("LINK CUSTOMER ERROR"), "unexpected message: {message}");

    let wallets = db.fetch_wallets(customer.id).await.unwrap();
    assert_eq!(wallets.len(), 1, "the unlinked replacement wallet must be removed");
    assert_eq!(wallets[0].token_code, old_token);
    assert!(wallets[0].token_blocked, "the old wallet must be re-blocked by the compensation");
    assert!(api.wallet(&old_token).unwrap().blocked);
    tear_down(db).await;
}

/// A failed compensation leaves the instrument neither old-blocked nor new-issued, so it raises
/// an operator alert on top of the original error.
#[tokio::test]
async fn failed_compensation_raises_an_operator_alert() {
    let db = setup().await;
    let api = MockVisaApi::default();

    let alerts = Arc::new(AtomicI32::new(0));
    let alert_count = alerts.clone();
    let mut hooks = EventHooks::default();
    hooks.on_compensation_failed(move |alert| {
        let alerts = alert_count.clone();
        async move {
            info!("🪝️ {alert:?}");
            alerts.fetch_add(1, Ordering::SeqCst);
        }
        .boxed()
    });
    let handlers = EventHandlers::new(16, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), producers);
    let registration = seed_visa_registration(&db, "R-alert", "Jansen").await;

    // Link fails AND the compensating block fails.
    let holder_id = "mock-fail-link-customer-wallet-mock-fail-block-wallet";
    let customer = db.insert_visa_customer(registration.id, holder_id).await.unwrap();
    let token = api.create_wallet(holder_id, Money::from_major(25)).await.unwrap();
    db.insert_wallet(customer.id, NewVisaWallet {
        token_code: token.code.clone(),
        balance: Money::from_major(25),
        status: WalletStatus::Active,
        token_blocked: false,
    })
    .await
    .unwrap();
    db.update_wallet(
        &token.code,
        WalletUpdate { linked_to_customer: Some(true), debit_card_created: Some(true), ..Default::default() },
    )
    .await
    .unwrap();

    let result = orchestrator.reissue_wallet_and_card(&registration.reference_id, &ScopeFilter::all()).await;
    let Err(OrchestrationError::StepFailed(message)) = result else {
        panic!("expected the link step to fail, got {result:?}");
    };
    assert!(message.contains("LINK CUSTOMER ERROR"), "the compensation failure must not mask the original error");

    // The alert is handled asynchronously.
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    assert_eq!(alerts.load(Ordering::SeqCst), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn wallet_details_are_refreshed_from_the_provider() {
    let db = setup().await;
    let api = MockVisaApi::default();
    let orchestrator = VisaOrchestrator::new(db.clone(), api.clone(), EventProducers::default());
    let registration = seed_visa_registration(&db, "R-details", "Jansen").await;
    orchestrator.pay_beneficiary(&registration, 1, Money::from_major(25)).await.unwrap();
    let customer = db.fetch_visa_customer(registration.id).await.unwrap().unwrap();
    let token = db.fetch_wallets(customer.id).await.unwrap()[0].token_code.clone();

    let spent_at = Utc::now();
    api.record_charge(&token, Money::from_major(5), spent_at);

    let views = orchestrator.wallet_details(&registration.reference_id, &ScopeFilter::all()).await.unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].balance, Money::from_major(20));
    assert_eq!(views[0].status, WalletStatus::Active);
    assert!(views[0].last_used_at.is_some());

    // The refreshed values are persisted, not just reported.
    let wallet = db.fetch_wallet_by_token(&token).await.unwrap().unwrap();
    assert_eq!(wallet.balance, Money::from_major(20));
    assert!(wallet.last_used_at.is_some());
    tear_down(db).await;
}

mod support;

use std::time::Duration;

use disbursement_engine::{
    db_types::{Fsp, JobStatus, ReferenceId, TransactionStatus},
    events::EventProducers,
    payment_objects::PaymentRunRequest,
    queue::{start_visa_workers, start_voucher_workers, WorkerConfig},
    scope::ScopeFilter,
    traits::{JobManagement, StaticSecrets, TransactionManagement},
    PaymentRunApi,
};
use dpg_common::Money;
use intersolve::{
    mock::{MockVisaApi, MockVoucherApi},
    VoucherCredentials,
};

use support::{seed_visa_registration, seed_voucher_registration, setup, tear_down, PROGRAM_ID};

fn run_request(payment_nr: i64, reference_ids: &[&str]) -> PaymentRunRequest {
    PaymentRunRequest {
        payment_nr,
        transfer_amount: Money::from_major(25),
        reference_ids: reference_ids.iter().map(|r| ReferenceId::from(*r)).collect(),
    }
}

#[tokio::test]
async fn submitting_a_run_enqueues_one_job_per_beneficiary() {
    let db = setup().await;
    let api = PaymentRunApi::new(db.clone());
    seed_visa_registration(&db, "Q-visa", "Jansen").await;
    seed_voucher_registration(&db, "Q-voucher", Fsp::IntersolveVoucherPaper).await;

    let summary = api
        .submit_payment_run(PROGRAM_ID, run_request(1, &["Q-visa", "Q-voucher", "Q-unknown"]), &ScopeFilter::all())
        .await
        .unwrap();
    assert_eq!(summary.job_count, 2);
    assert_eq!(summary.skipped, vec![ReferenceId::from("Q-unknown")]);
    assert_eq!(api.pending_job_count(PROGRAM_ID).await.unwrap(), 2);

    // Re-submitting while the jobs are still queued adds nothing.
    let summary = api
        .submit_payment_run(PROGRAM_ID, run_request(1, &["Q-visa", "Q-voucher"]), &ScopeFilter::all())
        .await
        .unwrap();
    assert_eq!(summary.job_count, 0);
    assert_eq!(api.pending_job_count(PROGRAM_ID).await.unwrap(), 2);
    tear_down(db).await;
}

#[tokio::test]
async fn multiplier_scales_the_job_amount() {
    let db = setup().await;
    let api = PaymentRunApi::new(db.clone());
    let registration = seed_visa_registration(&db, "Q-multi", "Jansen").await;
    sqlx::query("UPDATE registrations SET payment_amount_multiplier = 3 WHERE id = $1")
        .bind(registration.id)
        .execute(db.pool())
        .await
        .unwrap();

    api.submit_payment_run(PROGRAM_ID, run_request(1, &["Q-multi"]), &ScopeFilter::all()).await.unwrap();
    let job = db.claim_next_job(&[Fsp::IntersolveVisa]).await.unwrap().expect("job missing");
    assert_eq!(job.amount, Money::from_major(75));
    tear_down(db).await;
}

#[tokio::test]
async fn scoped_submission_skips_out_of_scope_beneficiaries() {
    let db = setup().await;
    let api = PaymentRunApi::new(db.clone());
    let registration = seed_visa_registration(&db, "Q-scoped", "Jansen").await;
    sqlx::query("UPDATE registrations SET scope = 'utrecht' WHERE id = $1")
        .bind(registration.id)
        .execute(db.pool())
        .await
        .unwrap();

    let summary = api
        .submit_payment_run(PROGRAM_ID, run_request(1, &["Q-scoped"]), &ScopeFilter::scoped("zeeland"))
        .await
        .unwrap();
    assert_eq!(summary.job_count, 0);
    assert_eq!(summary.skipped.len(), 1);

    let summary = api
        .submit_payment_run(PROGRAM_ID, run_request(1, &["Q-scoped"]), &ScopeFilter::scoped("utrecht"))
        .await
        .unwrap();
    assert_eq!(summary.job_count, 1);
    tear_down(db).await;
}

#[tokio::test]
async fn claims_are_atomic_and_count_attempts() {
    let db = setup().await;
    let api = PaymentRunApi::new(db.clone());
    seed_visa_registration(&db, "Q-claim", "Jansen").await;
    api.submit_payment_run(PROGRAM_ID, run_request(1, &["Q-claim"]), &ScopeFilter::all()).await.unwrap();

    let job = db.claim_next_job(&[Fsp::IntersolveVisa]).await.unwrap().expect("claim failed");
    assert_eq!(job.status, JobStatus::Running);
    assert_eq!(job.attempts, 1);
    // The queue is empty while the job is in flight.
    assert!(db.claim_next_job(&[Fsp::IntersolveVisa]).await.unwrap().is_none());
    // Voucher workers never see visa jobs.
    assert!(db.claim_next_job(Fsp::voucher_family()).await.unwrap().is_none());

    let released = db.release_job(job.id, "simulated failure").await.unwrap();
    assert_eq!(released.status, JobStatus::Queued);
    let job = db.claim_next_job(&[Fsp::IntersolveVisa]).await.unwrap().expect("re-claim failed");
    assert_eq!(job.attempts, 2);

    let done = db.complete_job(job.id, JobStatus::Failed, Some("gave up")).await.unwrap();
    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(api.pending_job_count(PROGRAM_ID).await.unwrap(), 0);
    tear_down(db).await;
}

async fn wait_for_drained_queue(api: &PaymentRunApi<disbursement_engine::SqliteDatabase>) {
    for _ in 0..100 {
        if api.pending_job_count(PROGRAM_ID).await.unwrap() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("queue did not drain in time");
}

#[tokio::test]
async fn workers_drain_the_queue_and_write_the_ledger() {
    let db = setup().await;
    let api = PaymentRunApi::new(db.clone());
    let visa_api = MockVisaApi::default();
    let voucher_api = MockVoucherApi::new();
    let secrets = StaticSecrets::new(VoucherCredentials::new("user", "pass"));
    let visa_reg = seed_visa_registration(&db, "Q-e2e-visa", "Jansen").await;
    let voucher_reg = seed_voucher_registration(&db, "Q-e2e-voucher", Fsp::IntersolveVoucherPaper).await;

    let config = WorkerConfig { concurrency: 2, poll_interval: Duration::from_millis(50) };
    let mut handles =
        start_visa_workers(db.clone(), visa_api.clone(), EventProducers::default(), config);
    handles.extend(start_voucher_workers(
        db.clone(),
        voucher_api.clone(),
        secrets,
        EventProducers::default(),
        config,
    ));

    let summary = api
        .submit_payment_run(PROGRAM_ID, run_request(1, &["Q-e2e-visa", "Q-e2e-voucher"]), &ScopeFilter::all())
        .await
        .unwrap();
    assert_eq!(summary.job_count, 2);

    wait_for_drained_queue(&api).await;
    for handle in handles {
        handle.abort();
    }

    let visa_txs = db.transactions_for_registration(visa_reg.id).await.unwrap();
    assert_eq!(visa_txs.len(), 1);
    assert_eq!(visa_txs[0].status, TransactionStatus::Success);
    let voucher_txs = db.transactions_for_registration(voucher_reg.id).await.unwrap();
    assert_eq!(voucher_txs.len(), 1);
    assert_eq!(voucher_txs[0].status, TransactionStatus::Success);
    tear_down(db).await;
}

/// A provider outage exhausts the job's attempt budget; the job is then recorded as a
/// permanently failed transaction instead of being dropped.
#[tokio::test]
async fn exhausted_retries_leave_a_failed_ledger_entry() {
    let db = setup().await;
    let api = PaymentRunApi::new(db.clone());
    let visa_api = MockVisaApi::default();
    let registration = seed_visa_registration(&db, "Q-outage", "mock-outage-create-wallet").await;

    let config = WorkerConfig { concurrency: 1, poll_interval: Duration::from_millis(50) };
    let handles = start_visa_workers(db.clone(), visa_api.clone(), EventProducers::default(), config);

    api.submit_payment_run(PROGRAM_ID, run_request(1, &["Q-outage"]), &ScopeFilter::all()).await.unwrap();
    wait_for_drained_queue(&api).await;
    for handle in handles {
        handle.abort();
    }

    let transactions = db.transactions_for_registration(registration.id).await.unwrap();
    assert_eq!(transactions.len(), 1, "exhausted retries must still produce a ledger entry");
    assert_eq!(transactions[0].status, TransactionStatus::Error);
    assert!(transactions[0].error_message.as_deref().unwrap().contains("CREATE WALLET ERROR"));
    // Exactly one wallet-creation attempt per retry, and a bounded number of retries.
    let attempts = visa_api.call_log().iter().filter(|c| c.as_str() == "create_wallet").count();
    assert_eq!(attempts, 3);
    tear_down(db).await;
}

//! Periodic reconciliation sweeps.
//!
//! Each sweep runs on its own timer and repairs one kind of drift between local bookkeeping and
//! provider-side truth. All sweeps are idempotent and safe to run concurrently with live payment
//! processing, so the workers simply loop forever.
use log::*;
use tokio::task::JoinHandle;

use disbursement_engine::{
    events::EventProducers,
    traits::{DisbursementDatabase, SecretsProvider},
    VisaOrchestrator,
    VoucherOrchestrator,
};
use intersolve::{VisaApi, VoucherApi};

use crate::config::SweepConfig;

/// Starts all reconciliation workers. Do not await the returned handles, they run indefinitely.
pub fn start_reconciliation_workers<B, V, W, S>(
    db: B,
    visa: V,
    voucher: W,
    secrets: S,
    producers: EventProducers,
    config: SweepConfig,
) -> Vec<JoinHandle<()>>
where
    B: DisbursementDatabase + 'static,
    V: VisaApi + 'static,
    W: VoucherApi + 'static,
    S: SecretsProvider + 'static,
{
    let mut handles = Vec::with_capacity(4);

    {
        let orchestrator = VoucherOrchestrator::new(db.clone(), voucher.clone(), producers.clone());
        let secrets = secrets.clone();
        handles.push(tokio::spawn(async move {
            let mut timer = tokio::time::interval(config.cancel_interval);
            info!("🕰️ Stuck-issuance cancellation worker started");
            loop {
                timer.tick().await;
                match orchestrator.cancel_stuck_issuances(&secrets).await {
                    Ok(n) => info!("🕰️ Cancellation sweep complete, {n} stuck issuances retired"),
                    Err(e) => error!("🕰️ Error running cancellation sweep: {e}"),
                }
            }
        }));
    }

    {
        let orchestrator = VoucherOrchestrator::new(db.clone(), voucher.clone(), producers.clone());
        let secrets = secrets.clone();
        let batch_size = config.batch_size;
        handles.push(tokio::spawn(async move {
            let mut timer = tokio::time::interval(config.balance_refresh_interval);
            info!("🕰️ Voucher balance refresh worker started");
            loop {
                timer.tick().await;
                match orchestrator.refresh_voucher_balances(&secrets, batch_size).await {
                    Ok(n) => info!("🕰️ Balance refresh complete, {n} vouchers newly detected as spent"),
                    Err(e) => error!("🕰️ Error running balance refresh sweep: {e}"),
                }
            }
        }));
    }

    {
        let orchestrator = VoucherOrchestrator::new(db.clone(), voucher, producers.clone());
        let reminder_after = config.reminder_after;
        let max_reminders = config.max_reminders;
        handles.push(tokio::spawn(async move {
            let mut timer = tokio::time::interval(config.reminder_interval);
            info!("🕰️ Voucher reminder worker started");
            loop {
                timer.tick().await;
                match orchestrator.send_reminders(reminder_after, max_reminders).await {
                    Ok(n) => info!("🕰️ Reminder sweep complete, {n} reminders sent"),
                    Err(e) => error!("🕰️ Error running reminder sweep: {e}"),
                }
            }
        }));
    }

    {
        let orchestrator = VisaOrchestrator::new(db, visa, producers);
        let batch_size = config.batch_size;
        handles.push(tokio::spawn(async move {
            let mut timer = tokio::time::interval(config.wallet_refresh_interval);
            info!("🕰️ Wallet details refresh worker started");
            loop {
                timer.tick().await;
                match orchestrator.refresh_all_wallets(batch_size).await {
                    Ok(n) => info!("🕰️ Wallet refresh complete, {n} wallets updated"),
                    Err(e) => error!("🕰️ Error running wallet refresh sweep: {e}"),
                }
            }
        }));
    }

    handles
}

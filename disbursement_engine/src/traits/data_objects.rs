use chrono::{DateTime, Utc};
use dpg_common::Money;

use crate::db_types::WalletStatus;

/// A partial update to a wallet row. Only the provisioning milestones and provider-reported
/// details can change; identity fields are immutable.
#[derive(Debug, Clone, Default)]
pub struct WalletUpdate {
    pub linked_to_customer: Option<bool>,
    pub debit_card_created: Option<bool>,
    pub token_blocked: Option<bool>,
    pub status: Option<WalletStatus>,
    pub balance: Option<Money>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl WalletUpdate {
    pub fn is_empty(&self) -> bool {
        self.linked_to_customer.is_none()
            && self.debit_card_created.is_none()
            && self.token_blocked.is_none()
            && self.status.is_none()
            && self.balance.is_none()
            && self.last_used_at.is_none()
    }

    pub fn linked() -> Self {
        Self { linked_to_customer: Some(true), ..Default::default() }
    }

    pub fn card_created() -> Self {
        Self { debit_card_created: Some(true), ..Default::default() }
    }

    pub fn blocked(block: bool) -> Self {
        Self { token_blocked: Some(block), ..Default::default() }
    }
}

/// A partial update to a voucher row. The `send` and `balance_used` flags only ever move from
/// false to true, which keeps concurrent sweeps safe without row locking.
#[derive(Debug, Clone, Default)]
pub struct VoucherUpdate {
    pub send: Option<bool>,
    pub balance_used: Option<bool>,
    pub last_requested_balance: Option<Money>,
    pub balance_checked_at: Option<DateTime<Utc>>,
    pub reminder_count: Option<i64>,
}

impl VoucherUpdate {
    pub fn is_empty(&self) -> bool {
        self.send.is_none()
            && self.balance_used.is_none()
            && self.last_requested_balance.is_none()
            && self.balance_checked_at.is_none()
            && self.reminder_count.is_none()
    }

    pub fn claimed() -> Self {
        Self { send: Some(true), ..Default::default() }
    }
}

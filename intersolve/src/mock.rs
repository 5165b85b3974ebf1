//! In-memory provider implementations for tests and demo environments.
//!
//! Failure branches are selected by magic markers in the payload, the same mechanism the hosted
//! demo environment uses: a beneficiary whose last name contains `mock-fail-create-customer`
//! fails at the create-customer step, and so on. The marker travels in the holder id so that
//! later steps of the chain can be targeted. A `mock-drop-<step>` marker fails that step exactly
//! once with a transport error, which is how tests simulate a network outage and the queue's
//! retry behaviour.
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Utc};
use dpg_common::Money;
use log::*;

use crate::{
    data_objects::{
        Address,
        CreateCustomerRequest,
        CreateDebitCardRequest,
        CustomerInfo,
        IssueVoucherResponse,
        TokenInfo,
        ToggleOutcome,
        VoucherResultCode,
        WalletDetails,
        WalletTransaction,
    },
    visa::VisaApi,
    voucher::{VoucherApi, VoucherCredentials},
    IntersolveError,
};

//--------------------------------------     MockVisaApi     ---------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MockWalletSnapshot {
    pub holder_id: String,
    pub balance: Money,
    pub blocked: bool,
    pub linked: bool,
    pub carded: bool,
    pub active: bool,
}

#[derive(Debug, Default)]
struct MockVisaState {
    counter: u64,
    tripped: HashSet<String>,
    wallets: HashMap<String, MockWallet>,
    charges: HashMap<String, Vec<DateTime<Utc>>>,
    calls: Vec<String>,
}

#[derive(Debug)]
struct MockWallet {
    holder_id: String,
    balance: Money,
    blocked: bool,
    linked: bool,
    carded: bool,
    active: bool,
}

#[derive(Clone)]
pub struct MockVisaApi {
    state: Arc<Mutex<MockVisaState>>,
    fund_on_creation: bool,
    asset_code: String,
}

impl Default for MockVisaApi {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MockVisaApi {
    pub fn new(fund_on_creation: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(MockVisaState::default())),
            fund_on_creation,
            asset_code: "EUR".to_string(),
        }
    }

    /// All provider operations invoked so far, in order, e.g. `["create_customer", "load_balance"]`.
    pub fn call_log(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn wallet(&self, token_code: &str) -> Option<MockWalletSnapshot> {
        self.state.lock().unwrap().wallets.get(token_code).map(|w| MockWalletSnapshot {
            holder_id: w.holder_id.clone(),
            balance: w.balance,
            blocked: w.blocked,
            linked: w.linked,
            carded: w.carded,
            active: w.active,
        })
    }

    /// Record a provider-side charge against the wallet, as the card network would.
    pub fn record_charge(&self, token_code: &str, amount: Money, at: DateTime<Utc>) {
        let mut state = self.state.lock().unwrap();
        if let Some(w) = state.wallets.get_mut(token_code) {
            w.balance -= amount;
        }
        state.charges.entry(token_code.to_string()).or_default().push(at);
    }

    /// Fails with a validation error when `subject` carries the permanent marker for `step`, with
    /// a one-shot transport error for the `mock-drop` marker, or with a persistent transport
    /// error for the `mock-outage` marker.
    fn check_marker(state: &mut MockVisaState, subject: &str, step: &str) -> Result<(), IntersolveError> {
        let subject = subject.to_lowercase();
        if subject.contains(&format!("mock-fail-{step}")) {
            return Err(IntersolveError::Validation {
                code: "NOT_FOUND".to_string(),
                description: format!("We mocked that {step} failed"),
            });
        }
        if subject.contains(&format!("mock-outage-{step}")) {
            return Err(IntersolveError::Unavailable("mocked provider outage".to_string()));
        }
        let drop_marker = format!("mock-drop-{step}");
        if subject.contains(&drop_marker) && state.tripped.insert(drop_marker) {
            return Err(IntersolveError::Unavailable("mocked transport failure".to_string()));
        }
        Ok(())
    }
}

impl VisaApi for MockVisaApi {
    async fn create_customer(&self, request: &CreateCustomerRequest) -> Result<CustomerInfo, IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create_customer".to_string());
        let last_name = request.individual.last_name.to_lowercase();
        if last_name.contains("mock-fail-create-customer") {
            return Err(IntersolveError::Validation {
                code: "NOT_FOUND".to_string(),
                description: "We mocked that creating customer failed".to_string(),
            });
        }
        // Downstream failure markers ride along in the holder id.
        let holder_id = if last_name.contains("mock-") {
            last_name
        } else {
            state.counter += 1;
            format!("mock-holder-{}", state.counter)
        };
        debug!("💳️ [mock] customer {holder_id} created");
        Ok(CustomerInfo {
            id: holder_id,
            external_reference: Some(request.external_reference.clone()),
            blocked: false,
        })
    }

    async fn create_wallet(&self, holder_id: &str, amount: Money) -> Result<TokenInfo, IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create_wallet".to_string());
        Self::check_marker(&mut state, holder_id, "create-wallet")?;
        state.counter += 1;
        let code = format!("mock-token-{}", state.counter);
        state.wallets.insert(code.clone(), MockWallet {
            holder_id: holder_id.to_string(),
            balance: amount,
            blocked: false,
            linked: false,
            carded: false,
            active: true,
        });
        debug!("💳️ [mock] wallet {code} created for {holder_id} with {amount}");
        Ok(TokenInfo { code, blocked: false, status: Some("ACTIVE".to_string()), balances: Vec::new() })
    }

    async fn link_wallet_to_customer(&self, holder_id: &str, token_code: &str) -> Result<(), IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("link_wallet_to_customer".to_string());
        Self::check_marker(&mut state, holder_id, "link-customer-wallet")?;
        match state.wallets.get_mut(token_code) {
            Some(wallet) => {
                wallet.linked = true;
                Ok(())
            },
            None => Err(IntersolveError::Validation {
                code: "TOKEN_NOT_FOUND".to_string(),
                description: format!("No token with code {token_code}"),
            }),
        }
    }

    async fn create_debit_card(
        &self,
        token_code: &str,
        request: &CreateDebitCardRequest,
    ) -> Result<(), IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("create_debit_card".to_string());
        Self::check_marker(&mut state, &request.last_name, "create-debit-card")?;
        match state.wallets.get_mut(token_code) {
            Some(wallet) => {
                wallet.carded = true;
                Ok(())
            },
            None => Err(IntersolveError::Validation {
                code: "TOKEN_NOT_FOUND".to_string(),
                description: format!("No token with code {token_code}"),
            }),
        }
    }

    async fn load_balance(&self, token_code: &str, amount: Money, _sale_id: &str) -> Result<(), IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("load_balance".to_string());
        let holder = state.wallets.get(token_code).map(|w| w.holder_id.clone()).unwrap_or_default();
        Self::check_marker(&mut state, &holder, "load-balance")?;
        match state.wallets.get_mut(token_code) {
            Some(wallet) => {
                wallet.balance += amount;
                Ok(())
            },
            None => Err(IntersolveError::Validation {
                code: "TOKEN_NOT_FOUND".to_string(),
                description: format!("No token with code {token_code}"),
            }),
        }
    }

    async fn unload_balance(&self, token_code: &str, amount: Money) -> Result<(), IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("unload_balance".to_string());
        match state.wallets.get_mut(token_code) {
            Some(wallet) => {
                wallet.balance -= amount;
                Ok(())
            },
            None => Err(IntersolveError::Validation {
                code: "TOKEN_NOT_FOUND".to_string(),
                description: format!("No token with code {token_code}"),
            }),
        }
    }

    async fn get_wallet(&self, token_code: &str) -> Result<WalletDetails, IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("get_wallet".to_string());
        match state.wallets.get(token_code) {
            Some(wallet) => Ok(WalletDetails {
                token_code: token_code.to_string(),
                status: if wallet.active { "ACTIVE".to_string() } else { "INACTIVE".to_string() },
                blocked: wallet.blocked,
                balance: wallet.balance,
            }),
            None => Err(IntersolveError::Validation {
                code: "TOKEN_NOT_FOUND".to_string(),
                description: format!("No token with code {token_code}"),
            }),
        }
    }

    async fn get_transactions(&self, token_code: &str) -> Result<Vec<WalletTransaction>, IntersolveError> {
        let state = self.state.lock().unwrap();
        let charges = state.charges.get(token_code).cloned().unwrap_or_default();
        Ok(charges
            .into_iter()
            .map(|created_at| WalletTransaction { transaction_type: "CHARGE".to_string(), created_at })
            .collect())
    }

    async fn toggle_block(&self, token_code: &str, block: bool) -> Result<ToggleOutcome, IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(if block { "block".to_string() } else { "unblock".to_string() });
        let holder = state.wallets.get(token_code).map(|w| w.holder_id.clone()).unwrap_or_default();
        let step = if block { "block-wallet" } else { "unblock-wallet" };
        Self::check_marker(&mut state, &holder, step)?;
        match state.wallets.get_mut(token_code) {
            Some(wallet) if wallet.blocked == block => Ok(ToggleOutcome::AlreadyInRequestedState),
            Some(wallet) => {
                wallet.blocked = block;
                Ok(ToggleOutcome::Applied)
            },
            None => Err(IntersolveError::Validation {
                code: "TOKEN_NOT_FOUND".to_string(),
                description: format!("No token with code {token_code}"),
            }),
        }
    }

    async fn activate_wallet(&self, token_code: &str) -> Result<ToggleOutcome, IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("activate".to_string());
        match state.wallets.get_mut(token_code) {
            Some(wallet) if wallet.active => Ok(ToggleOutcome::AlreadyInRequestedState),
            Some(wallet) => {
                wallet.active = true;
                Ok(ToggleOutcome::Applied)
            },
            None => Err(IntersolveError::Validation {
                code: "TOKEN_NOT_FOUND".to_string(),
                description: format!("No token with code {token_code}"),
            }),
        }
    }

    async fn update_customer_phone(&self, _holder_id: &str, _phone: &str) -> Result<(), IntersolveError> {
        self.state.lock().unwrap().calls.push("update_customer_phone".to_string());
        Ok(())
    }

    async fn update_customer_address(&self, _holder_id: &str, _address: &Address) -> Result<(), IntersolveError> {
        self.state.lock().unwrap().calls.push("update_customer_address".to_string());
        Ok(())
    }

    fn fund_on_wallet_creation(&self) -> bool {
        self.fund_on_creation
    }

    fn asset_code(&self) -> &str {
        &self.asset_code
    }

    fn card_brand(&self) -> &str {
        "VISA_CARD"
    }
}

//--------------------------------------    MockVoucherApi    --------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelledVoucher {
    ByCardId { card_id: String, transaction_id: String },
    ByRefPos(i64),
}

#[derive(Debug, Clone)]
pub struct MockVoucherSnapshot {
    pub pin: String,
    pub amount: Money,
    pub balance: Money,
}

#[derive(Debug, Default)]
struct MockVoucherState {
    counter: u64,
    fail_next_issue: Option<FailNextIssue>,
    drop_next_issue: bool,
    vouchers: HashMap<String, MockVoucher>,
    cancelled: Vec<CancelledVoucher>,
    calls: Vec<String>,
}

#[derive(Debug)]
struct FailNextIssue {
    description: String,
    with_identifiers: bool,
}

#[derive(Debug)]
struct MockVoucher {
    pin: String,
    amount: Money,
    balance: Money,
    transaction_id: String,
}

#[derive(Clone, Default)]
pub struct MockVoucherApi {
    state: Arc<Mutex<MockVoucherState>>,
}

impl MockVoucherApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next issue call is rejected by the provider without any identifiers, so cancellation
    /// must fall back to the ref_pos.
    pub fn fail_next_issue(&self, description: &str) {
        self.state.lock().unwrap().fail_next_issue =
            Some(FailNextIssue { description: description.to_string(), with_identifiers: false });
    }

    /// The next issue call is rejected, but the provider already assigned a card and transaction
    /// id before rejecting.
    pub fn fail_next_issue_with_identifiers(&self, description: &str) {
        self.state.lock().unwrap().fail_next_issue =
            Some(FailNextIssue { description: description.to_string(), with_identifiers: true });
    }

    /// The next issue call fails at the transport level.
    pub fn drop_next_issue(&self) {
        self.state.lock().unwrap().drop_next_issue = true;
    }

    /// Simulate in-person spending: set the provider-side remaining balance.
    pub fn set_balance(&self, barcode: &str, balance: Money) {
        if let Some(v) = self.state.lock().unwrap().vouchers.get_mut(barcode) {
            v.balance = balance;
        }
    }

    pub fn cancelled(&self) -> Vec<CancelledVoucher> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn call_log(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn voucher(&self, barcode: &str) -> Option<MockVoucherSnapshot> {
        self.state.lock().unwrap().vouchers.get(barcode).map(|v| MockVoucherSnapshot {
            pin: v.pin.clone(),
            amount: v.amount,
            balance: v.balance,
        })
    }
}

impl VoucherApi for MockVoucherApi {
    async fn issue_voucher(
        &self,
        amount: Money,
        _ref_pos: i64,
        credentials: &VoucherCredentials,
    ) -> Result<IssueVoucherResponse, IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("issue_voucher".to_string());
        if !credentials.is_complete() {
            return Err(IntersolveError::Configuration("missing voucher credentials".to_string()));
        }
        if state.drop_next_issue {
            state.drop_next_issue = false;
            return Err(IntersolveError::Unavailable("mocked transport failure".to_string()));
        }
        if let Some(fail) = state.fail_next_issue.take() {
            let identifiers = if fail.with_identifiers {
                state.counter += 1;
                (Some(format!("mock-card-{}", state.counter)), Some(format!("mock-tx-{}", state.counter)))
            } else {
                (None, None)
            };
            return Ok(IssueVoucherResponse {
                result_code: VoucherResultCode::Other,
                result_description: Some(fail.description),
                card_id: identifiers.0,
                pin: None,
                transaction_id: identifiers.1,
            });
        }
        state.counter += 1;
        let card_id = format!("mock-card-{}", state.counter);
        let pin = format!("{:04}", state.counter % 10_000);
        let transaction_id = format!("mock-tx-{}", state.counter);
        state.vouchers.insert(card_id.clone(), MockVoucher {
            pin: pin.clone(),
            amount,
            balance: amount,
            transaction_id: transaction_id.clone(),
        });
        debug!("🎟️ [mock] voucher {card_id} issued for {amount}");
        Ok(IssueVoucherResponse {
            result_code: VoucherResultCode::Ok,
            result_description: None,
            card_id: Some(card_id),
            pin: Some(pin),
            transaction_id: Some(transaction_id),
        })
    }

    async fn get_balance(
        &self,
        barcode: &str,
        pin: &str,
        _credentials: &VoucherCredentials,
    ) -> Result<Money, IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("get_balance".to_string());
        match state.vouchers.get(barcode) {
            Some(v) if v.pin == pin => Ok(v.balance),
            Some(_) => Err(IntersolveError::Validation {
                code: "INVALID_PIN".to_string(),
                description: format!("PIN mismatch for voucher {barcode}"),
            }),
            None => Err(IntersolveError::Validation {
                code: "UNKNOWN_CARD".to_string(),
                description: format!("No voucher with barcode {barcode}"),
            }),
        }
    }

    async fn cancel(
        &self,
        card_id: &str,
        transaction_id: &str,
        _credentials: &VoucherCredentials,
    ) -> Result<(), IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("cancel".to_string());
        state.cancelled.push(CancelledVoucher::ByCardId {
            card_id: card_id.to_string(),
            transaction_id: transaction_id.to_string(),
        });
        Ok(())
    }

    async fn cancel_by_ref_pos(
        &self,
        ref_pos: i64,
        _credentials: &VoucherCredentials,
    ) -> Result<(), IntersolveError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("cancel_by_ref_pos".to_string());
        state.cancelled.push(CancelledVoucher::ByRefPos(ref_pos));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn customer_request(last_name: &str) -> CreateCustomerRequest {
        use crate::data_objects::{ContactInfo, IndividualInfo, PhoneNumber};
        CreateCustomerRequest {
            external_reference: "ref-1".to_string(),
            individual: IndividualInfo {
                last_name: last_name.to_string(),
                estimated_annual_payment_volume_major_unit: 12 * 44,
            },
            contact_info: ContactInfo { addresses: vec![], phone_numbers: vec![PhoneNumber::mobile("+311234")] },
        }
    }

    #[tokio::test]
    async fn drop_marker_fails_exactly_once() {
        let api = MockVisaApi::default();
        let customer = api.create_customer(&customer_request("mock-drop-create-wallet")).await.unwrap();
        let first = api.create_wallet(&customer.id, Money::from_major(10)).await;
        assert!(matches!(first, Err(IntersolveError::Unavailable(_))));
        let second = api.create_wallet(&customer.id, Money::from_major(10)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn fail_marker_fails_every_time() {
        let api = MockVisaApi::default();
        let result = api.create_customer(&customer_request("mock-fail-create-customer")).await;
        assert!(matches!(result, Err(IntersolveError::Validation { ref code, .. }) if code == "NOT_FOUND"));
        let result = api.create_customer(&customer_request("mock-fail-create-customer")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn voucher_issue_and_spend() {
        let api = MockVoucherApi::new();
        let creds = VoucherCredentials::new("user", "pass");
        let issued = api.issue_voucher(Money::from_major(25), 42, &creds).await.unwrap();
        assert!(issued.is_ok());
        let barcode = issued.card_id.unwrap();
        let pin = issued.pin.unwrap();
        assert_eq!(api.get_balance(&barcode, &pin, &creds).await.unwrap(), Money::from_major(25));
        api.set_balance(&barcode, Money::from_major(5));
        assert_eq!(api.get_balance(&barcode, &pin, &creds).await.unwrap(), Money::from_major(5));
    }
}

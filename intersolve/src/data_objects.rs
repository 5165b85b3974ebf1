//! Request and response objects for the Intersolve APIs.
//!
//! Field names follow the upstream wire contracts (camelCase JSON). Amounts are always minor
//! units (cents) on the wire; the typed objects use [`Money`] and convert at the serde boundary
//! via its transparent cent representation.
use dpg_common::Money;
use serde::{Deserialize, Serialize};

//--------------------------------------    Error envelope    --------------------------------------------------------
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub description: String,
}

/// The standard Intersolve response envelope. `success == false` carries a list of [`ApiError`]s.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope<T> {
    pub success: bool,
    #[serde(default)]
    pub errors: Vec<ApiError>,
    #[serde(default)]
    pub code: Option<String>,
    pub data: Option<T>,
}

//--------------------------------------       Customer       --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerRequest {
    /// The beneficiary's stable reference id. Doubles as the provider-side idempotency key.
    pub external_reference: String,
    pub individual: IndividualInfo,
    pub contact_info: ContactInfo,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndividualInfo {
    pub last_name: String,
    pub estimated_annual_payment_volume_major_unit: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    pub addresses: Vec<Address>,
    pub phone_numbers: Vec<PhoneNumber>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(rename = "type")]
    pub address_type: String,
    pub address_line1: String,
    pub city: String,
    pub postal_code: String,
    pub country: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhoneNumber {
    #[serde(rename = "type")]
    pub phone_type: String,
    pub value: String,
}

impl PhoneNumber {
    pub fn mobile(value: &str) -> Self {
        Self { phone_type: "MOBILE".to_string(), value: value.to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    /// The provider-assigned holder id.
    pub id: String,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub blocked: bool,
}

//--------------------------------------        Wallet        --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWalletRequest {
    pub reference: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub quantities: Vec<AssetQuantityEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetQuantityEntry {
    pub quantity: AssetQuantity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetQuantity {
    pub asset_code: String,
    pub value: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEnvelope {
    pub token: TokenInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub code: String,
    #[serde(default)]
    pub blocked: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub balances: Vec<AssetQuantityEntry>,
}

impl TokenInfo {
    /// The balance of the configured asset, in cents. `None` when the provider response did not
    /// include the asset at all.
    pub fn balance_for(&self, asset_code: &str) -> Option<Money> {
        self.balances
            .iter()
            .find(|b| b.quantity.asset_code == asset_code)
            .map(|b| Money::from(b.quantity.value))
    }
}

/// A wallet as reported by the provider's GET endpoint.
#[derive(Debug, Clone)]
pub struct WalletDetails {
    pub token_code: String,
    pub status: String,
    pub blocked: bool,
    pub balance: Money,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletTransaction {
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Result of a block/unblock or activation call: either the provider applied the change, or it
/// reported the token was already in the requested state (treated as success by callers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Applied,
    AlreadyInRequestedState,
}

//--------------------------------------      Debit card      --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDebitCardRequest {
    pub brand: String,
    pub first_name: String,
    pub last_name: String,
    pub mobile_number: String,
    pub card_address: Address,
    pub pin_address: Address,
    pub pin_status: String,
}

//--------------------------------------        Load          --------------------------------------------------------
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sale_id: Option<String>,
    pub quantities: Vec<AssetQuantityEntry>,
}

//--------------------------------------       Voucher        --------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum VoucherResultCode {
    Ok,
    InvalidOrUnknownRetailer,
    InvalidOrUnknownCard,
    InsufficientFunds,
    Other,
}

/// Outcome of a voucher issue call. A provider-level rejection is not a transport error: the
/// response still carries whichever identifiers the provider assigned before rejecting, and those
/// are needed to cancel the half-issued voucher later.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueVoucherResponse {
    pub result_code: VoucherResultCode,
    #[serde(default)]
    pub result_description: Option<String>,
    #[serde(default)]
    pub card_id: Option<String>,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

impl IssueVoucherResponse {
    pub fn is_ok(&self) -> bool {
        self.result_code == VoucherResultCode::Ok
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoucherBalanceResponse {
    pub balance: i64,
    pub balance_factor: i64,
}

impl VoucherBalanceResponse {
    /// The remaining balance in cents, scaled by the provider's balance factor.
    pub fn remaining(&self) -> Money {
        let factor = if self.balance_factor == 0 { 1 } else { self.balance_factor };
        Money::from(self.balance * 100 / factor)
    }
}

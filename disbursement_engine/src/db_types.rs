use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use dpg_common::Money;
use log::error;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid conversion: {0}")]
pub struct ConversionError(String);

impl ConversionError {
    pub fn new(message: String) -> Self {
        Self(message)
    }
}

//--------------------------------------      ReferenceId      -------------------------------------------------------
/// The stable external identifier of a beneficiary. Immutable once assigned, and used as the
/// idempotency key across all provider calls.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct ReferenceId(pub String);

impl FromStr for ReferenceId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<String> for ReferenceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ReferenceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Display for ReferenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ReferenceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

//--------------------------------------         Fsp           -------------------------------------------------------
/// The financial service provider a registration is serviced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum Fsp {
    /// Prepaid Visa debit cards (customer → wallet → card → loads).
    IntersolveVisa,
    /// Vouchers delivered by WhatsApp message.
    IntersolveVoucherWhatsapp,
    /// Vouchers printed and handed out in person.
    IntersolveVoucherPaper,
}

impl Fsp {
    pub fn is_voucher(&self) -> bool {
        matches!(self, Fsp::IntersolveVoucherWhatsapp | Fsp::IntersolveVoucherPaper)
    }

    /// All provider values belonging to the voucher family.
    pub fn voucher_family() -> &'static [Fsp] {
        &[Fsp::IntersolveVoucherWhatsapp, Fsp::IntersolveVoucherPaper]
    }
}

impl Display for Fsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Fsp::IntersolveVisa => write!(f, "IntersolveVisa"),
            Fsp::IntersolveVoucherWhatsapp => write!(f, "IntersolveVoucherWhatsapp"),
            Fsp::IntersolveVoucherPaper => write!(f, "IntersolveVoucherPaper"),
        }
    }
}

impl FromStr for Fsp {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "IntersolveVisa" => Ok(Self::IntersolveVisa),
            "IntersolveVoucherWhatsapp" => Ok(Self::IntersolveVoucherWhatsapp),
            "IntersolveVoucherPaper" => Ok(Self::IntersolveVoucherPaper),
            s => Err(ConversionError(format!("Invalid FSP: {s}"))),
        }
    }
}

impl From<String> for Fsp {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_else(|_| {
            error!("Invalid FSP name: {value}. But this conversion cannot fail. Defaulting to IntersolveVisa");
            Fsp::IntersolveVisa
        })
    }
}

//--------------------------------------  RegistrationStatus   -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum RegistrationStatus {
    /// The beneficiary has registered but has not been vetted yet.
    Registered,
    /// Eligibility has been validated by an aid worker.
    Validated,
    /// Included in the program and eligible for payments.
    Included,
    /// Rejected during validation.
    Rejected,
    /// The program has ended for this beneficiary.
    Completed,
}

impl Display for RegistrationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationStatus::Registered => write!(f, "Registered"),
            RegistrationStatus::Validated => write!(f, "Validated"),
            RegistrationStatus::Included => write!(f, "Included"),
            RegistrationStatus::Rejected => write!(f, "Rejected"),
            RegistrationStatus::Completed => write!(f, "Completed"),
        }
    }
}

impl FromStr for RegistrationStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Registered" => Ok(Self::Registered),
            "Validated" => Ok(Self::Validated),
            "Included" => Ok(Self::Included),
            "Rejected" => Ok(Self::Rejected),
            "Completed" => Ok(Self::Completed),
            s => Err(ConversionError(format!("Invalid registration status: {s}"))),
        }
    }
}

//--------------------------------------     Registration      -------------------------------------------------------
#[derive(Debug, Clone, FromRow)]
pub struct Registration {
    pub id: i64,
    pub reference_id: ReferenceId,
    pub program_id: i64,
    pub fsp: Fsp,
    pub status: RegistrationStatus,
    pub phone_number: Option<String>,
    /// The number vouchers are delivered to over WhatsApp, when different from `phone_number`.
    pub payment_address: Option<String>,
    pub preferred_language: String,
    /// Scales the program's base transfer amount, e.g. by household size.
    pub payment_amount_multiplier: i64,
    pub scope: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub reference_id: ReferenceId,
    pub program_id: i64,
    pub fsp: Fsp,
    pub phone_number: Option<String>,
    pub payment_address: Option<String>,
    pub preferred_language: String,
    pub payment_amount_multiplier: i64,
    pub scope: String,
}

impl NewRegistration {
    pub fn new(reference_id: ReferenceId, program_id: i64, fsp: Fsp) -> Self {
        Self {
            reference_id,
            program_id,
            fsp,
            phone_number: None,
            payment_address: None,
            preferred_language: "en".to_string(),
            payment_amount_multiplier: 1,
            scope: String::new(),
        }
    }

    pub fn with_phone_number(mut self, phone: &str) -> Self {
        self.phone_number = Some(phone.to_string());
        self
    }

    pub fn with_payment_address(mut self, address: &str) -> Self {
        self.payment_address = Some(address.to_string());
        self
    }

    pub fn with_multiplier(mut self, multiplier: i64) -> Self {
        self.payment_amount_multiplier = multiplier;
        self
    }

    pub fn with_scope(mut self, scope: &str) -> Self {
        self.scope = scope.to_string();
        self
    }
}

//--------------------------------------     VisaCustomer      -------------------------------------------------------
/// The provider-side customer (holder) for a registration. Created lazily on the first successful
/// create-customer call and never recreated once it exists.
#[derive(Debug, Clone, FromRow)]
pub struct VisaCustomer {
    pub id: i64,
    pub registration_id: i64,
    pub holder_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

//--------------------------------------      WalletStatus     -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum WalletStatus {
    Active,
    Inactive,
    Blocked,
}

impl WalletStatus {
    /// Derives the locally reported status from the provider status plus the local block flag.
    /// The block flag always wins, and an unrecognised provider status is reported as blocked
    /// rather than guessed at.
    pub fn derive(provider_status: &str, blocked: bool) -> Self {
        if blocked {
            return WalletStatus::Blocked;
        }
        match provider_status {
            "ACTIVE" => WalletStatus::Active,
            "INACTIVE" => WalletStatus::Inactive,
            other => {
                error!("Unexpected provider wallet status '{other}'. Reporting the wallet as Blocked");
                WalletStatus::Blocked
            },
        }
    }
}

impl Display for WalletStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WalletStatus::Active => write!(f, "Active"),
            WalletStatus::Inactive => write!(f, "Inactive"),
            WalletStatus::Blocked => write!(f, "Blocked"),
        }
    }
}

impl FromStr for WalletStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(Self::Active),
            "Inactive" => Ok(Self::Inactive),
            "Blocked" => Ok(Self::Blocked),
            s => Err(ConversionError(format!("Invalid wallet status: {s}"))),
        }
    }
}

//--------------------------------------      VisaWallet       -------------------------------------------------------
/// A provider wallet (token). Several may exist per customer over time (reissue flow); the
/// current one is the most recently created. The milestone flags only ever move forward.
#[derive(Debug, Clone, FromRow)]
pub struct VisaWallet {
    pub id: i64,
    pub customer_id: i64,
    pub token_code: String,
    pub balance: Money,
    pub status: WalletStatus,
    pub token_blocked: bool,
    pub linked_to_customer: bool,
    pub debit_card_created: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVisaWallet {
    pub token_code: String,
    pub balance: Money,
    pub status: WalletStatus,
    pub token_blocked: bool,
}

//--------------------------------------        Voucher        -------------------------------------------------------
/// A single issued voucher. Reusable for retry only while `send` is false; once the observed
/// balance differs from the issue amount it is `balance_used` and excluded from unused reporting.
#[derive(Debug, Clone, FromRow)]
pub struct Voucher {
    pub id: i64,
    pub registration_id: i64,
    pub payment_nr: i64,
    pub barcode: String,
    pub pin: String,
    pub amount: Money,
    pub whatsapp_phone_number: Option<String>,
    pub send: bool,
    pub balance_used: bool,
    pub last_requested_balance: Option<Money>,
    pub balance_checked_at: Option<DateTime<Utc>>,
    pub reminder_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVoucher {
    pub registration_id: i64,
    pub payment_nr: i64,
    pub barcode: String,
    pub pin: String,
    pub amount: Money,
    pub whatsapp_phone_number: Option<String>,
}

//--------------------------------------  VoucherIssueRequest  -------------------------------------------------------
/// Bookkeeping for a provider issue attempt. When the attempt fails or the response is
/// ambiguous, the row is marked `to_cancel` and the cancellation sweep retires it using whichever
/// identifier the provider returned.
#[derive(Debug, Clone, FromRow)]
pub struct VoucherIssueRequest {
    pub id: i64,
    pub program_id: i64,
    pub ref_pos: i64,
    pub card_id: Option<String>,
    pub transaction_id: Option<String>,
    pub to_cancel: bool,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVoucherIssueRequest {
    pub program_id: i64,
    pub ref_pos: i64,
    pub card_id: Option<String>,
    pub transaction_id: Option<String>,
    pub to_cancel: bool,
}

//--------------------------------------   TransactionStatus   -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Funds are available to the beneficiary.
    Success,
    /// The disbursement attempt failed; `error_message` carries the operator-facing reason.
    Error,
    /// The voucher message has been handed to the delivery channel and confirmation is pending.
    Waiting,
}

impl Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Success => write!(f, "Success"),
            TransactionStatus::Error => write!(f, "Error"),
            TransactionStatus::Waiting => write!(f, "Waiting"),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Success" => Ok(Self::Success),
            "Error" => Ok(Self::Error),
            "Waiting" => Ok(Self::Waiting),
            s => Err(ConversionError(format!("Invalid transaction status: {s}"))),
        }
    }
}

//--------------------------------------      Transaction      -------------------------------------------------------
/// One row per disbursement attempt outcome. The authoritative ledger entry consumed by
/// reporting and notifications.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub registration_id: i64,
    pub program_id: i64,
    pub payment_nr: i64,
    pub fsp: Fsp,
    pub status: TransactionStatus,
    pub amount: Money,
    pub error_message: Option<String>,
    /// 1 = instrument issue, 2 = delivery confirmation.
    pub transaction_step: i64,
    /// Correlates an asynchronous delivery receipt back to this transaction.
    pub message_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub registration_id: i64,
    pub program_id: i64,
    pub payment_nr: i64,
    pub fsp: Fsp,
    pub status: TransactionStatus,
    pub amount: Money,
    pub error_message: Option<String>,
    pub transaction_step: i64,
    pub message_ref: Option<String>,
}

impl NewTransaction {
    pub fn new(
        registration: &Registration,
        payment_nr: i64,
        amount: Money,
        status: TransactionStatus,
    ) -> Self {
        Self {
            registration_id: registration.id,
            program_id: registration.program_id,
            payment_nr,
            fsp: registration.fsp,
            status,
            amount,
            error_message: None,
            transaction_step: 1,
            message_ref: None,
        }
    }

    pub fn with_error_message(mut self, message: String) -> Self {
        self.error_message = Some(message);
        self
    }

    pub fn with_message_ref(mut self, message_ref: String) -> Self {
        self.message_ref = Some(message_ref);
        self
    }
}

//--------------------------------------       JobStatus       -------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
pub enum JobStatus {
    /// Waiting for a worker slot.
    Queued,
    /// Claimed by a worker.
    Running,
    /// The job produced a transaction (which may itself record an Error outcome).
    Succeeded,
    /// Retries exhausted; a permanently failed transaction has been recorded.
    Failed,
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Succeeded => write!(f, "Succeeded"),
            JobStatus::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Queued" => Ok(Self::Queued),
            "Running" => Ok(Self::Running),
            "Succeeded" => Ok(Self::Succeeded),
            "Failed" => Ok(Self::Failed),
            s => Err(ConversionError(format!("Invalid job status: {s}"))),
        }
    }
}

//--------------------------------------      PaymentJob       -------------------------------------------------------
/// A queued unit of work: one beneficiary, one payment cycle. Unique per
/// (program, payment cycle, registration) so re-submitting a run never double-disburses.
/// Credentials are deliberately not part of the payload; workers resolve them at pickup.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentJob {
    pub id: i64,
    pub program_id: i64,
    pub payment_nr: i64,
    pub registration_id: i64,
    pub fsp: Fsp,
    pub amount: Money,
    pub status: JobStatus,
    pub attempts: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentJob {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

#[derive(Debug, Clone)]
pub struct NewPaymentJob {
    pub program_id: i64,
    pub payment_nr: i64,
    pub registration_id: i64,
    pub fsp: Fsp,
    pub amount: Money,
    pub max_attempts: i64,
}

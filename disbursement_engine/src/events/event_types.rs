use crate::db_types::{ReferenceId, Transaction};

/// Message template keys understood by the notification service.
pub mod template_keys {
    pub const VISA_DEBIT_CARD_CREATED: &str = "visaDebitCardCreated";
    pub const VISA_LOAD: &str = "visaLoad";
    pub const WHATSAPP_PAYMENT: &str = "whatsappPayment";
    pub const WHATSAPP_PAYMENT_REMINDER: &str = "whatsappPaymentReminder";
}

/// Emitted whenever a ledger entry reaches a terminal or waiting state for a payment job.
#[derive(Debug, Clone)]
pub struct PaymentCompletedEvent {
    pub reference_id: ReferenceId,
    pub transaction: Transaction,
}

/// A request to send a templated message to a beneficiary. This is the engine's entire contract
/// with the notification service: fire-and-forget, parameters already rendered to strings.
#[derive(Debug, Clone)]
pub struct MessageRequestEvent {
    pub registration_id: i64,
    pub reference_id: ReferenceId,
    pub template_key: String,
    pub dynamic_params: Vec<String>,
    /// Set when a delivery receipt should be correlated back to a waiting transaction.
    pub message_ref: Option<String>,
}

/// Raised when a best-effort compensation (re-blocking a wallet after a failed reissue step)
/// itself failed. The instrument may be neither old-blocked nor new-issued, so operators must be
/// told even though the original error is what the caller sees.
#[derive(Debug, Clone)]
pub struct CompensationFailedAlert {
    pub reference_id: ReferenceId,
    pub token_code: String,
    pub message: String,
}

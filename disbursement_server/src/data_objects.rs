use disbursement_engine::scope::ScopeFilter;
use serde::{Deserialize, Serialize};

/// Standard body for endpoints that have nothing better to return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Into<String>>(message: S) -> Self {
        Self { success: true, message: message.into() }
    }
}

/// The caller's data scope, passed explicitly as a query parameter. Absent means unrestricted
/// (the permission layer in front of this service decides who may omit it).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScopeParams {
    pub scope: Option<String>,
}

impl ScopeParams {
    pub fn filter(&self) -> ScopeFilter {
        match &self.scope {
            Some(scope) => ScopeFilter::scoped(scope),
            None => ScopeFilter::all(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub pending_job_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRunResponse {
    pub job_count: usize,
    pub skipped: Vec<String>,
}

/// Delivery states reported by the message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sent,
    Delivered,
    Read,
    Undelivered,
    Failed,
}

impl MessageStatus {
    /// `Some(true)` = confirmed delivered, `Some(false)` = confirmed failed, `None` = interim
    /// status that needs no ledger update.
    pub fn delivery_outcome(&self) -> Option<bool> {
        match self {
            MessageStatus::Delivered | MessageStatus::Read => Some(true),
            MessageStatus::Undelivered | MessageStatus::Failed => Some(false),
            MessageStatus::Queued | MessageStatus::Sent => None,
        }
    }
}

/// Webhook payload from the message-delivery channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusCallback {
    pub message_ref: String,
    pub message_status: MessageStatus,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl MessageStatusCallback {
    pub fn channel_error(&self) -> Option<String> {
        if self.message_status.delivery_outcome() == Some(false) {
            let message = self.error_message.clone().unwrap_or_default();
            let code = self.error_code.clone().unwrap_or_default();
            Some(format!("{message} (ErrorCode: {code})"))
        } else {
            None
        }
    }
}

use thiserror::Error;

use crate::{
    attributes::AttributeError,
    db_types::{Fsp, ReferenceId},
    traits::{ConfigurationError, StorageError},
};

#[derive(Debug, Clone, Error)]
pub enum OrchestrationError {
    #[error("{0}")]
    Storage(#[from] StorageError),
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),
    #[error("{0}")]
    Attribute(#[from] AttributeError),
    #[error("No registration found with reference id {0} (within your scope)")]
    RegistrationNotFound(ReferenceId),
    #[error("Registration with reference id {0} is not serviced by {1}")]
    WrongProvider(ReferenceId, Fsp),
    #[error("No customer record exists yet for beneficiary with reference id {0}")]
    NoCustomerYet(ReferenceId),
    #[error("No wallet available yet for beneficiary with reference id {0}")]
    NoWalletAvailable(ReferenceId),
    #[error("Voucher not found. Maybe this payment was not (yet) made to this beneficiary.")]
    VoucherNotFound,
    /// A provider call failed with a retryable transport error. Queued jobs are re-delivered;
    /// synchronous callers see the message directly.
    #[error("{0}")]
    ProviderUnavailable(String),
    /// A provider call failed terminally during a synchronous administrative flow. The message
    /// names the step and carries the provider's rejection verbatim.
    #[error("{0}")]
    StepFailed(String),
    #[error(
        "A new card was successfully issued, but the balance of the old card could not be unloaded and it is \
         not blocked yet. Operator intervention is required."
    )]
    ReissueUnloadFailed,
    #[error(
        "A new card was successfully issued and the balance of the old card was unloaded, but the old card \
         could not be blocked. Operator intervention is required."
    )]
    ReissueBlockFailed,
}

impl OrchestrationError {
    /// True when the queue should re-deliver the job rather than record a terminal failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, OrchestrationError::ProviderUnavailable(_) | OrchestrationError::Storage(_))
    }
}

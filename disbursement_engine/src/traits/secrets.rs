use intersolve::VoucherCredentials;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Missing or invalid provider configuration: {0}")]
pub struct ConfigurationError(pub String);

/// Resolves provider credentials at worker-pickup time, keyed by program.
///
/// Credentials are deliberately never carried in queue payloads: a job enqueued before a
/// credential rotation picks up the fresh secret when a worker claims it, and secrets never sit
/// at rest in the queue table.
pub trait SecretsProvider: Clone + Send + Sync {
    fn voucher_credentials(&self, program_id: i64) -> Result<VoucherCredentials, ConfigurationError>;
}

/// Fixed credentials for every program. Suitable for single-tenant deployments and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    credentials: VoucherCredentials,
}

impl StaticSecrets {
    pub fn new(credentials: VoucherCredentials) -> Self {
        Self { credentials }
    }
}

impl SecretsProvider for StaticSecrets {
    fn voucher_credentials(&self, _program_id: i64) -> Result<VoucherCredentials, ConfigurationError> {
        if self.credentials.is_complete() {
            Ok(self.credentials.clone())
        } else {
            Err(ConfigurationError("voucher credentials have not been configured".to_string()))
        }
    }
}

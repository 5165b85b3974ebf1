use std::{env, time::Duration};

use chrono::Duration as ChronoDuration;
use disbursement_engine::{
    queue::WorkerConfig,
    traits::{ConfigurationError, SecretsProvider},
};
use dpg_common::parse_boolean_flag;
use intersolve::{IntersolveVisaConfig, IntersolveVoucherConfig, VoucherCredentials};
use log::*;

const DEFAULT_DPG_HOST: &str = "127.0.0.1";
const DEFAULT_DPG_PORT: u16 = 8460;
const DEFAULT_SWEEP_BATCH_SIZE: i64 = 1000;
const DEFAULT_MAX_REMINDERS: i64 = 3;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// When true, the in-memory mock provider clients are used instead of live HTTP clients.
    /// For demo environments and integration testing only.
    pub use_mock_providers: bool,
    pub visa_config: IntersolveVisaConfig,
    pub voucher_config: IntersolveVoucherConfig,
    pub visa_workers: WorkerConfig,
    pub voucher_workers: WorkerConfig,
    pub sweeps: SweepConfig,
}

/// Timing and sizing of the periodic reconciliation sweeps.
#[derive(Clone, Debug)]
pub struct SweepConfig {
    /// Interval of the cancel-stuck-issuance sweep.
    pub cancel_interval: Duration,
    /// Interval of the voucher balance-refresh sweep.
    pub balance_refresh_interval: Duration,
    /// Interval of the unclaimed-voucher reminder sweep.
    pub reminder_interval: Duration,
    /// Interval of the wallet-details refresh sweep.
    pub wallet_refresh_interval: Duration,
    /// Row-id batch size for the batched sweeps.
    pub batch_size: i64,
    /// How long a WhatsApp voucher may stay unclaimed before a reminder goes out.
    pub reminder_after: ChronoDuration,
    /// Reminders stop after this many per voucher.
    pub max_reminders: i64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            cancel_interval: Duration::from_secs(10 * 60),
            balance_refresh_interval: Duration::from_secs(24 * 60 * 60),
            reminder_interval: Duration::from_secs(24 * 60 * 60),
            wallet_refresh_interval: Duration::from_secs(24 * 60 * 60),
            batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            reminder_after: ChronoDuration::hours(24),
            max_reminders: DEFAULT_MAX_REMINDERS,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_DPG_HOST.to_string(),
            port: DEFAULT_DPG_PORT,
            database_url: String::default(),
            use_mock_providers: false,
            visa_config: IntersolveVisaConfig::default(),
            voucher_config: IntersolveVoucherConfig::default(),
            visa_workers: WorkerConfig::default(),
            voucher_workers: WorkerConfig::default(),
            sweeps: SweepConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("DPG_HOST").ok().unwrap_or_else(|| DEFAULT_DPG_HOST.into());
        let port = env::var("DPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for DPG_PORT. {e} Using the default, {DEFAULT_DPG_PORT}, \
                         instead."
                    );
                    DEFAULT_DPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_DPG_PORT);
        let database_url = env::var("DPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ DPG_DATABASE_URL is not set. Please set it to the URL for the gateway database.");
            String::default()
        });
        let use_mock_providers = parse_boolean_flag(env::var("DPG_USE_MOCK_PROVIDERS").ok(), false);
        if use_mock_providers {
            warn!("🪛️ DPG_USE_MOCK_PROVIDERS is set. No live provider calls will be made. 🚨️");
        }
        let visa_workers = WorkerConfig {
            concurrency: env_usize("DPG_VISA_WORKERS", 4),
            poll_interval: Duration::from_millis(env_u64("DPG_QUEUE_POLL_MILLIS", 500)),
        };
        // Voucher issuance is the stricter rate limit of the two provider families.
        let voucher_workers = WorkerConfig {
            concurrency: env_usize("DPG_VOUCHER_WORKERS", 2),
            poll_interval: Duration::from_millis(env_u64("DPG_QUEUE_POLL_MILLIS", 500)),
        };
        let sweeps = SweepConfig {
            cancel_interval: Duration::from_secs(env_u64("DPG_CANCEL_SWEEP_SECS", 10 * 60)),
            balance_refresh_interval: Duration::from_secs(env_u64("DPG_BALANCE_SWEEP_SECS", 24 * 60 * 60)),
            reminder_interval: Duration::from_secs(env_u64("DPG_REMINDER_SWEEP_SECS", 24 * 60 * 60)),
            wallet_refresh_interval: Duration::from_secs(env_u64("DPG_WALLET_REFRESH_SWEEP_SECS", 24 * 60 * 60)),
            batch_size: env_u64("DPG_SWEEP_BATCH_SIZE", DEFAULT_SWEEP_BATCH_SIZE as u64) as i64,
            reminder_after: ChronoDuration::hours(env_u64("DPG_REMINDER_AFTER_HOURS", 24) as i64),
            max_reminders: env_u64("DPG_MAX_REMINDERS", DEFAULT_MAX_REMINDERS as u64) as i64,
        };
        Self {
            host,
            port,
            database_url,
            use_mock_providers,
            visa_config: IntersolveVisaConfig::from_env_or_default(),
            voucher_config: IntersolveVoucherConfig::from_env_or_default(),
            visa_workers,
            voucher_workers,
            sweeps,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|s| {
            s.parse::<u64>()
                .map_err(|e| warn!("🪛️ Invalid configuration value for {name}: {e}. Using {default}."))
                .ok()
        })
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env_u64(name, default as u64) as usize
}

//-------------------------------------------  EnvSecrets  ------------------------------------------------------------
/// Voucher credentials from environment variables, resolved at worker pickup time.
///
/// `DPG_INTERSOLVE_VOUCHER_USERNAME` / `DPG_INTERSOLVE_VOUCHER_PASSWORD` apply to every program;
/// a `…_USERNAME_<PROGRAM_ID>` / `…_PASSWORD_<PROGRAM_ID>` pair overrides them for one program.
#[derive(Debug, Clone, Default)]
pub struct EnvSecrets;

impl SecretsProvider for EnvSecrets {
    fn voucher_credentials(&self, program_id: i64) -> Result<VoucherCredentials, ConfigurationError> {
        let username = env::var(format!("DPG_INTERSOLVE_VOUCHER_USERNAME_{program_id}"))
            .or_else(|_| env::var("DPG_INTERSOLVE_VOUCHER_USERNAME"))
            .map_err(|_| {
                ConfigurationError(format!("no voucher API username configured for program {program_id}"))
            })?;
        let password = env::var(format!("DPG_INTERSOLVE_VOUCHER_PASSWORD_{program_id}"))
            .or_else(|_| env::var("DPG_INTERSOLVE_VOUCHER_PASSWORD"))
            .map_err(|_| {
                ConfigurationError(format!("no voucher API password configured for program {program_id}"))
            })?;
        Ok(VoucherCredentials::new(&username, &password))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let config = ServerConfig::default();
        assert_eq!(config.host, DEFAULT_DPG_HOST);
        assert_eq!(config.port, DEFAULT_DPG_PORT);
        assert!(!config.use_mock_providers);
        assert_eq!(config.sweeps.batch_size, DEFAULT_SWEEP_BATCH_SIZE);
    }

    #[test]
    fn env_u64_falls_back_on_garbage() {
        std::env::set_var("DPG_TEST_GARBAGE_U64", "not-a-number");
        assert_eq!(env_u64("DPG_TEST_GARBAGE_U64", 7), 7);
        std::env::remove_var("DPG_TEST_GARBAGE_U64");
    }
}

use dpg_common::{parse_boolean_flag, Secret};
use log::*;

#[derive(Debug, Clone, Default)]
pub struct IntersolveVisaConfig {
    /// Base URL of the wallet API, e.g. "https://api.intersolve.example/wallet/v1"
    pub base_url: String,
    pub auth_token: Secret<String>,
    /// The asset code identifying the funding asset on wallet balances.
    pub asset_code: String,
    /// Card brand passed on debit card issuance.
    pub brand_code: String,
    /// When true, the payment amount is loaded atomically at wallet creation; otherwise the
    /// amount is loaded explicitly after card creation.
    pub fund_on_wallet_creation: bool,
}

impl IntersolveVisaConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = std::env::var("DPG_INTERSOLVE_VISA_BASE_URL").unwrap_or_else(|_| {
            warn!("DPG_INTERSOLVE_VISA_BASE_URL not set, using a (probably useless) default");
            "https://api.intersolve.example/wallet/v1".to_string()
        });
        let auth_token = Secret::new(std::env::var("DPG_INTERSOLVE_VISA_AUTH_TOKEN").unwrap_or_else(|_| {
            warn!("DPG_INTERSOLVE_VISA_AUTH_TOKEN not set, Visa API calls will not authenticate");
            String::default()
        }));
        let asset_code = std::env::var("DPG_INTERSOLVE_VISA_ASSET_CODE").unwrap_or_else(|_| {
            warn!("DPG_INTERSOLVE_VISA_ASSET_CODE not set, using EUR as default");
            "EUR".to_string()
        });
        let brand_code = std::env::var("DPG_INTERSOLVE_VISA_BRAND_CODE").unwrap_or_else(|_| "VISA_CARD".to_string());
        let fund_on_wallet_creation =
            parse_boolean_flag(std::env::var("DPG_INTERSOLVE_VISA_FUND_ON_WALLET_CREATION").ok(), true);
        Self { base_url, auth_token, asset_code, brand_code, fund_on_wallet_creation }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IntersolveVoucherConfig {
    /// Base URL of the voucher API, e.g. "https://api.intersolve.example/voucher"
    pub base_url: String,
}

impl IntersolveVoucherConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = std::env::var("DPG_INTERSOLVE_VOUCHER_BASE_URL").unwrap_or_else(|_| {
            warn!("DPG_INTERSOLVE_VOUCHER_BASE_URL not set, using a (probably useless) default");
            "https://api.intersolve.example/voucher".to_string()
        });
        Self { base_url }
    }
}

use std::{future::Future, sync::Arc};

use dpg_common::Money;
use log::*;
use reqwest::{
    header::{HeaderMap, HeaderValue},
    Client,
    Method,
    StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::{
    config::IntersolveVisaConfig,
    data_objects::{
        CreateCustomerRequest,
        CreateDebitCardRequest,
        CreateWalletRequest,
        CustomerInfo,
        LoadRequest,
        PhoneNumber,
        ResponseEnvelope,
        TokenEnvelope,
        TokenInfo,
        ToggleOutcome,
        Address,
        AssetQuantity,
        AssetQuantityEntry,
        WalletDetails,
        WalletTransaction,
    },
    helpers::random_reference,
    IntersolveError,
};

/// The remote contract for the Visa debit-card provider family.
///
/// One instrument chain per beneficiary: a customer (holder), one or more wallets (tokens), a
/// physical debit card per wallet, and balance loads. Implementations must be cheap to clone;
/// they are shared across queue workers, so the methods are declared with `Send` futures (the
/// desugared form of `async fn`) and implementations simply write `async fn`.
pub trait VisaApi: Clone + Send + Sync {
    fn create_customer(
        &self,
        request: &CreateCustomerRequest,
    ) -> impl Future<Output = Result<CustomerInfo, IntersolveError>> + Send;

    /// Create a new wallet for the holder, optionally pre-loaded with `amount` when the provider
    /// is configured to fund at creation time.
    fn create_wallet(
        &self,
        holder_id: &str,
        amount: Money,
    ) -> impl Future<Output = Result<TokenInfo, IntersolveError>> + Send;

    fn link_wallet_to_customer(
        &self,
        holder_id: &str,
        token_code: &str,
    ) -> impl Future<Output = Result<(), IntersolveError>> + Send;

    fn create_debit_card(
        &self,
        token_code: &str,
        request: &CreateDebitCardRequest,
    ) -> impl Future<Output = Result<(), IntersolveError>> + Send;

    /// Load `amount` onto the wallet. `sale_id` identifies the (beneficiary, payment cycle) pair
    /// and doubles as the provider-side idempotency key for the load.
    fn load_balance(
        &self,
        token_code: &str,
        amount: Money,
        sale_id: &str,
    ) -> impl Future<Output = Result<(), IntersolveError>> + Send;

    fn unload_balance(
        &self,
        token_code: &str,
        amount: Money,
    ) -> impl Future<Output = Result<(), IntersolveError>> + Send;

    fn get_wallet(
        &self,
        token_code: &str,
    ) -> impl Future<Output = Result<WalletDetails, IntersolveError>> + Send;

    fn get_transactions(
        &self,
        token_code: &str,
    ) -> impl Future<Output = Result<Vec<WalletTransaction>, IntersolveError>> + Send;

    /// Block or unblock a wallet. A provider response stating the token is already in the
    /// requested state is reported as [`ToggleOutcome::AlreadyInRequestedState`], not an error.
    fn toggle_block(
        &self,
        token_code: &str,
        block: bool,
    ) -> impl Future<Output = Result<ToggleOutcome, IntersolveError>> + Send;

    fn activate_wallet(
        &self,
        token_code: &str,
    ) -> impl Future<Output = Result<ToggleOutcome, IntersolveError>> + Send;

    fn update_customer_phone(
        &self,
        holder_id: &str,
        phone: &str,
    ) -> impl Future<Output = Result<(), IntersolveError>> + Send;

    fn update_customer_address(
        &self,
        holder_id: &str,
        address: &Address,
    ) -> impl Future<Output = Result<(), IntersolveError>> + Send;

    /// Whether wallets are funded with the payment amount at creation time (provider capability).
    fn fund_on_wallet_creation(&self) -> bool;

    /// The asset code funding loads go out in.
    fn asset_code(&self) -> &str;

    /// The card brand passed on debit card issuance.
    fn card_brand(&self) -> &str;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockRequest {
    reason_code: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActivateRequest {
    reference: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CodeResponse {
    #[serde(default)]
    code: Option<String>,
}

#[derive(Clone)]
pub struct IntersolveVisaClient {
    config: IntersolveVisaConfig,
    client: Arc<Client>,
}

impl IntersolveVisaClient {
    pub fn new(config: IntersolveVisaConfig) -> Result<Self, IntersolveError> {
        let mut headers = HeaderMap::with_capacity(2);
        let bearer = format!("Bearer {}", config.auth_token.reveal());
        let val =
            HeaderValue::from_str(&bearer).map_err(|e| IntersolveError::Initialization(e.to_string()))?;
        headers.insert("Authorization", val);
        headers.insert("Content-Type", HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| IntersolveError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }

    /// Sends a request and unwraps the standard response envelope into its `data` payload.
    async fn envelope_query<T: DeserializeOwned, B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<T, IntersolveError> {
        let url = self.url(path);
        trace!("💳️ {method} {url}");
        let mut req = self.client.request(method, url);
        if let Some(body) = body {
            req = req.json(body);
        }
        let response = req.send().await.map_err(|e| IntersolveError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(IntersolveError::Unavailable(format!("{} - {}", status.as_u16(), status_text(status))));
        }
        let envelope = response
            .json::<ResponseEnvelope<T>>()
            .await
            .map_err(|e| IntersolveError::UnexpectedResponse(e.to_string()))?;
        if envelope.success {
            envelope
                .data
                .ok_or_else(|| IntersolveError::UnexpectedResponse("missing data in successful response".to_string()))
        } else {
            Err(IntersolveError::from_errors(&envelope.errors, status.as_u16(), status_text(status)))
        }
    }

    /// Sends a request whose success is signalled by 2xx with no meaningful body. When the
    /// provider answers 405 with one of `tolerated_codes`, the token was already in the requested
    /// state and the call is reported as such.
    async fn no_content_query<B: Serialize>(
        &self,
        path: &str,
        body: &B,
        tolerated_codes: &[&str],
    ) -> Result<ToggleOutcome, IntersolveError> {
        let url = self.url(path);
        trace!("💳️ POST {url}");
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| IntersolveError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(ToggleOutcome::Applied);
        }
        if status.is_server_error() {
            return Err(IntersolveError::Unavailable(format!("{} - {}", status.as_u16(), status_text(status))));
        }
        let code = response.json::<CodeResponse>().await.ok().and_then(|r| r.code);
        match code {
            Some(code) if status == StatusCode::METHOD_NOT_ALLOWED && tolerated_codes.contains(&code.as_str()) => {
                debug!("💳️ Token already in requested state ({code})");
                Ok(ToggleOutcome::AlreadyInRequestedState)
            },
            Some(code) => Err(IntersolveError::Validation { code, description: status_text(status).to_string() }),
            None => Err(IntersolveError::Validation {
                code: status.as_u16().to_string(),
                description: status_text(status).to_string(),
            }),
        }
    }

    fn quantities_for(&self, amount: Money) -> Vec<AssetQuantityEntry> {
        if amount.is_positive() {
            vec![AssetQuantityEntry {
                quantity: AssetQuantity { asset_code: self.config.asset_code.clone(), value: amount.value() },
            }]
        } else {
            Vec::new()
        }
    }
}

impl VisaApi for IntersolveVisaClient {
    async fn create_customer(&self, request: &CreateCustomerRequest) -> Result<CustomerInfo, IntersolveError> {
        self.envelope_query(Method::POST, "/customers", Some(request)).await
    }

    async fn create_wallet(&self, holder_id: &str, amount: Money) -> Result<TokenInfo, IntersolveError> {
        let request =
            CreateWalletRequest { reference: holder_id.to_string(), quantities: self.quantities_for(amount) };
        let envelope: TokenEnvelope = self.envelope_query(Method::POST, "/tokens", Some(&request)).await?;
        Ok(envelope.token)
    }

    async fn link_wallet_to_customer(&self, holder_id: &str, token_code: &str) -> Result<(), IntersolveError> {
        let body = serde_json::json!({ "holderId": holder_id });
        self.no_content_query(&format!("/tokens/{token_code}/register-holder"), &body, &[]).await.map(|_| ())
    }

    async fn create_debit_card(
        &self,
        token_code: &str,
        request: &CreateDebitCardRequest,
    ) -> Result<(), IntersolveError> {
        self.no_content_query(&format!("/tokens/{token_code}/create-debit-card"), request, &[]).await.map(|_| ())
    }

    async fn load_balance(&self, token_code: &str, amount: Money, sale_id: &str) -> Result<(), IntersolveError> {
        let request = LoadRequest {
            reference: random_reference(),
            sale_id: Some(sale_id.to_string()),
            quantities: self.quantities_for(amount),
        };
        let _: serde_json::Value =
            self.envelope_query(Method::POST, &format!("/tokens/{token_code}/load"), Some(&request)).await?;
        Ok(())
    }

    async fn unload_balance(&self, token_code: &str, amount: Money) -> Result<(), IntersolveError> {
        let request =
            LoadRequest { reference: random_reference(), sale_id: None, quantities: self.quantities_for(amount) };
        let _: serde_json::Value =
            self.envelope_query(Method::POST, &format!("/tokens/{token_code}/unload"), Some(&request)).await?;
        Ok(())
    }

    async fn get_wallet(&self, token_code: &str) -> Result<WalletDetails, IntersolveError> {
        let token: TokenInfo =
            self.envelope_query::<TokenInfo, ()>(Method::GET, &format!("/tokens/{token_code}"), None).await?;
        let balance = token.balance_for(&self.config.asset_code).ok_or_else(|| {
            IntersolveError::UnexpectedResponse(format!(
                "wallet {token_code} response did not include a balance for asset {}",
                self.config.asset_code
            ))
        })?;
        Ok(WalletDetails {
            token_code: token.code,
            status: token.status.unwrap_or_else(|| "UNKNOWN".to_string()),
            blocked: token.blocked,
            balance,
        })
    }

    async fn get_transactions(&self, token_code: &str) -> Result<Vec<WalletTransaction>, IntersolveError> {
        self.envelope_query::<Vec<WalletTransaction>, ()>(
            Method::GET,
            &format!("/tokens/{token_code}/transactions"),
            None,
        )
        .await
    }

    async fn toggle_block(&self, token_code: &str, block: bool) -> Result<ToggleOutcome, IntersolveError> {
        // TOKEN_DISABLED would block the wallet permanently, so the general reason codes are used.
        let (path, reason, tolerated) = if block {
            ("block", "BLOCK_GENERAL", "TOKEN_IS_ALREADY_BLOCKED")
        } else {
            ("unblock", "UNBLOCK_GENERAL", "TOKEN_IS_NOT_BLOCKED")
        };
        let body = BlockRequest { reason_code: reason.to_string() };
        self.no_content_query(&format!("/tokens/{token_code}/{path}"), &body, &[tolerated]).await
    }

    async fn activate_wallet(&self, token_code: &str) -> Result<ToggleOutcome, IntersolveError> {
        let body = ActivateRequest { reference: random_reference() };
        self.no_content_query(&format!("/tokens/{token_code}/activate"), &body, &["TOKEN_IS_NOT_ACTIVE"]).await
    }

    async fn update_customer_phone(&self, holder_id: &str, phone: &str) -> Result<(), IntersolveError> {
        let body = PhoneNumber::mobile(phone);
        let _: serde_json::Value = self
            .envelope_query(Method::PUT, &format!("/customers/{holder_id}/phone-numbers"), Some(&body))
            .await?;
        Ok(())
    }

    async fn update_customer_address(&self, holder_id: &str, address: &Address) -> Result<(), IntersolveError> {
        let _: serde_json::Value =
            self.envelope_query(Method::PUT, &format!("/customers/{holder_id}/addresses"), Some(address)).await?;
        Ok(())
    }

    fn fund_on_wallet_creation(&self) -> bool {
        self.config.fund_on_wallet_creation
    }

    fn asset_code(&self) -> &str {
        &self.config.asset_code
    }

    fn card_brand(&self) -> &str {
        &self.config.brand_code
    }
}

fn status_text(status: StatusCode) -> &'static str {
    status.canonical_reason().unwrap_or("UNKNOWN")
}

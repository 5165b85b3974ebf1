use std::{future::Future, sync::Arc};

use dpg_common::{Money, Secret};
use log::*;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    config::IntersolveVoucherConfig,
    data_objects::{IssueVoucherResponse, VoucherBalanceResponse},
    IntersolveError,
};

/// Per-program credentials for the voucher API. Resolved at worker pickup time, never stored in
/// job payloads.
#[derive(Debug, Clone, Default)]
pub struct VoucherCredentials {
    pub username: String,
    pub password: Secret<String>,
}

impl VoucherCredentials {
    pub fn new(username: &str, password: &str) -> Self {
        Self { username: username.to_string(), password: Secret::new(password.to_string()) }
    }

    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.reveal().is_empty()
    }
}

/// The remote contract for the voucher provider family: issue a barcode+PIN voucher for a fixed
/// amount, query its remaining balance, and cancel half-issued vouchers. Declared with `Send`
/// futures so queue workers can run implementations on spawned tasks; implementations simply
/// write `async fn`.
pub trait VoucherApi: Clone + Send + Sync {
    /// Issue a voucher worth `amount`. `ref_pos` identifies this attempt and can be used to
    /// cancel it if the response is lost or the provider rejects mid-way. A provider-level
    /// rejection is returned as an `Ok` response with a non-Ok result code (the response still
    /// carries the identifiers needed for cancellation); `Err` is reserved for transport
    /// failures.
    fn issue_voucher(
        &self,
        amount: Money,
        ref_pos: i64,
        credentials: &VoucherCredentials,
    ) -> impl Future<Output = Result<IssueVoucherResponse, IntersolveError>> + Send;

    fn get_balance(
        &self,
        barcode: &str,
        pin: &str,
        credentials: &VoucherCredentials,
    ) -> impl Future<Output = Result<Money, IntersolveError>> + Send;

    fn cancel(
        &self,
        card_id: &str,
        transaction_id: &str,
        credentials: &VoucherCredentials,
    ) -> impl Future<Output = Result<(), IntersolveError>> + Send;

    fn cancel_by_ref_pos(
        &self,
        ref_pos: i64,
        credentials: &VoucherCredentials,
    ) -> impl Future<Output = Result<(), IntersolveError>> + Send;
}

#[derive(Clone)]
pub struct IntersolveVoucherClient {
    config: IntersolveVoucherConfig,
    client: Arc<Client>,
}

impl IntersolveVoucherClient {
    pub fn new(config: IntersolveVoucherConfig) -> Result<Self, IntersolveError> {
        let client = Client::builder().build().map_err(|e| IntersolveError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client) })
    }

    async fn post_query<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
        credentials: &VoucherCredentials,
    ) -> Result<T, IntersolveError> {
        let url = format!("{}{path}", self.config.base_url);
        trace!("🎟️ POST {url}");
        let response = self
            .client
            .post(url)
            .basic_auth(&credentials.username, Some(credentials.password.reveal()))
            .json(body)
            .send()
            .await
            .map_err(|e| IntersolveError::Unavailable(e.to_string()))?;
        let status = response.status();
        if status.is_server_error() {
            return Err(IntersolveError::Unavailable(format!(
                "{} - {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("UNKNOWN")
            )));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(IntersolveError::Validation { code: status.as_u16().to_string(), description: message });
        }
        response.json::<T>().await.map_err(|e| IntersolveError::UnexpectedResponse(e.to_string()))
    }
}

impl VoucherApi for IntersolveVoucherClient {
    async fn issue_voucher(
        &self,
        amount: Money,
        ref_pos: i64,
        credentials: &VoucherCredentials,
    ) -> Result<IssueVoucherResponse, IntersolveError> {
        let body = serde_json::json!({
            "value": amount.value(),
            "refPos": ref_pos,
        });
        self.post_query("/issue-card", &body, credentials).await
    }

    async fn get_balance(
        &self,
        barcode: &str,
        pin: &str,
        credentials: &VoucherCredentials,
    ) -> Result<Money, IntersolveError> {
        let body = serde_json::json!({
            "cardId": barcode,
            "pin": pin,
        });
        let response: VoucherBalanceResponse = self.post_query("/get-card", &body, credentials).await?;
        Ok(response.remaining())
    }

    async fn cancel(
        &self,
        card_id: &str,
        transaction_id: &str,
        credentials: &VoucherCredentials,
    ) -> Result<(), IntersolveError> {
        let body = serde_json::json!({
            "cardId": card_id,
            "transactionId": transaction_id,
        });
        let _: serde_json::Value = self.post_query("/cancel", &body, credentials).await?;
        Ok(())
    }

    async fn cancel_by_ref_pos(
        &self,
        ref_pos: i64,
        credentials: &VoucherCredentials,
    ) -> Result<(), IntersolveError> {
        let body = serde_json::json!({ "refPos": ref_pos });
        let _: serde_json::Value = self.post_query("/cancel-transaction-by-refpos", &body, credentials).await?;
        Ok(())
    }
}

//! ============================================================================
//! EVM RPC Store - JSON-RPC client for the subscription contract
//! ============================================================================
//! Reads go through `eth_call` at the latest block; the delegation write goes
//! through `eth_sendTransaction` from the connected account (the node or
//! wallet behind it signs) and is confirmed by polling receipts.
//! ============================================================================

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::abi;
use super::{classify_error, StoreError, SubmissionId, SubmissionStatus, TokenStore};
use crate::config::AccessConfig;
use crate::types::{Account, TokenId};

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

impl RpcErrorObject {
    /// Message plus revert data, which some nodes only put in `data`
    fn describe(&self) -> String {
        match &self.data {
            Some(Value::String(s)) => format!("{} ({}): {}", self.message, self.code, s),
            _ => format!("{} ({})", self.message, self.code),
        }
    }
}

/// JSON-RPC backed token store
pub struct EvmRpcStore {
    client: reqwest::Client,
    rpc_url: String,
    contract: Account,
    next_id: AtomicU64,
}

impl EvmRpcStore {
    /// Create a client for `contract` at `rpc_url`
    pub fn new(rpc_url: &str, contract: Account, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            contract,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &AccessConfig) -> Result<Self> {
        Self::new(
            &config.rpc_url,
            config.contract_address.clone(),
            config.rpc_timeout(),
        )
    }

    pub fn contract(&self) -> &Account {
        &self.contract
    }

    /// Send one JSON-RPC request; `token_id` gives revert classification context
    pub(crate) async fn request(
        &self,
        method: &str,
        params: Value,
        token_id: Option<TokenId>,
    ) -> Result<Value, StoreError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        debug!("RPC {} (id {})", method, request.id);

        let response = self
            .client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("{} request failed: {}", method, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "{} HTTP {}: {}",
                method, status, body
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("{} bad response: {}", method, e)))?;

        unwrap_response(body, token_id)
    }

    async fn call(&self, data: String, token_id: Option<TokenId>) -> Result<String, StoreError> {
        let params = json!([{ "to": self.contract.to_lowercase(), "data": data }, "latest"]);
        let value = self.request("eth_call", params, token_id).await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| StoreError::Unavailable("eth_call returned non-string result".into()))
    }

    async fn call_token(&self, signature: &str, token_id: TokenId) -> Result<String, StoreError> {
        self.call(abi::encode_token_call(signature, token_id), Some(token_id))
            .await
    }
}

fn unwrap_response(body: RpcResponse, token_id: Option<TokenId>) -> Result<Value, StoreError> {
    if let Some(err) = body.error {
        return Err(classify_error(token_id, &err.describe()));
    }
    Ok(body.result.unwrap_or(Value::Null))
}

fn decode_err(e: anyhow::Error) -> StoreError {
    StoreError::Unavailable(format!("undecodable return data: {}", e))
}

/// Map an `eth_getTransactionReceipt` result to a submission status
fn receipt_status(receipt: &Value) -> SubmissionStatus {
    if receipt.is_null() {
        return SubmissionStatus::Pending;
    }
    match receipt.get("status").and_then(Value::as_str) {
        Some("0x1") => SubmissionStatus::Committed,
        Some(other) => SubmissionStatus::Reverted(format!("transaction reverted (status {})", other)),
        // Pre-Byzantium receipts carry no status; inclusion is all we know
        None => SubmissionStatus::Committed,
    }
}

#[async_trait]
impl TokenStore for EvmRpcStore {
    async fn total_issued(&self) -> Result<u64, StoreError> {
        let data = abi::encode_call(abi::SIG_NEXT_TOKEN_ID, &[]);
        let out = self.call(data, None).await?;
        abi::decode_u64(&out).map_err(decode_err)
    }

    async fn owner_of(&self, token_id: TokenId) -> Result<Account, StoreError> {
        let out = self.call_token(abi::SIG_OWNER_OF, token_id).await?;
        let owner = abi::decode_address(&out).map_err(decode_err)?;
        // ownerOf never returns zero for a live token
        if owner.is_zero() {
            return Err(StoreError::NotMinted(token_id));
        }
        Ok(owner)
    }

    async fn is_valid(&self, token_id: TokenId) -> Result<bool, StoreError> {
        let out = self.call_token(abi::SIG_IS_VALID, token_id).await?;
        abi::decode_bool(&out).map_err(decode_err)
    }

    async fn delegate_of(&self, token_id: TokenId) -> Result<Option<Account>, StoreError> {
        let out = self.call_token(abi::SIG_USER_OF, token_id).await?;
        let user = abi::decode_address(&out).map_err(decode_err)?;
        Ok(if user.is_zero() { None } else { Some(user) })
    }

    async fn delegate_expires(&self, token_id: TokenId) -> Result<i64, StoreError> {
        let out = self.call_token(abi::SIG_USER_EXPIRES, token_id).await?;
        abi::decode_i64(&out).map_err(decode_err)
    }

    async fn submit_assignment(
        &self,
        caller: &Account,
        token_id: TokenId,
        delegate: &Account,
        expires_at: i64,
    ) -> Result<SubmissionId, StoreError> {
        let data = abi::encode_set_user(token_id, delegate, expires_at)
            .map_err(|e| StoreError::Rejected(e.to_string()))?;
        let params = json!([{
            "from": caller.to_lowercase(),
            "to": self.contract.to_lowercase(),
            "data": data,
        }]);

        let value = self.request("eth_sendTransaction", params, Some(token_id)).await?;
        value
            .as_str()
            .map(|hash| SubmissionId(hash.to_string()))
            .ok_or_else(|| StoreError::Unavailable("eth_sendTransaction returned no hash".into()))
    }

    async fn assignment_status(&self, id: &SubmissionId) -> Result<SubmissionStatus, StoreError> {
        let receipt = self
            .request("eth_getTransactionReceipt", json!([id.0]), None)
            .await?;
        Ok(receipt_status(&receipt))
    }
}

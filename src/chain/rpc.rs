//! NEAR JSON-RPC client
//!
//! Minimal typed client for on-chain queries and transaction submission.
//! Queries are idempotent and retried with exponential backoff; broadcast
//! calls are never retried automatically — once a signed transaction has
//! left the process it is submitted-or-unknown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// Account state returned by view_account
#[derive(Debug, Clone, Deserialize)]
pub struct AccountView {
    /// Native balance in yoctoNEAR (decimal string)
    pub amount: String,
    /// Balance locked for staking
    #[serde(default)]
    pub locked: String,
    #[serde(default)]
    pub storage_usage: u64,
}

impl AccountView {
    /// Native balance in yoctoNEAR
    pub fn balance_yocto(&self) -> u128 {
        self.amount.parse().unwrap_or(0)
    }
}

/// Function-call permission details on an access key
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionCallPermissionView {
    pub allowance: Option<String>,
    pub receiver_id: String,
    pub method_names: Vec<String>,
}

/// Access-key permission as returned by the chain
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AccessKeyPermissionView {
    /// The string "FullAccess"
    FullAccess(String),
    FunctionCall {
        #[serde(rename = "FunctionCall")]
        function_call: FunctionCallPermissionView,
    },
}

/// Access key state returned by view_access_key
#[derive(Debug, Clone, Deserialize)]
pub struct AccessKeyView {
    pub nonce: u64,
    pub permission: AccessKeyPermissionView,
}

/// One entry of view_access_key_list
#[derive(Debug, Clone, Deserialize)]
pub struct AccessKeyInfoView {
    pub public_key: String,
    pub access_key: AccessKeyView,
}

#[derive(Debug, Clone, Deserialize)]
struct AccessKeyListView {
    keys: Vec<AccessKeyInfoView>,
}

/// Block header fields we consume
#[derive(Debug, Clone, Deserialize)]
pub struct BlockHeaderView {
    pub hash: String,
    pub height: u64,
}

/// Block returned by the block RPC method
#[derive(Debug, Clone, Deserialize)]
pub struct BlockView {
    pub header: BlockHeaderView,
}

/// Raw result of a contract view call
#[derive(Debug, Clone, Deserialize)]
struct CallResultView {
    result: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
struct GasPriceView {
    gas_price: String,
}

/// NEP-148 fungible token metadata fields we consume
#[derive(Debug, Clone, Deserialize)]
pub struct FtMetadataView {
    pub name: String,
    pub symbol: String,
    pub decimals: u32,
}

/// Final execution status of a submitted transaction
#[derive(Debug, Clone, Deserialize)]
pub enum ExecutionStatusView {
    SuccessValue(String),
    SuccessReceiptId(String),
    Failure(Value),
}

impl ExecutionStatusView {
    pub fn is_success(&self) -> bool {
        !matches!(self, ExecutionStatusView::Failure(_))
    }
}

/// Transaction identity inside a final execution outcome
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionInfoView {
    pub hash: String,
}

/// Outcome of broadcast_tx_commit
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionOutcomeView {
    pub status: ExecutionStatusView,
    pub transaction: TransactionInfoView,
}

/// Minimal NEAR JSON-RPC client
pub struct NearRpcClient {
    http: reqwest::Client,
    endpoint: String,
    timeout_ms: u64,
    max_retries: u32,
    request_id: AtomicU64,
}

impl NearRpcClient {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::RpcConnection(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            timeout_ms: config.timeout_ms,
            max_retries: config.max_retries,
            request_id: AtomicU64::new(0),
        })
    }

    /// Execute a JSON-RPC call
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed) + 1;
        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "RPC call");

        let resp = self.http.post(&self.endpoint).json(&payload).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Rpc(format!("HTTP {} from RPC", resp.status())));
        }

        let envelope: Value = resp.json().await?;
        if let Some(err) = envelope.get("error") {
            return Err(Error::Rpc(format!("RPC error: {}", err)));
        }

        let result = envelope
            .get("result")
            .cloned()
            .ok_or_else(|| Error::Rpc("RPC response missing result".into()))?;

        serde_json::from_value(result)
            .map_err(|e| Error::Rpc(format!("Unrecognized RPC response shape: {}", e)))
    }

    /// Execute an idempotent query with bounded exponential backoff.
    ///
    /// Only pure queries go through here. Transient network failures are
    /// retried; RPC-level errors are permanent.
    async fn query<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_millis(
                self.timeout_ms * (self.max_retries as u64 + 1),
            )),
            ..Default::default()
        };

        retry(backoff, || async {
            match self.call::<T>(method, params.clone()).await {
                Ok(v) => Ok(v),
                Err(e) if e.is_retryable() => Err(backoff::Error::transient(e)),
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
    }

    // ------------------------------------------------------------------
    // Account and access-key queries
    // ------------------------------------------------------------------

    /// Get account info (balance, storage)
    pub async fn view_account(&self, account_id: &str) -> Result<AccountView> {
        self.query(
            "query",
            json!({
                "request_type": "view_account",
                "finality": "final",
                "account_id": account_id,
            }),
        )
        .await
    }

    /// Get native NEAR balance in yoctoNEAR
    pub async fn get_balance(&self, account_id: &str) -> Result<u128> {
        Ok(self.view_account(account_id).await?.balance_yocto())
    }

    /// Get access key info for a specific key
    pub async fn view_access_key(
        &self,
        account_id: &str,
        public_key: &str,
    ) -> Result<AccessKeyView> {
        self.query(
            "query",
            json!({
                "request_type": "view_access_key",
                "finality": "final",
                "account_id": account_id,
                "public_key": public_key,
            }),
        )
        .await
    }

    /// List all access keys on an account
    pub async fn view_access_key_list(&self, account_id: &str) -> Result<Vec<AccessKeyInfoView>> {
        let list: AccessKeyListView = self
            .query(
                "query",
                json!({
                    "request_type": "view_access_key_list",
                    "finality": "final",
                    "account_id": account_id,
                }),
            )
            .await?;
        Ok(list.keys)
    }

    // ------------------------------------------------------------------
    // Contract view calls
    // ------------------------------------------------------------------

    /// Call a view function on a contract. Returns the decoded JSON result,
    /// or None if the contract returned no bytes.
    pub async fn view_function(
        &self,
        contract_id: &str,
        method_name: &str,
        args: Option<&Value>,
    ) -> Result<Option<Value>> {
        let args_base64 = match args {
            Some(v) => base64::engine::general_purpose::STANDARD.encode(serde_json::to_vec(v)?),
            None => String::new(),
        };

        let call: CallResultView = self
            .query(
                "query",
                json!({
                    "request_type": "call_function",
                    "finality": "final",
                    "account_id": contract_id,
                    "method_name": method_name,
                    "args_base64": args_base64,
                }),
            )
            .await?;

        if call.result.is_empty() {
            return Ok(None);
        }

        let value = serde_json::from_slice(&call.result)
            .map_err(|e| Error::Rpc(format!("Non-JSON view result from {}: {}", contract_id, e)))?;
        Ok(Some(value))
    }

    /// Get fungible token balance (raw, in smallest unit)
    pub async fn ft_balance_of(&self, token_contract: &str, account_id: &str) -> Result<u128> {
        let result = self
            .view_function(
                token_contract,
                "ft_balance_of",
                Some(&json!({ "account_id": account_id })),
            )
            .await?;

        match result {
            Some(Value::String(s)) => s
                .parse()
                .map_err(|e| Error::Rpc(format!("Bad ft balance '{}': {}", s, e))),
            Some(other) => Err(Error::Rpc(format!("Unexpected ft balance shape: {}", other))),
            None => Ok(0),
        }
    }

    /// Get fungible token metadata (name, symbol, decimals)
    pub async fn ft_metadata(&self, token_contract: &str) -> Result<FtMetadataView> {
        let result = self.view_function(token_contract, "ft_metadata", None).await?;
        match result {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| Error::Rpc(format!("Bad ft_metadata from {}: {}", token_contract, e))),
            None => Err(Error::Rpc(format!("{} returned no ft_metadata", token_contract))),
        }
    }

    // ------------------------------------------------------------------
    // Block / network info
    // ------------------------------------------------------------------

    /// Get the latest final block
    pub async fn get_block(&self) -> Result<BlockView> {
        self.query("block", json!({ "finality": "final" })).await
    }

    /// Get node status (chain id, sync info). Returned untyped: we only
    /// surface it for diagnostics.
    pub async fn status(&self) -> Result<Value> {
        self.query("status", json!([])).await
    }

    /// Current gas price in yoctoNEAR
    pub async fn gas_price(&self) -> Result<u128> {
        let result: GasPriceView = self.query("gas_price", json!([null])).await?;
        result
            .gas_price
            .parse()
            .map_err(|e| Error::Rpc(format!("Bad gas price '{}': {}", result.gas_price, e)))
    }

    // ------------------------------------------------------------------
    // Transaction submission (never auto-retried)
    // ------------------------------------------------------------------

    /// Submit a signed transaction and wait for execution
    pub async fn broadcast_tx_commit(&self, signed_tx_base64: &str) -> Result<ExecutionOutcomeView> {
        self.call("broadcast_tx_commit", json!([signed_tx_base64]))
            .await
            .map_err(|e| Error::TransactionSend(e.to_string()))
    }

    /// Submit a signed transaction asynchronously, returning the tx hash
    pub async fn broadcast_tx_async(&self, signed_tx_base64: &str) -> Result<String> {
        self.call("broadcast_tx_async", json!([signed_tx_base64]))
            .await
            .map_err(|e| Error::TransactionSend(e.to_string()))
    }

    /// Check transaction status
    pub async fn tx_status(&self, tx_hash: &str, sender_id: &str) -> Result<ExecutionOutcomeView> {
        self.query("tx", json!([tx_hash, sender_id])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_view_balance() {
        let view: AccountView = serde_json::from_value(json!({
            "amount": "1250000000000000000000000",
            "locked": "0",
            "storage_usage": 1820,
            "code_hash": "11111111111111111111111111111111",
        }))
        .unwrap();
        assert_eq!(view.balance_yocto(), 1_250_000_000_000_000_000_000_000);
    }

    #[test]
    fn test_access_key_permission_shapes() {
        let full: AccessKeyView = serde_json::from_value(json!({
            "nonce": 85,
            "permission": "FullAccess",
        }))
        .unwrap();
        assert!(matches!(
            full.permission,
            AccessKeyPermissionView::FullAccess(_)
        ));

        let scoped: AccessKeyView = serde_json::from_value(json!({
            "nonce": 3,
            "permission": {
                "FunctionCall": {
                    "allowance": "250000000000000000000000",
                    "receiver_id": "wrap.near",
                    "method_names": ["near_deposit"],
                }
            }
        }))
        .unwrap();
        match scoped.permission {
            AccessKeyPermissionView::FunctionCall { function_call } => {
                assert_eq!(function_call.receiver_id, "wrap.near");
                assert_eq!(function_call.method_names, vec!["near_deposit"]);
            }
            other => panic!("expected FunctionCall permission, got {:?}", other),
        }
    }

    #[test]
    fn test_execution_status_shapes() {
        let ok: ExecutionStatusView =
            serde_json::from_value(json!({ "SuccessValue": "" })).unwrap();
        assert!(ok.is_success());

        let failed: ExecutionStatusView =
            serde_json::from_value(json!({ "Failure": { "ActionError": {} } })).unwrap();
        assert!(!failed.is_success());
    }

    #[test]
    fn test_unrecognized_outcome_rejected() {
        let result: std::result::Result<ExecutionOutcomeView, _> =
            serde_json::from_value(json!({ "weird": true }));
        assert!(result.is_err());
    }
}

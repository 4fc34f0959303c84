//! JSON-RPC access to the auxiliary chain's coin server.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::CoinservConfig;
use crate::error_handling::RpcError;
use crate::types::AuxWorkReply;

pub type RpcResult<T> = Result<T, RpcError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockReply {
    pub hash: String,
    #[serde(default)]
    pub tx: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxDetail {
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionReply {
    #[serde(default)]
    pub details: Vec<TxDetail>,
}

/// The calls the monitor makes against an aux chain node. Any error means
/// "try again later".
#[async_trait]
pub trait NodeRpc: Send + Sync {
    async fn get_auxiliary_work(&self) -> RpcResult<AuxWorkReply>;

    async fn get_block_count(&self) -> RpcResult<u64>;

    /// `Ok(true)` only when the node accepted the block outright.
    async fn submit_auxiliary_block(&self, hash_hex: &str, auxpow_hex: &str) -> RpcResult<bool>;

    async fn get_block_hash(&self, height: u64) -> RpcResult<String>;

    async fn get_block(&self, hash: &str) -> RpcResult<BlockReply>;

    async fn get_transaction(&self, txid: &str) -> RpcResult<TransactionReply>;
}

/// bitcoind-style JSON-RPC 1.0 client.
pub struct CoinservRpc {
    url: String,
    username: Option<String>,
    password: Option<String>,
    http: Client,
    next_id: AtomicU64,
}

impl CoinservRpc {
    pub fn new(cfg: &CoinservConfig) -> RpcResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;

        let url = if !cfg.url.starts_with("http") {
            format!("http://{}", cfg.url)
        } else {
            cfg.url.clone()
        };

        Ok(Self {
            url,
            username: cfg.username.clone(),
            password: cfg.password.clone(),
            http,
            next_id: AtomicU64::new(0),
        })
    }

    pub async fn call(&self, method: &str, params: Value) -> RpcResult<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut req = self.http.post(&self.url).json(&body);
        if let Some(user) = &self.username {
            req = req.basic_auth(user, self.password.as_ref());
        }

        let resp = req.send().await?;
        let status = resp.status();
        // bitcoind answers node-level errors with HTTP 500 and a JSON body
        let json: Value = match resp.json().await {
            Ok(json) => json,
            Err(_) if !status.is_success() => return Err(RpcError::Http(status.as_u16())),
            Err(e) => return Err(e.into()),
        };
        debug!("rpc {} #{} -> {}", method, id, status);

        if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
            return Err(RpcError::Node {
                code: err.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: err
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        if !status.is_success() {
            return Err(RpcError::Http(status.as_u16()));
        }

        json.get("result")
            .cloned()
            .ok_or_else(|| RpcError::malformed(format!("{method}: reply has no result")))
    }

    async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> RpcResult<T> {
        let result = self.call(method, params).await?;
        serde_json::from_value(result).map_err(|e| RpcError::malformed(format!("{method}: {e}")))
    }
}

#[async_trait]
impl NodeRpc for CoinservRpc {
    async fn get_auxiliary_work(&self) -> RpcResult<AuxWorkReply> {
        self.call_as("getauxblock", json!([])).await
    }

    async fn get_block_count(&self) -> RpcResult<u64> {
        self.call_as("getblockcount", json!([])).await
    }

    async fn submit_auxiliary_block(&self, hash_hex: &str, auxpow_hex: &str) -> RpcResult<bool> {
        let result = self.call("getauxblock", json!([hash_hex, auxpow_hex])).await?;
        Ok(submission_accepted(&result))
    }

    async fn get_block_hash(&self, height: u64) -> RpcResult<String> {
        self.call_as("getblockhash", json!([height])).await
    }

    async fn get_block(&self, hash: &str) -> RpcResult<BlockReply> {
        self.call_as("getblock", json!([hash])).await
    }

    async fn get_transaction(&self, txid: &str) -> RpcResult<TransactionReply> {
        self.call_as("gettransaction", json!([txid])).await
    }
}

/// Only a literal `true` counts; `false`, `null` or a reason string are
/// rejections.
pub fn submission_accepted(result: &Value) -> bool {
    matches!(result, Value::Bool(true))
}

//! JSON-RPC 2.0 wire types and the HTTP client used by clients and the CLI.

use crate::blockchain::{AccountInfo, BlockInfo, BlockInfoList, Sha256Hash};
use crate::crypto::{self, Address};
use crate::error::{LedgerError, Result};
use crate::sync::BlockSource;
use crate::transaction::{Transaction, TransactionInfo};
use hyper::client::HttpConnector;
use hyper::{Body, Client, Method, Request};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const JSONRPC_VERSION: &str = "2.0";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;
pub const SERVER_ERROR: i64 = -32000;
pub const NOT_FOUND: i64 = -32001;
pub const STORAGE_ERROR: i64 = -32002;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub mod methods {
    pub const GET_ACCOUNT_INFO: &str = "chain.GetAccountInfo";
    pub const GET_TRANSACTION_BY_HASH: &str = "chain.GetTransactionByHash";
    pub const GET_BLOCK_BY_HASH: &str = "chain.GetBlockByHash";
    pub const GET_BLOCK_BY_HEIGHT: &str = "chain.GetBlockByHeight";
    pub const GET_BLOCKS_INTERVAL: &str = "chain.GetBlocksInterval";
    pub const SEND_TRANSACTION: &str = "chain.SendTransaction";
    pub const GET_CURRENT_BLOCK_HEIGHT: &str = "chain.GetCurrentBlockHeight";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
    pub id: Value,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        RpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn failure(id: Value, error: RpcErrorObject) -> Self {
        RpcResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
}

impl RpcErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        RpcErrorObject {
            code,
            message: message.into(),
        }
    }
}

impl From<LedgerError> for RpcErrorObject {
    fn from(err: LedgerError) -> Self {
        let code = match err {
            LedgerError::NotFound(_) => NOT_FOUND,
            LedgerError::InvalidArgument(_) => INVALID_PARAMS,
            LedgerError::Storage(_) => STORAGE_ERROR,
            _ => SERVER_ERROR,
        };
        RpcErrorObject::new(code, err.to_string())
    }
}

impl From<RpcErrorObject> for LedgerError {
    fn from(err: RpcErrorObject) -> Self {
        match err.code {
            NOT_FOUND => LedgerError::NotFound(err.message),
            INVALID_PARAMS => LedgerError::InvalidArgument(err.message),
            code => LedgerError::Network(format!("RPC error {}: {}", code, err.message)),
        }
    }
}

/// `chain.GetBlocksInterval` parameter; both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInterval {
    pub left: u64,
    pub right: u64,
}

/// JSON-RPC client for a remote node.
#[derive(Debug)]
pub struct RpcClient {
    url: String,
    client: Client<HttpConnector>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        let uri: hyper::Uri = url
            .parse()
            .map_err(|e| LedgerError::Config(format!("Invalid remote url {:?}: {}", url, e)))?;
        if uri.scheme_str() != Some("http") {
            return Err(LedgerError::Config(format!(
                "Remote url must use http: {}",
                url
            )));
        }

        Ok(RpcClient {
            url,
            client: Client::new(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Calls `method` with `param` wrapped in a one-element params array.
    pub async fn call<P, R>(&self, method: &str, param: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = match param {
            Some(p) => Some(Value::Array(vec![serde_json::to_value(p).map_err(|e| {
                LedgerError::InvalidArgument(format!("Failed to encode params: {}", e))
            })?])),
            None => None,
        };
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id: Value::from(id),
        };
        let body = serde_json::to_vec(&request)
            .map_err(|e| LedgerError::Network(format!("Failed to encode request: {}", e)))?;

        let http_request = Request::builder()
            .method(Method::POST)
            .uri(self.url.as_str())
            .header("content-type", "application/json")
            .body(Body::from(body))
            .map_err(|e| LedgerError::Network(format!("Failed to build request: {}", e)))?;

        let response = tokio::time::timeout(REQUEST_TIMEOUT, self.client.request(http_request))
            .await
            .map_err(|_| LedgerError::Network(format!("{} timed out", method)))?
            .map_err(|e| LedgerError::Network(format!("{} failed: {}", method, e)))?;

        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body())
            .await
            .map_err(|e| LedgerError::Network(format!("Failed to read response: {}", e)))?;

        let rpc_response: RpcResponse = serde_json::from_slice(&bytes).map_err(|e| {
            LedgerError::Network(format!("Invalid response (HTTP {}): {}", status, e))
        })?;
        if let Some(error) = rpc_response.error {
            return Err(error.into());
        }

        let result = rpc_response.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| LedgerError::Network(format!("Unexpected {} result: {}", method, e)))
    }

    pub async fn get_account_info(&self, address: &Address) -> Result<AccountInfo> {
        self.call(
            methods::GET_ACCOUNT_INFO,
            Some(crypto::address_to_hex(address)),
        )
        .await
    }

    pub async fn get_transaction_by_hash(&self, hash: &Sha256Hash) -> Result<TransactionInfo> {
        self.call(methods::GET_TRANSACTION_BY_HASH, Some(hex::encode(hash)))
            .await
    }

    pub async fn get_block_by_hash(&self, hash: &Sha256Hash) -> Result<BlockInfo> {
        self.call(methods::GET_BLOCK_BY_HASH, Some(hex::encode(hash)))
            .await
    }

    pub async fn get_block_by_height(&self, height: u64) -> Result<BlockInfo> {
        self.call(methods::GET_BLOCK_BY_HEIGHT, Some(height)).await
    }

    pub async fn get_blocks_interval(&self, left: u64, right: u64) -> Result<BlockInfoList> {
        self.call(methods::GET_BLOCKS_INTERVAL, Some(BlockInterval { left, right }))
            .await
    }

    pub async fn send_transaction(&self, tx: &Transaction) -> Result<bool> {
        self.call(methods::SEND_TRANSACTION, Some(tx.to_base64()?))
            .await
    }

    pub async fn get_current_block_height(&self) -> Result<u64> {
        self.call::<(), _>(methods::GET_CURRENT_BLOCK_HEIGHT, None)
            .await
    }
}

impl BlockSource for RpcClient {
    async fn get_blocks_interval(&self, left: u64, right: u64) -> Result<BlockInfoList> {
        RpcClient::get_blocks_interval(self, left, right).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let not_found: RpcErrorObject = LedgerError::NotFound("tx".into()).into();
        assert_eq!(not_found.code, NOT_FOUND);

        let invalid: RpcErrorObject = LedgerError::InvalidArgument("bad".into()).into();
        assert_eq!(invalid.code, INVALID_PARAMS);

        let storage: RpcErrorObject = LedgerError::Storage("disk".into()).into();
        assert_eq!(storage.code, STORAGE_ERROR);

        let other: RpcErrorObject = LedgerError::Crypto("x".into()).into();
        assert_eq!(other.code, SERVER_ERROR);
    }

    #[test]
    fn test_remote_errors_map_back() {
        let err: LedgerError = RpcErrorObject::new(NOT_FOUND, "missing").into();
        assert_eq!(err, LedgerError::NotFound("missing".into()));

        let err: LedgerError = RpcErrorObject::new(METHOD_NOT_FOUND, "nope").into();
        assert!(matches!(err, LedgerError::Network(_)));
    }

    #[test]
    fn test_request_envelope() {
        let request = RpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: methods::GET_BLOCKS_INTERVAL.to_string(),
            params: Some(serde_json::json!([BlockInterval { left: 1, right: 10 }])),
            id: Value::from(1),
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["params"][0]["left"], 1);
        assert_eq!(encoded["params"][0]["right"], 10);
        assert_eq!(encoded["jsonrpc"], "2.0");
    }

    #[test]
    fn test_client_rejects_bad_url() {
        assert!(RpcClient::new("not a url").is_err());
        assert!(RpcClient::new("https://example.com").is_err());
        assert!(RpcClient::new("http://127.0.0.1:12345").is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_remote_is_network_error() {
        let client = RpcClient::new("http://127.0.0.1:1").unwrap();
        assert!(matches!(
            client.get_current_block_height().await,
            Err(LedgerError::Network(_))
        ));
    }
}

//! # JSON-RPC Client
//!
//! Minimal Ethereum JSON-RPC client over a static list of URLs.
//!
//! Each call tries the URLs in order and returns the first success. Any
//! failure (transport, HTTP status, malformed body, JSON-RPC error) moves on
//! to the next URL. There is no backoff and no retry of the same URL.

use creator_vault_core::Address;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;

/// Per-request timeout.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// ERROR TYPE
// =============================================================================

/// Errors from the RPC client.
#[derive(Debug, Error)]
pub enum RpcError {
    /// No URL is configured.
    #[error("no RPC URL configured")]
    NoEndpoints,

    /// Every URL failed; carries the last failure.
    #[error("all {attempts} RPC endpoints failed, last error: {last}")]
    AllFailed { attempts: usize, last: String },

    /// A successful response carried an unexpected result.
    #[error("unexpected RPC result: {0}")]
    InvalidResult(String),

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

// =============================================================================
// CLIENT
// =============================================================================

/// Ethereum JSON-RPC client with sequential URL fallback.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    urls: Vec<String>,
}

impl RpcClient {
    pub fn new(urls: Vec<String>) -> Result<Self, RpcError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { client, urls })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Call `method` with `params`, falling back across URLs.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        if self.urls.is_empty() {
            return Err(RpcError::NoEndpoints);
        }
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let mut last = String::new();
        for url in &self.urls {
            match self.call_one(url, &body).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!(url = %url, method, error = %e, "RPC endpoint failed");
                    last = e;
                }
            }
        }
        Err(RpcError::AllFailed {
            attempts: self.urls.len(),
            last,
        })
    }

    async fn call_one(&self, url: &str, body: &Value) -> Result<Value, String> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }
        let parsed: RpcResponse = response.json().await.map_err(|e| e.to_string())?;
        if let Some(err) = parsed.error {
            return Err(format!("RPC error {}: {}", err.code, err.message));
        }
        parsed.result.ok_or_else(|| "response has no result".to_string())
    }

    /// `eth_blockNumber`.
    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let result = self.call("eth_blockNumber", json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| RpcError::InvalidResult(result.to_string()))?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16)
            .map_err(|_| RpcError::InvalidResult(hex.to_string()))
    }

    /// `eth_getCode` at the latest block, as returned (`0x`-prefixed hex).
    pub async fn get_code(&self, address: &Address) -> Result<String, RpcError> {
        let result = self
            .call("eth_getCode", json!([address.to_lower_hex(), "latest"]))
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| RpcError::InvalidResult(result.to_string()))
    }

    /// True when `address` holds contract code.
    pub async fn has_code(&self, address: &Address) -> Result<bool, RpcError> {
        let code = self.get_code(address).await?;
        let hex = code.trim_start_matches("0x");
        Ok(!hex.is_empty() && hex.chars().any(|c| c != '0'))
    }
}

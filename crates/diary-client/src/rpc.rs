//! JSON-RPC transport to the chain node / wallet
//!
//! The same transport carries standard `eth_*` calls and the node's custom
//! engine metadata method used in simulated mode.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use diary_core::{Address, NetworkId};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::RpcError;

/// Node method returning the engine's ACL / input verifier / KMS verifier addresses
pub const METADATA_METHOD: &str = "fhevm_relayer_metadata";

/// Minimal JSON-RPC surface the client needs
pub trait ChainRpc: Send + Sync {
    fn request(
        &self,
        method: &str,
        params: Value,
    ) -> impl Future<Output = Result<Value, RpcError>> + Send;
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcEnvelope {
    result: Option<Value>,
    error: Option<RpcErrorObject>,
}

/// JSON-RPC over HTTP
#[derive(Clone)]
pub struct HttpRpc {
    http: Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl HttpRpc {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ChainRpc for HttpRpc {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::debug!(method, id, "RPC request");

        let resp = self.http.post(&self.url).json(&body).send().await?;
        if !resp.status().is_success() {
            return Err(RpcError::Status {
                status: resp.status().as_u16(),
            });
        }

        let envelope: RpcEnvelope = resp.json().await?;
        if let Some(err) = envelope.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        Ok(envelope.result.unwrap_or(Value::Null))
    }
}

/// Parse a hex quantity (`"0x7a69"`) into a u64
pub fn parse_quantity(value: &Value) -> Option<u64> {
    let s = value.as_str()?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16).ok()
}

/// `eth_chainId`
pub async fn chain_id<R: ChainRpc>(rpc: &R) -> Result<NetworkId, RpcError> {
    let value = rpc.request("eth_chainId", json!([])).await?;
    parse_quantity(&value)
        .ok_or_else(|| RpcError::InvalidResponse(format!("bad chain id: {value}")))
}

/// `eth_accounts`: accounts the wallet currently exposes
pub async fn accounts<R: ChainRpc>(rpc: &R) -> Result<Vec<Address>, RpcError> {
    let value = rpc.request("eth_accounts", json!([])).await?;
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory RPC for unit tests

    use std::sync::Mutex;

    use super::*;

    type Handler = dyn Fn(&str, &Value) -> Result<Value, RpcError> + Send + Sync;

    #[derive(Clone)]
    pub struct MockRpc {
        handler: Arc<Handler>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl MockRpc {
        pub fn new(
            handler: impl Fn(&str, &Value) -> Result<Value, RpcError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                handler: Arc::new(handler),
                calls: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        pub fn count(&self, method: &str) -> usize {
            self.calls().iter().filter(|m| *m == method).count()
        }
    }

    impl ChainRpc for MockRpc {
        async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
            self.calls.lock().unwrap().push(method.to_string());
            (self.handler)(method, &params)
        }
    }
}

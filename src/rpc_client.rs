// src/rpc_client.rs
//
// Vault node access through an ethers `Provider<Http>`. Default implementation of both the
// read side (`VaultReader`) and the atomic write side (`AtomicSubmitter`). Method names come
// from `[rpc]` in Config.toml.

use crate::address::PoolId;
use crate::error::SubmitError;
use crate::multicall::{AtomicSubmitter, Call, TxHandle};
use crate::registry::VaultReader;
use crate::settings::Settings;
use crate::types::WireAmount;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::prelude::{Http, Provider};
use log::debug;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Method names used by [`JsonRpcClient`].
#[derive(Debug, Clone)]
pub struct RpcMethods {
    pub pool_list: String,
    pub balance: String,
    pub submit: String,
}

pub struct JsonRpcClient {
    provider: Arc<Provider<Http>>,
    vault: PoolId,
    methods: RpcMethods,
}

impl JsonRpcClient {
    pub fn new(provider: Arc<Provider<Http>>, vault: PoolId, methods: RpcMethods) -> Self {
        Self {
            provider,
            vault,
            methods,
        }
    }

    /// Builds an HTTP provider for `url` whose requests give up after `timeout`.
    pub fn connect(url: &str, vault: PoolId, methods: RpcMethods, timeout: Duration) -> Result<Self> {
        let endpoint = reqwest::Url::parse(url).with_context(|| format!("invalid RPC url {:?}", url))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build RPC HTTP client")?;
        let provider = Provider::new(Http::new_with_client(endpoint, client));
        Ok(Self::new(Arc::new(provider), vault, methods))
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let vault = settings
            .vault
            .address
            .parse()
            .context("vault.address is not a valid address")?;
        Self::connect(
            &settings.rpc.url,
            vault,
            RpcMethods {
                pool_list: settings.rpc.pool_list_method.clone(),
                balance: settings.rpc.balance_method.clone(),
                submit: settings.rpc.submit_method.clone(),
            },
            Duration::from_millis(settings.rpc.timeout_ms),
        )
    }

    pub fn provider(&self) -> &Arc<Provider<Http>> {
        &self.provider
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        debug!("RPC {} {}", method, params);
        self.provider
            .request(method, params)
            .await
            .with_context(|| format!("RPC {} failed", method))
    }
}

/// Extracts the transaction hash from a submit result: a bare string, or an object with
/// `transaction_hash` or `hash`.
fn tx_handle_from(result: Value) -> Result<TxHandle, SubmitError> {
    match result {
        Value::String(hash) => Ok(TxHandle(hash)),
        Value::Object(ref map) => map
            .get("transaction_hash")
            .or_else(|| map.get("hash"))
            .and_then(Value::as_str)
            .map(|hash| TxHandle(hash.to_string()))
            .ok_or_else(|| SubmitError::Rejected(format!("no transaction hash in {}", result))),
        other => Err(SubmitError::Rejected(format!("unexpected submit result {}", other))),
    }
}

#[async_trait]
impl VaultReader for JsonRpcClient {
    async fn get_pool_list(&self) -> Result<Value> {
        self.call(&self.methods.pool_list, json!([self.vault.canonical()]))
            .await
    }

    async fn balance_of(&self, pool: &PoolId, asset: &PoolId) -> Result<WireAmount> {
        let raw = self
            .call(
                &self.methods.balance,
                json!([self.vault.canonical(), pool.canonical(), asset.canonical()]),
            )
            .await?;
        serde_json::from_value(raw.clone())
            .with_context(|| format!("unrecognized balance shape for pool {}: {}", pool, raw))
    }
}

#[async_trait]
impl AtomicSubmitter for JsonRpcClient {
    async fn submit_atomic(&self, calls: &[Call]) -> Result<TxHandle, SubmitError> {
        let params = json!([serde_json::to_value(calls).map_err(|e| SubmitError::Transport(e.into()))?]);
        let result = self.call(&self.methods.submit, params).await?;
        tx_handle_from(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn methods() -> RpcMethods {
        RpcMethods {
            pool_list: "vault_getAllowedPools".to_string(),
            balance: "vault_getPoolBalance".to_string(),
            submit: "vault_executeCalls".to_string(),
        }
    }

    #[test]
    fn test_tx_handle_shapes() {
        assert_eq!(tx_handle_from(json!("0xabc")).unwrap(), TxHandle("0xabc".to_string()));
        assert_eq!(
            tx_handle_from(json!({"transaction_hash": "0x1"})).unwrap(),
            TxHandle("0x1".to_string())
        );
        assert_eq!(tx_handle_from(json!({"hash": "0x2"})).unwrap(), TxHandle("0x2".to_string()));
    }

    #[test]
    fn test_tx_handle_rejects_unknown_results() {
        assert!(matches!(tx_handle_from(json!({"status": "ok"})), Err(SubmitError::Rejected(_))));
        assert!(matches!(tx_handle_from(json!(null)), Err(SubmitError::Rejected(_))));
    }

    #[test]
    fn test_connect_rejects_bad_url() {
        let vault = crate::address::normalize("0x1").unwrap();
        assert!(JsonRpcClient::connect("not a url", vault, methods(), Duration::from_secs(1)).is_err());
        assert!(JsonRpcClient::connect("http://127.0.0.1:5050", vault, methods(), Duration::from_secs(1)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_node_surfaces_error() {
        let vault = crate::address::normalize("0x1").unwrap();
        let client =
            JsonRpcClient::connect("http://127.0.0.1:9", vault, methods(), Duration::from_millis(200)).unwrap();
        let err = client.get_pool_list().await.unwrap_err();
        assert!(err.to_string().contains("vault_getAllowedPools"));
    }
}

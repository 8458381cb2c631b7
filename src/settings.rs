use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::env;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Rpc {
    pub url: String,
    /// JSON-RPC method returning the vault's allowed pool list
    #[serde(default = "default_pool_list_method")]
    pub pool_list_method: String,
    /// JSON-RPC method returning the balance of `<pool, asset>`
    #[serde(default = "default_balance_method")]
    pub balance_method: String,
    /// JSON-RPC method executing an ordered call list atomically
    #[serde(default = "default_submit_method")]
    pub submit_method: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_pool_list_method() -> String {
    "vault_getAllowedPools".to_string()
}
fn default_balance_method() -> String {
    "vault_getPoolBalance".to_string()
}
fn default_submit_method() -> String {
    "vault_executeCalls".to_string()
}
fn default_rpc_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct MarketData {
    pub url: String,
    #[serde(default = "default_market_data_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_market_data_timeout_ms() -> u64 {
    3_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct Vault {
    /// Vault contract that receives the rebalance and pool-list calls
    pub address: String,
    /// The single pooled asset
    pub asset_address: String,
    pub asset_symbol: String,
    pub asset_decimals: u8,
    /// Smallest transferable amount, in base units
    #[serde(default = "default_min_transfer_units")]
    pub min_transfer_units: u64,
    #[serde(default)]
    pub entrypoints: Entrypoints,
}

fn default_min_transfer_units() -> u64 {
    1
}

#[derive(Debug, Deserialize, Clone)]
pub struct Entrypoints {
    #[serde(default = "default_withdraw_entrypoint")]
    pub withdraw: String,
    #[serde(default = "default_deposit_entrypoint")]
    pub deposit: String,
    #[serde(default = "default_set_pools_entrypoint")]
    pub set_allowed_pools: String,
}

fn default_withdraw_entrypoint() -> String {
    "withdraw_from_pool".to_string()
}
fn default_deposit_entrypoint() -> String {
    "deposit_to_pool".to_string()
}
fn default_set_pools_entrypoint() -> String {
    "set_allowed_pools".to_string()
}

impl Default for Entrypoints {
    fn default() -> Self {
        Self {
            withdraw: default_withdraw_entrypoint(),
            deposit: default_deposit_entrypoint(),
            set_allowed_pools: default_set_pools_entrypoint(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Fetch {
    /// Upper bound on in-flight per-pool requests
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_max_concurrency() -> usize {
    8
}

impl Default for Fetch {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub rpc: Rpc,
    pub market_data: MarketData,
    pub vault: Vault,
    #[serde(default)]
    pub fetch: Fetch,
}

impl Settings {
    /// Loads `Config.toml` from the working directory.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_file("Config.toml")
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        let mut settings: Self = s.try_deserialize()?;
        settings.apply_env_overrides();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(url) = non_empty_env("VAULT_RPC_URL") {
            self.rpc.url = url;
        }
        if let Some(url) = non_empty_env("VAULT_MARKET_DATA_URL") {
            self.market_data.url = url;
        }
        if let Some(address) = non_empty_env("VAULT_ADDRESS") {
            self.vault.address = address;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch.max_concurrency == 0 {
            return Err(ConfigError::Message(
                "fetch.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.vault.min_transfer_units == 0 {
            return Err(ConfigError::Message(
                "vault.min_transfer_units must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

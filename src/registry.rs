// src/registry.rs
//
// Fetches the vault's allowed pool list from the read RPC. The endpoint has returned the list
// as a plain array, as an object keyed by stringified indices, and wrapped in a `result`
// envelope; all of them decode here into `Vec<PoolEntry>`.

use crate::address::{normalize_value, PoolId};
use crate::call_policy::CallPolicy;
use crate::error::RegistryError;
use crate::metrics;
use crate::pools::{PoolEntry, BPS_DENOMINATOR};
use crate::types::conversions::parse_u256_word;
use crate::types::WireAmount;
use async_trait::async_trait;
use ethers::types::U256;
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;

/// Read side of the blockchain RPC.
#[async_trait]
pub trait VaultReader: Send + Sync {
    /// Raw pool-list payload, in whatever shape the endpoint returns.
    async fn get_pool_list(&self) -> anyhow::Result<Value>;

    /// Balance the vault holds in `pool`, denominated in `asset` base units.
    async fn balance_of(&self, pool: &PoolId, asset: &PoolId) -> anyhow::Result<WireAmount>;
}

const POOL_ID_KEYS: &[&str] = &["pool_id", "pool", "pool_address", "address"];
const SHARE_TOKEN_KEYS: &[&str] = &["share_token", "v_token", "vtoken", "share"];
const WEIGHT_KEYS: &[&str] = &["max_weight_bps", "max_weight", "weight"];

/// Source of truth for which pools the vault may allocate into. Never caches.
pub struct PoolRegistry<R: ?Sized> {
    reader: Arc<R>,
    policy: CallPolicy,
}

impl<R: VaultReader + ?Sized> PoolRegistry<R> {
    pub fn new(reader: Arc<R>, policy: CallPolicy) -> Self {
        Self { reader, policy }
    }

    /// Fetches and decodes the allowed pool list.
    ///
    /// # Errors
    ///
    /// `RegistryUnavailable` on transport failure, timeout, an unrecognized payload shape,
    /// or when every entry in a non-empty list is malformed.
    pub async fn fetch_allowed_pools(&self) -> Result<Vec<PoolEntry>, RegistryError> {
        let raw = self
            .policy
            .required("get_pool_list", self.reader.get_pool_list())
            .await
            .map_err(|e| {
                metrics::increment_registry_fetch("unavailable");
                RegistryError::RegistryUnavailable(e.to_string())
            })?;
        let entries = parse_pool_list(&raw).map_err(|e| {
            metrics::increment_registry_fetch("malformed");
            e
        })?;
        metrics::increment_registry_fetch("ok");
        info!("Pool registry returned {} allowed pools", entries.len());
        Ok(entries)
    }
}

/// Decodes a raw pool-list payload.
pub fn parse_pool_list(raw: &Value) -> Result<Vec<PoolEntry>, RegistryError> {
    let items = list_items(raw)?;
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let total = items.len();
    let mut pools: IndexMap<PoolId, PoolEntry> = IndexMap::with_capacity(total);
    for (index, item) in items.into_iter().enumerate() {
        match parse_entry(item) {
            Ok(entry) => {
                if pools.contains_key(&entry.pool_id) {
                    warn!("Skipping duplicate registry entry #{} for pool {}", index, entry.pool_id);
                    metrics::increment_registry_skipped("duplicate");
                    continue;
                }
                pools.insert(entry.pool_id, entry);
            }
            Err(reason) => {
                warn!("Skipping malformed registry entry #{}: {} ({})", index, reason, item);
                metrics::increment_registry_skipped("malformed");
            }
        }
    }

    if pools.is_empty() {
        return Err(RegistryError::RegistryUnavailable(format!(
            "all {} registry entries are malformed",
            total
        )));
    }
    debug!("Decoded {}/{} registry entries", pools.len(), total);
    Ok(pools.into_values().collect())
}

fn list_items(raw: &Value) -> Result<Vec<&Value>, RegistryError> {
    let mut current = raw;
    while let Some(inner) = current.as_object().and_then(|o| o.get("result")) {
        current = inner;
    }
    match current {
        Value::Array(items) => Ok(items.iter().collect()),
        Value::Object(map) => {
            let mut indexed = Vec::with_capacity(map.len());
            for (key, value) in map {
                let index: usize = key.parse().map_err(|_| {
                    RegistryError::RegistryUnavailable(format!(
                        "unrecognized pool list object key {:?}",
                        key
                    ))
                })?;
                indexed.push((index, value));
            }
            indexed.sort_by_key(|(index, _)| *index);
            Ok(indexed.into_iter().map(|(_, value)| value).collect())
        }
        other => Err(RegistryError::RegistryUnavailable(format!(
            "unrecognized pool list payload: {}",
            other
        ))),
    }
}

fn field<'a>(object: &'a serde_json::Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| object.get(*k))
}

fn parse_entry(item: &Value) -> Result<PoolEntry, String> {
    let (pool, share, weight) = match item {
        Value::Object(object) => (
            field(object, POOL_ID_KEYS).ok_or("missing pool id")?,
            field(object, SHARE_TOKEN_KEYS).ok_or("missing share token")?,
            field(object, WEIGHT_KEYS).ok_or("missing max weight")?,
        ),
        Value::Array(tuple) if tuple.len() == 3 => (&tuple[0], &tuple[1], &tuple[2]),
        _ => return Err("entry is neither an object nor a 3-tuple".to_string()),
    };

    let pool_id = normalize_value(pool).map_err(|e| e.to_string())?;
    let share_token = normalize_value(share).map_err(|e| e.to_string())?;
    let max_weight_bps = parse_weight(weight)?;
    Ok(PoolEntry::new(pool_id, share_token, max_weight_bps))
}

fn parse_weight(value: &Value) -> Result<u32, String> {
    let weight = match value {
        Value::Number(n) => n.as_u64().map(U256::from).ok_or("weight is not a non-negative integer")?,
        Value::String(s) => parse_u256_word(s).map_err(|e| e.to_string())?,
        _ => return Err("weight has unsupported JSON type".to_string()),
    };
    if weight.is_zero() || weight > U256::from(BPS_DENOMINATOR) {
        return Err(format!("max weight {} bps outside [1, {}]", weight, BPS_DENOMINATOR));
    }
    Ok(weight.as_u32())
}

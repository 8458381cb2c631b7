// src/pool_config.rs
//
// Pure edits to the vault's allow-list. Every operation returns the complete new list; the
// caller submits it as a whole-list replacement, never as an incremental edit.

use crate::address::PoolId;
use crate::error::{PoolConfigError, SubmitError};
use crate::multicall::{submit_once, AtomicSubmitter, Call, TxHandle};
use crate::pools::PoolEntry;
use ethers::types::U256;
use log::info;

/// Appends `new_entry`.
///
/// # Errors
///
/// `DuplicatePool` if the pool id or the share token is already configured, `InvalidWeight`
/// if the weight is outside `[1, 10000]`.
pub fn add(current: &[PoolEntry], new_entry: PoolEntry) -> Result<Vec<PoolEntry>, PoolConfigError> {
    if let Some(existing) = current
        .iter()
        .find(|e| e.pool_id == new_entry.pool_id || e.share_token == new_entry.share_token)
    {
        return Err(PoolConfigError::DuplicatePool(existing.pool_id));
    }
    if !new_entry.weight_in_range() {
        return Err(PoolConfigError::InvalidWeight(new_entry.max_weight_bps));
    }

    info!(
        "Adding pool {} (share token {}, max weight {} bps)",
        new_entry.pool_id, new_entry.share_token, new_entry.max_weight_bps
    );
    let mut updated = current.to_vec();
    updated.push(new_entry);
    Ok(updated)
}

/// Drops the entry whose share token is `share_token`.
///
/// `last_known_balance` is the vault's balance in that pool; only an empty pool may go.
pub fn remove(
    current: &[PoolEntry],
    share_token: &PoolId,
    last_known_balance: U256,
) -> Result<Vec<PoolEntry>, PoolConfigError> {
    let target = current
        .iter()
        .find(|e| &e.share_token == share_token)
        .ok_or(PoolConfigError::UnknownPool(*share_token))?;
    if !last_known_balance.is_zero() {
        return Err(PoolConfigError::NonEmptyBalance {
            pool: target.pool_id,
            balance: last_known_balance,
        });
    }

    let updated: Vec<PoolEntry> = current
        .iter()
        .filter(|e| &e.share_token != share_token)
        .cloned()
        .collect();
    if updated.is_empty() {
        return Err(PoolConfigError::LastPoolRemaining);
    }
    info!("Removing pool {}", target.pool_id);
    Ok(updated)
}

/// Replaces the share token of `pool_id`.
pub fn update_share_token(
    current: &[PoolEntry],
    pool_id: &PoolId,
    new_share_token: PoolId,
) -> Result<Vec<PoolEntry>, PoolConfigError> {
    if !current.iter().any(|e| &e.pool_id == pool_id) {
        return Err(PoolConfigError::UnknownPool(*pool_id));
    }
    if let Some(other) = current
        .iter()
        .find(|e| &e.pool_id != pool_id && e.share_token == new_share_token)
    {
        return Err(PoolConfigError::DuplicatePool(other.pool_id));
    }

    Ok(current
        .iter()
        .map(|e| {
            if &e.pool_id == pool_id {
                PoolEntry::new(e.pool_id, new_share_token, e.max_weight_bps)
            } else {
                e.clone()
            }
        })
        .collect())
}

/// Encodes a whole-list replacement as one call on the vault.
///
/// Arguments are the entry count followed by `pool, share_token, max_weight` per entry.
pub fn to_call(vault: PoolId, entrypoint: &str, entries: &[PoolEntry]) -> Call {
    let mut arguments = Vec::with_capacity(1 + entries.len() * 3);
    arguments.push(format!("{:#x}", entries.len()));
    for entry in entries {
        arguments.push(entry.pool_id.canonical());
        arguments.push(entry.share_token.canonical());
        arguments.push(format!("{:#x}", entry.max_weight_bps));
    }
    Call::new(vault, entrypoint, arguments)
}

/// Submits `entries` as the vault's new allow-list, exactly once.
pub async fn submit_pool_list<S: AtomicSubmitter + ?Sized>(
    submitter: &S,
    vault: PoolId,
    entrypoint: &str,
    entries: &[PoolEntry],
) -> Result<TxHandle, SubmitError> {
    submit_once(submitter, &[to_call(vault, entrypoint, entries)]).await
}

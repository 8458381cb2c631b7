// src/pools.rs
//
// Pool configuration entries, derived per-pool metrics and the point-in-time snapshot.

use crate::address::PoolId;
use crate::normalization::Amount;
use chrono::{DateTime, Utc};
use ethers::types::{U256, U512};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound for weights and yields expressed in basis points.
pub const BPS_DENOMINATOR: u32 = 10_000;

/// One allowed pool in the vault's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolEntry {
    pub pool_id: PoolId,
    pub share_token: PoolId,
    pub max_weight_bps: u32,
}

impl PoolEntry {
    pub fn new(pool_id: PoolId, share_token: PoolId, max_weight_bps: u32) -> Self {
        Self {
            pool_id,
            share_token,
            max_weight_bps,
        }
    }

    pub fn weight_in_range(&self) -> bool {
        (1..=BPS_DENOMINATOR).contains(&self.max_weight_bps)
    }
}

/// Which lookup found the market-data record for a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    PoolId,
    ContractAddress,
    AssetSymbol,
    AssetSymbolPattern,
}

/// Live metrics for one pool. `None` always means "unknown", never zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolMetrics {
    pub pool_id: PoolId,
    pub display_name: String,
    pub balance: Option<Amount>,
    pub yield_bps: Option<u32>,
    pub utilization_bps: Option<u32>,
    pub matched_by: Option<MatchStrategy>,
}

impl PoolMetrics {
    /// Metrics for a pool with no market-data match.
    pub fn unmatched(pool_id: PoolId, balance: Option<Amount>) -> Self {
        Self {
            pool_id,
            display_name: format!("Pool {}", pool_id.short()),
            balance,
            yield_bps: None,
            utilization_bps: None,
            matched_by: None,
        }
    }
}

/// Non-fatal findings collected while building a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Advisory {
    /// Market data advertises a different share token for this pool.
    ShareTokenMismatch {
        pool_id: PoolId,
        configured: PoolId,
        advertised: PoolId,
    },
    /// No market-data record matched this pool.
    UnmatchedPool { pool_id: PoolId },
    /// The market-data service could not be reached; every yield is unknown.
    MarketDataUnavailable { reason: String },
    /// This pool's balance could not be read.
    BalanceUnavailable { pool_id: PoolId, reason: String },
    /// The pool holds more than its configured maximum weight.
    WeightExceeded {
        pool_id: PoolId,
        weight_bps: u32,
        max_weight_bps: u32,
    },
}

/// Everything observed about the vault at one moment. Rebuilt from scratch on every refresh.
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub observed_at: DateTime<Utc>,
    pub entries: Vec<PoolEntry>,
    pub metrics: Vec<PoolMetrics>,
    pub blended_yield_bps: Option<u32>,
    pub advisories: Vec<Advisory>,
}

impl PoolSnapshot {
    pub fn entry(&self, pool_id: &PoolId) -> Option<&PoolEntry> {
        self.entries.iter().find(|e| &e.pool_id == pool_id)
    }

    pub fn metrics_for(&self, pool_id: &PoolId) -> Option<&PoolMetrics> {
        self.metrics.iter().find(|m| &m.pool_id == pool_id)
    }

    /// Known balances keyed by pool. Pools whose balance is unknown are absent.
    pub fn balances(&self) -> HashMap<PoolId, U256> {
        self.metrics
            .iter()
            .filter_map(|m| m.balance.map(|b| (m.pool_id, b.wire)))
            .collect()
    }

    /// Each pool's share of the total known balance, in bps (floor).
    ///
    /// Returns an empty map when no balance is known or the total is zero.
    pub fn allocation_bps(&self) -> HashMap<PoolId, u32> {
        let balances = self.balances();
        let total = balances
            .values()
            .fold(U512::zero(), |acc, b| acc + U512::from(*b));
        if total.is_zero() {
            return HashMap::new();
        }
        balances
            .into_iter()
            .map(|(pool, balance)| {
                let share = balance.full_mul(U256::from(BPS_DENOMINATOR)) / total;
                (pool, share.low_u32())
            })
            .collect()
    }

    /// Pools currently above their configured maximum weight.
    pub fn weight_violations(&self) -> Vec<Advisory> {
        let allocation = self.allocation_bps();
        let mut violations: Vec<Advisory> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let weight = *allocation.get(&entry.pool_id)?;
                (weight > entry.max_weight_bps).then(|| Advisory::WeightExceeded {
                    pool_id: entry.pool_id,
                    weight_bps: weight,
                    max_weight_bps: entry.max_weight_bps,
                })
            })
            .collect();
        violations.sort_by_key(|a| match a {
            Advisory::WeightExceeded { pool_id, .. } => *pool_id,
            _ => PoolId::default(),
        });
        violations
    }
}

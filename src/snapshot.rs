// src/snapshot.rs
//
// Builds a `PoolSnapshot` from scratch:
//
// 1. registry fetch (fatal on failure)
// 2. per-pool balances, bounded fan-out, each call under its own timeout
// 3. market data, concurrently with step 2
// 4. join, blended yield, weight checks
//
// A failing balance or market-data call degrades the snapshot to null fields plus an
// advisory. Only the registry can fail the build.

use crate::address::PoolId;
use crate::call_policy::{CallPolicy, Unavailable};
use crate::error::RegistryError;
use crate::market_data::{BaseAsset, JoinOutput, MarketDataAggregator, MarketDataSource};
use crate::normalization::Amount;
use crate::pools::{Advisory, PoolEntry, PoolMetrics, PoolSnapshot};
use crate::registry::{PoolRegistry, VaultReader};
use crate::settings::Settings;
use crate::yield_aggregator::blended_yield;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub struct SnapshotBuilder<R: ?Sized, M: ?Sized> {
    reader: Arc<R>,
    market: Arc<M>,
    aggregator: MarketDataAggregator,
    rpc_policy: CallPolicy,
    market_policy: CallPolicy,
    max_concurrency: usize,
}

impl<R, M> SnapshotBuilder<R, M>
where
    R: VaultReader + ?Sized,
    M: MarketDataSource + ?Sized,
{
    pub fn new(
        reader: Arc<R>,
        market: Arc<M>,
        asset: BaseAsset,
        rpc_policy: CallPolicy,
        market_policy: CallPolicy,
        max_concurrency: usize,
    ) -> Self {
        Self {
            reader,
            market,
            aggregator: MarketDataAggregator::new(asset),
            rpc_policy,
            market_policy,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Wires timeouts and fan-out from `settings`.
    pub fn from_settings(reader: Arc<R>, market: Arc<M>, asset: BaseAsset, settings: &Settings) -> Self {
        Self::new(
            reader,
            market,
            asset,
            CallPolicy::from_millis(settings.rpc.timeout_ms),
            CallPolicy::from_millis(settings.market_data.timeout_ms),
            settings.fetch.max_concurrency,
        )
    }

    pub fn asset(&self) -> &BaseAsset {
        self.aggregator.asset()
    }

    pub async fn build(&self) -> Result<PoolSnapshot, RegistryError> {
        let start = Instant::now();
        let entries = PoolRegistry::new(self.reader.clone(), self.rpc_policy)
            .fetch_allowed_pools()
            .await?;

        let (balances, market) = tokio::join!(
            self.fetch_balances(&entries),
            self.market_policy.optional("market_data", self.market.list_pools())
        );

        let mut advisories = Vec::new();
        let mut known = HashMap::with_capacity(entries.len());
        for entry in &entries {
            match balances.get(&entry.pool_id) {
                Some(Ok(amount)) => {
                    known.insert(entry.pool_id, *amount);
                }
                Some(Err(reason)) => advisories.push(Advisory::BalanceUnavailable {
                    pool_id: entry.pool_id,
                    reason: reason.to_string(),
                }),
                None => {}
            }
        }

        let joined = match market {
            Ok(market_pools) => self.aggregator.join(&entries, &market_pools, &known),
            Err(reason) => {
                warn!("Market data unavailable, all yields unknown: {}", reason);
                advisories.push(Advisory::MarketDataUnavailable {
                    reason: reason.to_string(),
                });
                JoinOutput {
                    metrics: entries
                        .iter()
                        .map(|e| PoolMetrics::unmatched(e.pool_id, known.get(&e.pool_id).copied()))
                        .collect(),
                    advisories: Vec::new(),
                }
            }
        };
        advisories.extend(joined.advisories);

        let mut snapshot = PoolSnapshot {
            observed_at: Utc::now(),
            blended_yield_bps: blended_yield(&joined.metrics),
            entries,
            metrics: joined.metrics,
            advisories,
        };
        let violations = snapshot.weight_violations();
        snapshot.advisories.extend(violations);

        info!(
            "Snapshot built in {:?}: {} pools, {} balances known, blended yield {:?} bps, {} advisories",
            start.elapsed(),
            snapshot.entries.len(),
            known.len(),
            snapshot.blended_yield_bps,
            snapshot.advisories.len()
        );
        Ok(snapshot)
    }

    async fn fetch_balances(&self, entries: &[PoolEntry]) -> HashMap<PoolId, Result<Amount, Unavailable>> {
        let asset = self.aggregator.asset();
        stream::iter(entries.iter().map(|entry| {
            let pool_id = entry.pool_id;
            async move {
                let label = format!("balance_of {}", pool_id.short());
                let result = self
                    .rpc_policy
                    .optional(&label, self.reader.balance_of(&pool_id, &asset.address))
                    .await
                    .and_then(|wire| {
                        wire.to_u256()
                            .map(|value| Amount::new(value, asset.decimals))
                            .map_err(|e| Unavailable::Failed(e.to_string()))
                    });
                (pool_id, result)
            }
        }))
        .buffer_unordered(self.max_concurrency)
        .collect()
        .await
    }
}

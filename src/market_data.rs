// src/market_data.rs
//
// Market-data integration: pool names and per-asset yield/utilization from the off-chain
// service, joined onto the on-chain pool list.
//
// Matching order for each configured pool, first hit wins:
// 1. market pool id == pool id (normalized)
// 2. market contract address == pool id or share token (normalized)
// 3. any market asset whose symbol equals the base asset symbol
// 4. any market asset whose symbol contains the base ticker (wrapped/bridged variants)
// A pool found by 1 or 2 reads its figures from the base asset's record inside it.

use crate::address::{normalize, PoolId};
use crate::metrics;
use crate::normalization::Amount;
use crate::pools::{Advisory, MatchStrategy, PoolEntry, PoolMetrics};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// One pool as advertised by the market-data service.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketPool {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "contract_address")]
    pub address: Option<String>,
    #[serde(default)]
    pub share_token: Option<String>,
    #[serde(default)]
    pub assets: Vec<MarketAsset>,
}

/// Per-asset figures inside a market pool. Rates are fractions: 0.05 means 5%.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketAsset {
    pub symbol: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub share_token: Option<String>,
    #[serde(default, alias = "apy")]
    pub supply_apy: Option<Decimal>,
    #[serde(default)]
    pub utilization: Option<Decimal>,
}

/// The vault's single pooled asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseAsset {
    pub address: PoolId,
    pub symbol: String,
    pub decimals: u8,
}

/// Off-chain market-data collaborator.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn list_pools(&self) -> Result<Vec<MarketPool>>;
}

// The service has answered both with a bare list and with an envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum MarketPoolsResponse {
    List(Vec<MarketPool>),
    Pools { pools: Vec<MarketPool> },
    Data { data: Vec<MarketPool> },
}

impl From<MarketPoolsResponse> for Vec<MarketPool> {
    fn from(response: MarketPoolsResponse) -> Self {
        match response {
            MarketPoolsResponse::List(pools)
            | MarketPoolsResponse::Pools { pools }
            | MarketPoolsResponse::Data { data: pools } => pools,
        }
    }
}

/// HTTP client for the market-data service.
pub struct MarketDataClient {
    url: String,
    client: reqwest::Client,
}

impl MarketDataClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build market-data HTTP client")?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }
}

#[async_trait]
impl MarketDataSource for MarketDataClient {
    async fn list_pools(&self) -> Result<Vec<MarketPool>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .with_context(|| format!("market-data request to {} failed", self.url))?;

        if !response.status().is_success() {
            if response.status() == 429 {
                return Err(anyhow::anyhow!("market data rate limited (429)"));
            }
            return Err(anyhow::anyhow!("market data HTTP error: {}", response.status()));
        }

        let body: MarketPoolsResponse = response
            .json()
            .await
            .context("market-data JSON parse failed")?;
        let pools: Vec<MarketPool> = body.into();
        debug!("Market data returned {} pools", pools.len());
        Ok(pools)
    }
}

/// Converts a fractional rate (0.0523) into basis points, rounding half away from zero.
///
/// Negative or out-of-range rates are unknown, not zero.
pub fn fraction_to_bps(rate: Decimal) -> Option<u32> {
    if rate.is_sign_negative() {
        return None;
    }
    rate.checked_mul(Decimal::from(10_000u32))?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u32()
}

/// Result of joining configured pools with market data.
#[derive(Debug, Clone, Default)]
pub struct JoinOutput {
    pub metrics: Vec<PoolMetrics>,
    pub advisories: Vec<Advisory>,
}

/// Joins configured pools with market-data records for one base asset.
pub struct MarketDataAggregator {
    asset: BaseAsset,
}

/// The market record found for one configured pool.
struct Located<'a> {
    pool: &'a MarketPool,
    asset: Option<&'a MarketAsset>,
    strategy: MatchStrategy,
}

struct MarketIndex<'a> {
    pools: &'a [MarketPool],
    by_id: HashMap<PoolId, &'a MarketPool>,
    by_address: HashMap<PoolId, &'a MarketPool>,
}

impl<'a> MarketIndex<'a> {
    fn build(market_pools: &'a [MarketPool]) -> Self {
        let mut by_id = HashMap::new();
        let mut by_address = HashMap::new();
        for pool in market_pools {
            match normalize(&pool.id) {
                Ok(id) => {
                    by_id.entry(id).or_insert(pool);
                }
                Err(e) => debug!("Market pool id {:?} is not an address: {}", pool.id, e),
            }
            if let Some(address) = pool.address.as_deref().and_then(|a| normalize(a).ok()) {
                by_address.entry(address).or_insert(pool);
            }
        }
        Self {
            pools: market_pools,
            by_id,
            by_address,
        }
    }

    /// Strategies 1 and 2: the market pool itself is identified by id or contract address.
    fn find_pool(&self, entry: &PoolEntry) -> Option<(&'a MarketPool, MatchStrategy)> {
        if let Some(pool) = self.by_id.get(&entry.pool_id) {
            return Some((*pool, MatchStrategy::PoolId));
        }
        self.by_address
            .get(&entry.pool_id)
            .or_else(|| self.by_address.get(&entry.share_token))
            .map(|pool| (*pool, MatchStrategy::ContractAddress))
    }

    /// First asset record, across all market pools, satisfying `matches`.
    fn find_asset_anywhere(&self, matches: impl Fn(&MarketAsset) -> bool) -> Option<(&'a MarketPool, &'a MarketAsset)> {
        self.pools
            .iter()
            .find_map(|pool| pool.assets.iter().find(|a| matches(a)).map(|asset| (pool, asset)))
    }
}

impl MarketDataAggregator {
    pub fn new(asset: BaseAsset) -> Self {
        Self { asset }
    }

    pub fn asset(&self) -> &BaseAsset {
        &self.asset
    }

    fn is_exact_symbol(&self, asset: &MarketAsset) -> bool {
        asset.symbol == self.asset.symbol
    }

    fn is_symbol_variant(&self, asset: &MarketAsset) -> bool {
        let ticker = self.asset.symbol.to_ascii_uppercase();
        !ticker.is_empty() && asset.symbol.to_ascii_uppercase().contains(&ticker)
    }

    fn is_base_address(&self, asset: &MarketAsset) -> bool {
        asset
            .address
            .as_deref()
            .and_then(|addr| normalize(addr).ok())
            .map_or(false, |addr| addr == self.asset.address)
    }

    /// The base asset's record inside an already identified market pool.
    fn base_asset_in<'a>(&self, pool: &'a MarketPool) -> Option<&'a MarketAsset> {
        pool.assets
            .iter()
            .find(|a| self.is_base_address(a))
            .or_else(|| pool.assets.iter().find(|a| self.is_exact_symbol(a)))
            .or_else(|| pool.assets.iter().find(|a| self.is_symbol_variant(a)))
    }

    /// Runs the strategies in order; the first one that finds a record wins.
    fn locate<'a>(&self, index: &MarketIndex<'a>, entry: &PoolEntry) -> Option<Located<'a>> {
        if let Some((pool, strategy)) = index.find_pool(entry) {
            return Some(Located {
                pool,
                asset: self.base_asset_in(pool),
                strategy,
            });
        }
        if let Some((pool, asset)) = index.find_asset_anywhere(|a| self.is_exact_symbol(a)) {
            return Some(Located {
                pool,
                asset: Some(asset),
                strategy: MatchStrategy::AssetSymbol,
            });
        }
        index
            .find_asset_anywhere(|a| self.is_symbol_variant(a))
            .map(|(pool, asset)| Located {
                pool,
                asset: Some(asset),
                strategy: MatchStrategy::AssetSymbolPattern,
            })
    }

    /// Builds metrics for every configured pool, in registry order.
    ///
    /// Pools without a market-data match keep a null yield and a placeholder name; they are
    /// reported as advisories, not errors.
    pub fn join(
        &self,
        entries: &[PoolEntry],
        market_pools: &[MarketPool],
        balances: &HashMap<PoolId, Amount>,
    ) -> JoinOutput {
        let index = MarketIndex::build(market_pools);
        let mut output = JoinOutput::default();

        for entry in entries {
            let balance = balances.get(&entry.pool_id).copied();
            let Some(located) = self.locate(&index, entry) else {
                debug!("No market data for pool {}", entry.pool_id);
                metrics::increment_market_data_miss();
                output.metrics.push(PoolMetrics::unmatched(entry.pool_id, balance));
                output.advisories.push(Advisory::UnmatchedPool { pool_id: entry.pool_id });
                continue;
            };

            let display_name = located
                .pool
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Pool {}", entry.pool_id.short()));

            let (yield_bps, utilization_bps) = match located.asset {
                Some(asset) => (
                    asset.supply_apy.and_then(|r| self.rate_to_bps(r, entry, "supply APY")),
                    asset.utilization.and_then(|r| self.rate_to_bps(r, entry, "utilization")),
                ),
                None => {
                    debug!(
                        "Market pool {} has no {} asset record",
                        located.pool.id, self.asset.symbol
                    );
                    (None, None)
                }
            };

            let advertised = located
                .asset
                .and_then(|asset| asset.share_token.as_deref())
                .or(located.pool.share_token.as_deref());
            if let Some(advisory) = share_token_advisory(entry, advertised) {
                output.advisories.push(advisory);
            }

            output.metrics.push(PoolMetrics {
                pool_id: entry.pool_id,
                display_name,
                balance,
                yield_bps,
                utilization_bps,
                matched_by: Some(located.strategy),
            });
        }

        info!(
            "Joined {} pools with market data ({} advisories)",
            output.metrics.len(),
            output.advisories.len()
        );
        output
    }

    fn rate_to_bps(&self, rate: Decimal, entry: &PoolEntry, what: &str) -> Option<u32> {
        let bps = fraction_to_bps(rate);
        if bps.is_none() {
            warn!("Ignoring out-of-range {} {} for pool {}", what, rate, entry.pool_id);
        }
        bps
    }
}

fn share_token_advisory(entry: &PoolEntry, advertised: Option<&str>) -> Option<Advisory> {
    let raw = advertised?;
    let advertised = match normalize(raw) {
        Ok(id) => id,
        Err(e) => {
            warn!("Market data advertises malformed share token for {}: {}", entry.pool_id, e);
            return None;
        }
    };
    (advertised != entry.share_token).then(|| {
        warn!(
            "Share token mismatch for pool {}: configured {}, advertised {}",
            entry.pool_id, entry.share_token, advertised
        );
        Advisory::ShareTokenMismatch {
            pool_id: entry.pool_id,
            configured: entry.share_token,
            advertised,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::str::FromStr;

    fn usdc() -> BaseAsset {
        BaseAsset {
            address: normalize("0xaaaa").unwrap(),
            symbol: "USDC".to_string(),
            decimals: 6,
        }
    }

    fn entry(pool: &str, share: &str) -> PoolEntry {
        PoolEntry::new(normalize(pool).unwrap(), normalize(share).unwrap(), 5_000)
    }

    fn market(value: serde_json::Value) -> Vec<MarketPool> {
        serde_json::from_value(value).unwrap()
    }

    fn join(entries: &[PoolEntry], pools: &[MarketPool]) -> JoinOutput {
        MarketDataAggregator::new(usdc()).join(entries, pools, &HashMap::new())
    }

    #[test]
    fn test_fraction_to_bps() {
        assert_eq!(fraction_to_bps(Decimal::from_str("0.0523").unwrap()), Some(523));
        assert_eq!(fraction_to_bps(Decimal::from_str("0.00005").unwrap()), Some(1));
        assert_eq!(fraction_to_bps(Decimal::ZERO), Some(0));
        assert_eq!(fraction_to_bps(Decimal::from_str("-0.01").unwrap()), None);
    }

    #[test]
    fn test_match_by_pool_id_ignores_encoding() {
        let pools = market(json!([{
            "id": "0X00000000000000000000000000000000000000000000000000000000000000B1",
            "name": "Nostra USDC",
            "assets": [{"symbol": "USDC", "supply_apy": "0.05", "utilization": 0.8}]
        }]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        let m = &out.metrics[0];
        assert_eq!(m.display_name, "Nostra USDC");
        assert_eq!(m.yield_bps, Some(500));
        assert_eq!(m.utilization_bps, Some(8_000));
        assert_eq!(m.matched_by, Some(MatchStrategy::PoolId));
        assert!(out.advisories.is_empty());
    }

    #[test]
    fn test_match_by_contract_address() {
        let pools = market(json!([{
            "id": "nostra-usdc",
            "name": "Nostra",
            "contract_address": "0xc1",
            "assets": [{"symbol": "ETH", "address": "0xaaaa", "apy": 0.031}]
        }]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        assert_eq!(out.metrics[0].yield_bps, Some(310));
        assert_eq!(out.metrics[0].matched_by, Some(MatchStrategy::ContractAddress));
    }

    #[test]
    fn test_pool_id_match_wins_over_address_match() {
        let pools = market(json!([
            {"id": "vesu", "name": "By Address", "address": "0xb1", "assets": []},
            {"id": "0xb1", "name": "By Id", "assets": []}
        ]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        assert_eq!(out.metrics[0].display_name, "By Id");
        assert_eq!(out.metrics[0].matched_by, Some(MatchStrategy::PoolId));
    }

    #[test]
    fn test_symbol_pattern_fallback() {
        let pools = market(json!([{
            "id": "0xb1",
            "name": "Bridged",
            "assets": [{"symbol": "ETH", "supply_apy": 0.9}, {"symbol": "usdc.e", "supply_apy": 0.04}]
        }]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        assert_eq!(out.metrics[0].yield_bps, Some(400));
        assert_eq!(out.metrics[0].matched_by, Some(MatchStrategy::PoolId));
    }

    #[test]
    fn test_exact_symbol_fallback_across_pools() {
        let pools = market(json!([
            {"id": "zklend-eth", "name": "ETH market", "assets": [{"symbol": "ETH", "supply_apy": "0.02"}]},
            {"id": "vesu-prime", "name": "Prime", "assets": [{"symbol": "USDC", "supply_apy": "0.05"}]}
        ]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        let m = &out.metrics[0];
        assert_eq!(m.matched_by, Some(MatchStrategy::AssetSymbol));
        assert_eq!(m.yield_bps, Some(500));
        assert_eq!(m.display_name, "Prime");
        assert!(out.advisories.is_empty());
    }

    #[test]
    fn test_symbol_pattern_fallback_across_pools() {
        let pools = market(json!([
            {"id": "bridged", "name": "Bridged", "assets": [{"symbol": "USDC.e", "supply_apy": "0.03"}]}
        ]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        assert_eq!(out.metrics[0].matched_by, Some(MatchStrategy::AssetSymbolPattern));
        assert_eq!(out.metrics[0].yield_bps, Some(300));
    }

    #[test]
    fn test_exact_symbol_beats_pattern_in_earlier_pool() {
        let pools = market(json!([
            {"id": "bridged", "name": "Bridged", "assets": [{"symbol": "USDC.e", "supply_apy": "0.03"}]},
            {"id": "native", "name": "Native", "assets": [{"symbol": "USDC", "supply_apy": "0.06"}]}
        ]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        assert_eq!(out.metrics[0].matched_by, Some(MatchStrategy::AssetSymbol));
        assert_eq!(out.metrics[0].display_name, "Native");
    }

    #[test]
    fn test_pool_id_match_stops_the_chain() {
        // The id-matched pool has no base asset record; a symbol match elsewhere is not tried.
        let pools = market(json!([
            {"id": "0xb1", "name": "By Id", "assets": [{"symbol": "ETH", "supply_apy": "0.02"}]},
            {"id": "other", "name": "Other", "assets": [{"symbol": "USDC", "supply_apy": "0.09"}]}
        ]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        assert_eq!(out.metrics[0].matched_by, Some(MatchStrategy::PoolId));
        assert_eq!(out.metrics[0].display_name, "By Id");
        assert_eq!(out.metrics[0].yield_bps, None);
    }

    #[test]
    fn test_huge_rates_degrade_to_unknown() {
        let huge = Decimal::from_str("79228162514264337593543950335").unwrap();
        assert_eq!(fraction_to_bps(huge), None);

        let pools = market(json!([{
            "id": "0xb1",
            "assets": [{"symbol": "USDC", "supply_apy": "79228162514264337593543950335", "utilization": "0.5"}]
        }]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        assert_eq!(out.metrics[0].yield_bps, None);
        assert_eq!(out.metrics[0].utilization_bps, Some(5_000));
    }

    #[test]
    fn test_exact_symbol_preferred_over_pattern() {
        let pools = market(json!([{
            "id": "0xb1",
            "assets": [{"symbol": "USDC.e", "supply_apy": 0.09}, {"symbol": "USDC", "supply_apy": 0.02}]
        }]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        assert_eq!(out.metrics[0].yield_bps, Some(200));
    }

    #[test]
    fn test_unmatched_pool_keeps_null_yield() {
        let pools = market(json!([{"id": "0xdead", "name": "Other", "assets": []}]));
        let mut balances = HashMap::new();
        let pool = normalize("0xb1").unwrap();
        balances.insert(pool, Amount::new(U256::from(9u64), 6));
        let out = MarketDataAggregator::new(usdc()).join(&[entry("0xb1", "0xc1")], &pools, &balances);
        let m = &out.metrics[0];
        assert_eq!(m.yield_bps, None);
        assert_eq!(m.display_name, format!("Pool {}", pool.short()));
        assert_eq!(m.balance, Some(Amount::new(U256::from(9u64), 6)));
        assert_eq!(out.advisories, vec![Advisory::UnmatchedPool { pool_id: pool }]);
    }

    #[test]
    fn test_matched_pool_without_asset_has_null_yield() {
        let pools = market(json!([{"id": "0xb1", "name": "ETH only", "assets": [{"symbol": "ETH", "supply_apy": 0.02}]}]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        assert_eq!(out.metrics[0].display_name, "ETH only");
        assert_eq!(out.metrics[0].yield_bps, None);
        assert_eq!(out.metrics[0].matched_by, Some(MatchStrategy::PoolId));
    }

    #[test]
    fn test_share_token_mismatch_advisory() {
        let pools = market(json!([{
            "id": "0xb1",
            "assets": [{"symbol": "USDC", "share_token": "0xC2", "supply_apy": 0.01}]
        }]));
        let out = join(&[entry("0xb1", "0xc1")], &pools);
        assert_eq!(
            out.advisories,
            vec![Advisory::ShareTokenMismatch {
                pool_id: normalize("0xb1").unwrap(),
                configured: normalize("0xc1").unwrap(),
                advertised: normalize("0xc2").unwrap(),
            }]
        );
        assert_eq!(out.metrics[0].yield_bps, Some(100));
    }

    #[test]
    fn test_matching_share_token_is_silent() {
        let pools = market(json!([{"id": "0xb1", "share_token": "0x00c1", "assets": []}]));
        assert!(join(&[entry("0xb1", "0xc1")], &pools).advisories.is_empty());
    }

    #[test]
    fn test_response_envelopes() {
        let list: MarketPoolsResponse = serde_json::from_value(json!([{"id": "0x1"}])).unwrap();
        let pools: MarketPoolsResponse = serde_json::from_value(json!({"pools": [{"id": "0x1"}]})).unwrap();
        let data: MarketPoolsResponse = serde_json::from_value(json!({"data": [{"id": "0x1"}]})).unwrap();
        for response in [list, pools, data] {
            let v: Vec<MarketPool> = response.into();
            assert_eq!(v.len(), 1);
        }
    }
}

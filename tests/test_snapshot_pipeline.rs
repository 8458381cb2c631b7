//! Integration tests for the snapshot pipeline
//!
//! Drives `SnapshotBuilder` end to end with in-memory collaborators: registry payload shapes,
//! per-pool balance failures and timeouts, market-data joins and the blended yield.

use async_trait::async_trait;
use ethers::types::U256;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use vault_allocation_sdk::{
    address::normalize,
    call_policy::CallPolicy,
    market_data::{BaseAsset, MarketDataSource, MarketPool},
    pools::{Advisory, MatchStrategy},
    registry::VaultReader,
    snapshot::SnapshotBuilder,
    types::WireAmount,
    PoolId,
};

enum BalanceReply {
    Value(WireAmount),
    Fail,
    Hang,
}

struct FakeVault {
    pool_list: Value,
    balances: HashMap<PoolId, BalanceReply>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeVault {
    fn new(pool_list: Value, balances: Vec<(&str, BalanceReply)>) -> Self {
        Self {
            pool_list,
            balances: balances
                .into_iter()
                .map(|(pool, reply)| (normalize(pool).unwrap(), reply))
                .collect(),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VaultReader for FakeVault {
    async fn get_pool_list(&self) -> anyhow::Result<Value> {
        Ok(self.pool_list.clone())
    }

    async fn balance_of(&self, pool: &PoolId, _asset: &PoolId) -> anyhow::Result<WireAmount> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        let reply = match self.balances.get(pool) {
            Some(BalanceReply::Value(v)) => Ok(v.clone()),
            Some(BalanceReply::Hang) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(WireAmount::from(U256::zero()))
            }
            Some(BalanceReply::Fail) | None => Err(anyhow::anyhow!("execution reverted")),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }
}

struct FakeMarket(Option<Value>);

#[async_trait]
impl MarketDataSource for FakeMarket {
    async fn list_pools(&self) -> anyhow::Result<Vec<MarketPool>> {
        match &self.0 {
            Some(pools) => Ok(serde_json::from_value(pools.clone())?),
            None => Err(anyhow::anyhow!("service unavailable")),
        }
    }
}

fn usdc() -> BaseAsset {
    BaseAsset {
        address: normalize("0xa0b8").unwrap(),
        symbol: "USDC".to_string(),
        decimals: 6,
    }
}

fn builder(vault: Arc<FakeVault>, market: FakeMarket, concurrency: usize) -> SnapshotBuilder<FakeVault, FakeMarket> {
    SnapshotBuilder::new(
        vault,
        Arc::new(market),
        usdc(),
        CallPolicy::from_millis(200),
        CallPolicy::from_millis(200),
        concurrency,
    )
}

fn id(raw: &str) -> PoolId {
    normalize(raw).unwrap()
}

#[tokio::test]
async fn test_full_snapshot_with_market_data() {
    let vault = Arc::new(FakeVault::new(
        json!({"result": [
            {"pool_id": "0xa", "share_token": "0x1a", "max_weight": 7000},
            {"pool_id": "0xb", "share_token": "0x1b", "max_weight": 7000}
        ]}),
        vec![
            // 100 USDC as a bare integer, 300 USDC as (low, high) limbs
            ("0xa", BalanceReply::Value(WireAmount::from(100_000_000u128))),
            ("0xb", BalanceReply::Value(WireAmount::limbs(U256::from(300_000_000u64)))),
        ],
    ));
    let market = FakeMarket(Some(json!([
        {
            "id": "0x000000000000000000000000000000000000000000000000000000000000000A",
            "name": "Prime",
            "assets": [{"symbol": "USDC", "supply_apy": "0.05", "utilization": "0.8"}]
        },
        {
            "id": "other",
            "name": "Stable",
            "contract_address": "0x1b",
            "assets": [{"symbol": "USDC.e", "apy": "0.01"}]
        }
    ])));

    let snapshot = builder(vault, market, 4).build().await.unwrap();

    assert_eq!(snapshot.entries.len(), 2);
    let a = snapshot.metrics_for(&id("0xa")).unwrap();
    assert_eq!(a.display_name, "Prime");
    assert_eq!(a.yield_bps, Some(500));
    assert_eq!(a.utilization_bps, Some(8_000));
    assert_eq!(a.matched_by, Some(MatchStrategy::PoolId));
    assert_eq!(a.balance.unwrap().to_decimal().unwrap(), "100");

    let b = snapshot.metrics_for(&id("0xb")).unwrap();
    assert_eq!(b.yield_bps, Some(100));
    assert_eq!(b.matched_by, Some(MatchStrategy::ContractAddress));

    // (100*500 + 300*100) / 400 = 200
    assert_eq!(snapshot.blended_yield_bps, Some(200));
    // B holds 75% against a 70% cap.
    assert_eq!(
        snapshot.advisories,
        vec![Advisory::WeightExceeded {
            pool_id: id("0xb"),
            weight_bps: 7_500,
            max_weight_bps: 7_000
        }]
    );
}

#[tokio::test]
async fn test_one_failing_pool_does_not_cancel_the_others() {
    let vault = Arc::new(FakeVault::new(
        json!([["0xa", "0x1a", 10000], ["0xb", "0x1b", 10000], ["0xc", "0x1c", 10000]]),
        vec![
            ("0xa", BalanceReply::Value(WireAmount::from(1_000u128))),
            ("0xb", BalanceReply::Hang),
            ("0xc", BalanceReply::Fail),
        ],
    ));
    let market = FakeMarket(Some(json!([])));

    let snapshot = builder(vault, market, 3).build().await.unwrap();

    assert_eq!(snapshot.metrics.len(), 3);
    assert!(snapshot.metrics_for(&id("0xa")).unwrap().balance.is_some());
    assert!(snapshot.metrics_for(&id("0xb")).unwrap().balance.is_none());
    assert!(snapshot.metrics_for(&id("0xc")).unwrap().balance.is_none());

    let unavailable: Vec<PoolId> = snapshot
        .advisories
        .iter()
        .filter_map(|a| match a {
            Advisory::BalanceUnavailable { pool_id, .. } => Some(*pool_id),
            _ => None,
        })
        .collect();
    assert_eq!(unavailable, vec![id("0xb"), id("0xc")]);
    // Every pool is unmatched against an empty market list.
    assert_eq!(
        snapshot
            .advisories
            .iter()
            .filter(|a| matches!(a, Advisory::UnmatchedPool { .. }))
            .count(),
        3
    );
    assert_eq!(snapshot.blended_yield_bps, None);
}

#[tokio::test]
async fn test_fan_out_is_bounded() {
    let pools: Vec<Value> = (1..=12)
        .map(|i| json!([format!("{:#x}", i), format!("{:#x}", 0x100 + i), 1000]))
        .collect();
    let names: Vec<String> = (1..=12).map(|i| format!("{:#x}", i)).collect();
    let vault = Arc::new(FakeVault::new(
        Value::Array(pools),
        names
            .iter()
            .map(|p| (p.as_str(), BalanceReply::Value(WireAmount::from(1u128))))
            .collect(),
    ));

    let snapshot = builder(vault.clone(), FakeMarket(Some(json!([]))), 3)
        .build()
        .await
        .unwrap();

    assert_eq!(snapshot.balances().len(), 12);
    assert!(vault.peak_in_flight.load(Ordering::SeqCst) <= 3);
}

#[tokio::test]
async fn test_registry_failure_is_fatal() {
    let vault = Arc::new(FakeVault::new(json!([{"pool_id": "bad"}]), vec![]));
    assert!(builder(vault, FakeMarket(Some(json!([]))), 2).build().await.is_err());
}

#[tokio::test]
async fn test_empty_registry_gives_empty_snapshot() {
    let vault = Arc::new(FakeVault::new(json!([]), vec![]));
    let snapshot = builder(vault, FakeMarket(None), 2).build().await.unwrap();
    assert!(snapshot.entries.is_empty());
    assert_eq!(snapshot.blended_yield_bps, None);
}

#[tokio::test]
async fn test_market_data_outage_nulls_every_yield() {
    let vault = Arc::new(FakeVault::new(
        json!([["0xa", "0x1a", 10000]]),
        vec![("0xa", BalanceReply::Value(WireAmount::from(5u128)))],
    ));
    let snapshot = builder(vault, FakeMarket(None), 2).build().await.unwrap();

    let a = snapshot.metrics_for(&id("0xa")).unwrap();
    assert_eq!(a.yield_bps, None);
    assert_eq!(a.display_name, format!("Pool {}", id("0xa").short()));
    assert!(matches!(
        snapshot.advisories.as_slice(),
        [Advisory::MarketDataUnavailable { .. }]
    ));
}

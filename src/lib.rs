//! # Vault Allocation SDK
//!
//! Monitoring and rebalancing toolkit for a single-asset yield vault that spreads its holdings
//! across an allow-list of lending pools.
//!
//! ## Overview
//!
//! The SDK reads the vault's pool configuration and balances from the chain, joins them with
//! off-chain market data, and produces a point-in-time snapshot. It focuses on:
//!
//! - **Exact amounts**: fixed-point conversion between wire integers and decimal strings
//! - **Identity**: one canonical form for addresses and pool ids
//! - **Snapshot**: per-pool balance, yield and utilization with a blended vault yield
//! - **Rebalancing**: validated withdraw/deposit pairs submitted as one atomic unit
//! - **Configuration**: pure edits to the vault's pool allow-list
//!
//! ## Architecture
//!
//! ### Codec Layer
//! Decodes every wire shape an amount or identifier has been observed in into one
//! in-memory type at the boundary.
//!
//! ### Read Layer
//! Fetches the allow-list, balances and market data through injected collaborators, each
//! call under a central timeout policy. Unknown values stay unknown; they never become zero.
//!
//! ### Write Layer
//! Validates proposals and encodes them as ordered call lists. Submission is atomic and
//! never retried.

// Core Types
/// Error taxonomy
pub mod error;
/// Wire shapes for amounts and words
pub mod types;
/// Canonical pool and token identifiers
pub mod address;
/// Fixed-point amount codec
pub mod normalization;
/// Pool entries, metrics and snapshots
pub mod pools;

// Read Layer
/// Timeout policy for collaborator calls
pub mod call_policy;
/// Allowed pool list
pub mod registry;
/// Off-chain market data and the join onto configured pools
pub mod market_data;
/// Balance-weighted yield
pub mod yield_aggregator;
/// Snapshot assembly
pub mod snapshot;

// Write Layer
/// Atomic multi-call submission
pub mod multicall;
/// Rebalance validation and action building
pub mod rebalance;
/// Allow-list mutations
pub mod pool_config;

// Infrastructure
/// JSON-RPC client for the vault node
pub mod rpc_client;
/// Metrics and observability
pub mod metrics;

// Settings & Configuration
/// Configuration management
pub mod settings;

// Re-exports for convenience
pub use address::PoolId;
pub use error::{Error, Result};
pub use market_data::{BaseAsset, MarketDataClient, MarketDataSource};
pub use multicall::AtomicSubmitter;
pub use pools::{Advisory, PoolEntry, PoolMetrics, PoolSnapshot};
pub use rebalance::{RebalanceOutcome, RebalancePlan, RebalanceRequest, RebalanceValidator, RejectReason};
pub use registry::VaultReader;
pub use rpc_client::JsonRpcClient;
pub use settings::Settings;
pub use snapshot::SnapshotBuilder;

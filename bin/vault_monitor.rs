//! # Vault Monitor
//!
//! Command line front end for the Vault Allocation SDK.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin vault_monitor -- snapshot
//! cargo run --bin vault_monitor -- plan-rebalance --from 0xa --to 0xb --amount 12.5
//! cargo run --bin vault_monitor -- add-pool --pool 0xc --share-token 0x1c --max-weight 2500 --submit
//! ```
//!
//! Write commands print the encoded call list and only send it with `--submit`.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use ethers::types::U256;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use vault_allocation_sdk::{
    address::normalize,
    call_policy::CallPolicy,
    market_data::{BaseAsset, MarketDataClient},
    metrics,
    multicall::Call,
    pool_config,
    pools::PoolEntry,
    rebalance::{submit_plan, RebalanceOutcome, RebalanceRequest, RebalanceValidator},
    registry::PoolRegistry,
    rpc_client::JsonRpcClient,
    settings::Settings,
    snapshot::SnapshotBuilder,
    PoolId, PoolSnapshot,
};

#[derive(Parser)]
#[command(name = "vault_monitor")]
#[command(about = "Monitor and rebalance a multi-pool yield vault", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(short, long, default_value = "Config.toml")]
    config: PathBuf,

    /// Send write operations instead of printing them
    #[arg(long, global = true)]
    submit: bool,

    /// Prometheus exporter listen address
    #[cfg(feature = "observability")]
    #[arg(long)]
    metrics_addr: Option<std::net::SocketAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the current pool snapshot as JSON
    Snapshot,
    /// Validate a transfer between two pools and build the call list
    PlanRebalance {
        #[arg(long)]
        from: String,
        #[arg(long)]
        to: String,
        /// Decimal amount in asset units
        #[arg(long)]
        amount: String,
    },
    /// Add a pool to the allow-list
    AddPool {
        #[arg(long)]
        pool: String,
        #[arg(long)]
        share_token: String,
        /// Maximum weight in basis points
        #[arg(long)]
        max_weight: u32,
    },
    /// Remove the pool identified by its share token
    RemovePool {
        #[arg(long)]
        share_token: String,
    },
    /// Replace the share token of a configured pool
    SetShareToken {
        #[arg(long)]
        pool: String,
        #[arg(long)]
        share_token: String,
    },
}

struct App {
    settings: Settings,
    rpc: Arc<JsonRpcClient>,
    vault: PoolId,
    asset: BaseAsset,
}

impl App {
    fn load(path: &Path) -> Result<Self> {
        let settings = Settings::from_file(path).with_context(|| format!("loading {}", path.display()))?;
        let rpc = Arc::new(JsonRpcClient::from_settings(&settings)?);
        let vault = normalize(&settings.vault.address)?;
        let asset = BaseAsset {
            address: normalize(&settings.vault.asset_address)?,
            symbol: settings.vault.asset_symbol.clone(),
            decimals: settings.vault.asset_decimals,
        };
        Ok(Self {
            settings,
            rpc,
            vault,
            asset,
        })
    }

    async fn snapshot(&self) -> Result<PoolSnapshot> {
        let market = Arc::new(MarketDataClient::new(
            self.settings.market_data.url.clone(),
            Duration::from_millis(self.settings.market_data.timeout_ms),
        )?);
        let builder = SnapshotBuilder::from_settings(self.rpc.clone(), market, self.asset.clone(), &self.settings);
        Ok(builder.build().await?)
    }

    async fn allowed_pools(&self) -> Result<Vec<PoolEntry>> {
        let registry = PoolRegistry::new(self.rpc.clone(), CallPolicy::from_millis(self.settings.rpc.timeout_ms));
        Ok(registry.fetch_allowed_pools().await?)
    }

    async fn replace_pool_list(&self, entries: &[PoolEntry], submit: bool) -> Result<()> {
        let entrypoint = &self.settings.vault.entrypoints.set_allowed_pools;
        if submit {
            let handle = pool_config::submit_pool_list(self.rpc.as_ref(), self.vault, entrypoint, entries).await?;
            println!("Submitted: {}", handle.0);
            Ok(())
        } else {
            print_calls(&[pool_config::to_call(self.vault, entrypoint, entries)])
        }
    }
}

fn print_calls(calls: &[Call]) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(calls)?);
    println!("Dry run: pass --submit to send these calls atomically");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    #[cfg(feature = "observability")]
    if let Some(addr) = cli.metrics_addr {
        metrics::install_exporter(addr)?;
    }
    metrics::describe_metrics();

    let ctx = App::load(&cli.config)?;

    match cli.command {
        Commands::Snapshot => {
            let snapshot = ctx.snapshot().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        Commands::PlanRebalance { from, to, amount } => {
            let snapshot = ctx.snapshot().await?;
            let validator = RebalanceValidator::new(&ctx.asset, ctx.settings.vault.min_transfer_units);
            let request = RebalanceRequest {
                from_pool: normalize(&from)?,
                to_pool: normalize(&to)?,
                amount,
            };
            let plan = match validator.validate_against(&snapshot, &request) {
                RebalanceOutcome::Accepted(plan) => plan,
                RebalanceOutcome::Rejected(reason) => bail!("rebalance rejected: {:?}", reason),
            };
            let entrypoints = &ctx.settings.vault.entrypoints;
            if cli.submit {
                let handle = submit_plan(ctx.rpc.as_ref(), &plan, ctx.vault, entrypoints).await?;
                println!("Submitted: {}", handle.0);
            } else {
                print_calls(&plan.to_calls(ctx.vault, entrypoints))?;
            }
        }
        Commands::AddPool {
            pool,
            share_token,
            max_weight,
        } => {
            let current = ctx.allowed_pools().await?;
            let entry = PoolEntry::new(normalize(&pool)?, normalize(&share_token)?, max_weight);
            let updated = pool_config::add(&current, entry)?;
            ctx.replace_pool_list(&updated, cli.submit).await?;
        }
        Commands::RemovePool { share_token } => {
            let share_token = normalize(&share_token)?;
            let snapshot = ctx.snapshot().await?;
            let pool_id = snapshot
                .entries
                .iter()
                .find(|e| e.share_token == share_token)
                .map(|e| e.pool_id)
                .ok_or_else(|| anyhow!("no configured pool uses share token {}", share_token))?;
            let balance: U256 = snapshot
                .balances()
                .get(&pool_id)
                .copied()
                .ok_or_else(|| anyhow!("balance of pool {} is unknown, refusing to remove it", pool_id))?;
            let updated = pool_config::remove(&snapshot.entries, &share_token, balance)?;
            ctx.replace_pool_list(&updated, cli.submit).await?;
        }
        Commands::SetShareToken { pool, share_token } => {
            let current = ctx.allowed_pools().await?;
            let updated = pool_config::update_share_token(&current, &normalize(&pool)?, normalize(&share_token)?)?;
            ctx.replace_pool_list(&updated, cli.submit).await?;
        }
    }

    Ok(())
}

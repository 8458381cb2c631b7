// Rebalance Validator Module
//
// `RebalanceValidator` checks a proposed transfer between two allowed pools and, when it
// passes, builds the ordered withdraw/deposit pair. Both legs carry the one wire amount
// parsed from the request; the deposit leg is never recomputed.
//
// ## Checks, in order
//
// - **Same pool**: source and destination normalize to the same id
// - **Amount**: a non-negative decimal, non-zero, at least the minimum transferable unit,
//   and no more fractional digits than the asset precision
// - **Membership**: both pools are part of the snapshot
// - **Balance**: the amount does not exceed the source pool's balance

use crate::address::PoolId;
use crate::error::{CodecError, SubmitError};
use crate::market_data::BaseAsset;
use crate::metrics;
use crate::multicall::{submit_once, AtomicSubmitter, Call, TxHandle};
use crate::normalization::{decimal_to_wire, decimal_to_wire_floor, format_units};
use crate::pools::PoolSnapshot;
use crate::settings::Entrypoints;
use crate::types::conversions::split_limbs;
use ethers::types::U256;
use log::{debug, info};
use serde::Serialize;
use std::collections::HashMap;

/// Direction of one rebalance leg, seen from the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Withdraw,
    Deposit,
}

/// One leg of a rebalance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalanceAction {
    pub pool_id: PoolId,
    pub direction: Direction,
    pub asset: PoolId,
    pub amount: U256,
}

impl RebalanceAction {
    fn to_call(&self, vault: PoolId, entrypoints: &Entrypoints) -> Call {
        let operation = match self.direction {
            Direction::Withdraw => &entrypoints.withdraw,
            Direction::Deposit => &entrypoints.deposit,
        };
        let (low, high) = split_limbs(self.amount);
        Call::new(
            vault,
            operation.clone(),
            vec![
                self.pool_id.canonical(),
                self.asset.canonical(),
                format!("{:#x}", low),
                format!("{:#x}", high),
            ],
        )
    }
}

/// Ordered `[Withdraw(from), Deposit(to)]` pair sharing one amount.
///
/// Only [`RebalanceValidator`] constructs plans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebalancePlan {
    withdraw: RebalanceAction,
    deposit: RebalanceAction,
}

impl RebalancePlan {
    fn new(from: PoolId, to: PoolId, asset: PoolId, amount: U256) -> Self {
        Self {
            withdraw: RebalanceAction {
                pool_id: from,
                direction: Direction::Withdraw,
                asset,
                amount,
            },
            deposit: RebalanceAction {
                pool_id: to,
                direction: Direction::Deposit,
                asset,
                amount,
            },
        }
    }

    pub fn withdraw(&self) -> &RebalanceAction {
        &self.withdraw
    }

    pub fn deposit(&self) -> &RebalanceAction {
        &self.deposit
    }

    pub fn amount(&self) -> U256 {
        self.withdraw.amount
    }

    /// The two legs in submission order.
    pub fn actions(&self) -> [&RebalanceAction; 2] {
        [&self.withdraw, &self.deposit]
    }

    /// Encodes both legs as calls on the vault contract, withdraw first.
    pub fn to_calls(&self, vault: PoolId, entrypoints: &Entrypoints) -> Vec<Call> {
        self.actions()
            .iter()
            .map(|action| action.to_call(vault, entrypoints))
            .collect()
    }
}

/// Submits both legs of `plan` as one atomic unit, exactly once.
pub async fn submit_plan<S: AtomicSubmitter + ?Sized>(
    submitter: &S,
    plan: &RebalancePlan,
    vault: PoolId,
    entrypoints: &Entrypoints,
) -> Result<TxHandle, SubmitError> {
    submit_once(submitter, &plan.to_calls(vault, entrypoints)).await
}

/// A proposed transfer, as entered by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalanceRequest {
    pub from_pool: PoolId,
    pub to_pool: PoolId,
    /// Decimal amount in asset units, e.g. `"12.5"`
    pub amount: String,
}

/// Reason a rebalance proposal was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Source and destination are the same pool
    SamePool,
    /// Amount is not a decimal, is zero, or is below the minimum transferable unit
    InvalidAmount(String),
    /// Amount has more fractional digits than the asset precision
    PrecisionOverflow { precision: u8 },
    /// Pool is not part of the current snapshot
    UnknownPool(PoolId),
    /// Source pool balance could not be read
    BalanceUnknown(PoolId),
    /// Amount exceeds the source pool's balance
    InsufficientBalance { requested: U256, available: U256 },
}

impl RejectReason {
    /// Returns a string representation of the reject reason.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::SamePool => "same_pool",
            RejectReason::InvalidAmount(_) => "invalid_amount",
            RejectReason::PrecisionOverflow { .. } => "precision_overflow",
            RejectReason::UnknownPool(_) => "unknown_pool",
            RejectReason::BalanceUnknown(_) => "balance_unknown",
            RejectReason::InsufficientBalance { .. } => "insufficient_balance",
        }
    }
}

/// Terminal state of one validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebalanceOutcome {
    Accepted(RebalancePlan),
    Rejected(RejectReason),
}

impl RebalanceOutcome {
    pub fn plan(&self) -> Option<&RebalancePlan> {
        match self {
            RebalanceOutcome::Accepted(plan) => Some(plan),
            RebalanceOutcome::Rejected(_) => None,
        }
    }
}

/// Validates transfers of the vault's base asset between pools.
pub struct RebalanceValidator {
    asset: PoolId,
    precision: u8,
    min_transfer: U256,
}

impl RebalanceValidator {
    pub fn new(asset: &BaseAsset, min_transfer_units: u64) -> Self {
        Self {
            asset: asset.address,
            precision: asset.decimals,
            min_transfer: U256::from(min_transfer_units.max(1)),
        }
    }

    /// Validates `request` against the balances and pool list of `snapshot`.
    ///
    /// A pool listed in the snapshot whose balance could not be read rejects with
    /// `BalanceUnknown` when it is the source.
    pub fn validate_against(&self, snapshot: &PoolSnapshot, request: &RebalanceRequest) -> RebalanceOutcome {
        let balances = snapshot.balances();
        self.check(
            request,
            |pool| snapshot.entry(pool).is_some(),
            |pool| balances.get(pool).copied(),
        )
    }

    /// Validates `request` against raw per-pool balances.
    ///
    /// Only the source needs an entry in `balances`; a source absent from it is unknown. The
    /// destination is taken as given. Use [`validate_against`](Self::validate_against) to also
    /// check the destination against the configured pool list.
    pub fn validate(&self, request: &RebalanceRequest, balances: &HashMap<PoolId, U256>) -> RebalanceOutcome {
        self.check(
            request,
            |pool| *pool == request.to_pool || balances.contains_key(pool),
            |pool| balances.get(pool).copied(),
        )
    }

    fn check(
        &self,
        request: &RebalanceRequest,
        is_known: impl Fn(&PoolId) -> bool,
        balance_of: impl Fn(&PoolId) -> Option<U256>,
    ) -> RebalanceOutcome {
        if request.from_pool == request.to_pool {
            return self.reject(RejectReason::SamePool);
        }

        let amount = match self.parse_amount(&request.amount) {
            Ok(amount) => amount,
            Err(reason) => return self.reject(reason),
        };

        for pool in [request.from_pool, request.to_pool] {
            if !is_known(&pool) {
                return self.reject(RejectReason::UnknownPool(pool));
            }
        }

        let Some(available) = balance_of(&request.from_pool) else {
            return self.reject(RejectReason::BalanceUnknown(request.from_pool));
        };
        if amount > available {
            return self.reject(RejectReason::InsufficientBalance {
                requested: amount,
                available,
            });
        }

        info!(
            "Rebalance accepted: {} -> {} amount {} ({} base units)",
            request.from_pool,
            request.to_pool,
            format_units(amount, self.precision).unwrap_or_else(|_| amount.to_string()),
            amount
        );
        RebalanceOutcome::Accepted(RebalancePlan::new(request.from_pool, request.to_pool, self.asset, amount))
    }

    fn parse_amount(&self, raw: &str) -> Result<U256, RejectReason> {
        let amount = match decimal_to_wire(raw, self.precision) {
            Ok(amount) => amount,
            Err(CodecError::PrecisionOverflow { precision, .. }) => {
                // Sub-unit dust is an invalid amount, anything larger merely has too many digits.
                return match decimal_to_wire_floor(raw, self.precision) {
                    Ok(floor) if floor < self.min_transfer => Err(RejectReason::InvalidAmount(format!(
                        "{} is below the minimum transferable unit",
                        raw.trim()
                    ))),
                    _ => Err(RejectReason::PrecisionOverflow { precision }),
                };
            }
            Err(e) => return Err(RejectReason::InvalidAmount(e.to_string())),
        };
        if amount.is_zero() {
            return Err(RejectReason::InvalidAmount("amount must be greater than zero".to_string()));
        }
        if amount < self.min_transfer {
            return Err(RejectReason::InvalidAmount(format!(
                "{} is below the minimum transferable unit of {} base units",
                raw.trim(),
                self.min_transfer
            )));
        }
        Ok(amount)
    }

    fn reject(&self, reason: RejectReason) -> RebalanceOutcome {
        debug!("Rebalance rejected: {:?}", reason);
        metrics::increment_rebalance_rejection(reason.as_str());
        RebalanceOutcome::Rejected(reason)
    }
}

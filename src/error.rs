// src/error.rs
//
// Error taxonomy shared by the codec, normalizer, registry, pool-config mutator
// and submission layer. Rebalance rejections are values, see `rebalance::RejectReason`.

use crate::address::PoolId;
use ethers::types::U256;

/// Failures converting between wire amounts and decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("precision loss: {0}")]
    PrecisionLoss(String),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("amount {value} has more than {precision} fractional digits")]
    PrecisionOverflow { value: String, precision: u8 },
}

/// Failures normalizing an on-chain identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    #[error("malformed address {raw:?}: {reason}")]
    MalformedAddress { raw: String, reason: &'static str },
}

/// Fatal failure fetching the vault's pool list.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("pool registry unavailable: {0}")]
    RegistryUnavailable(String),
}

/// Rejections produced by the pool allow-list mutator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolConfigError {
    #[error("pool {0} is already configured")]
    DuplicatePool(PoolId),
    #[error("max weight {0} bps is outside [1, 10000]")]
    InvalidWeight(u32),
    #[error("pool {pool} still holds {balance} base units")]
    NonEmptyBalance { pool: PoolId, balance: U256 },
    #[error("cannot remove the last configured pool")]
    LastPoolRemaining,
    #[error("pool {0} is not configured")]
    UnknownPool(PoolId),
}

/// Failure of an atomic multi-call submission. The whole unit failed.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("submission rejected: {0}")]
    Rejected(String),
    #[error("submission transport failed: {0}")]
    Transport(#[from] anyhow::Error),
}

/// Crate-level error for callers that drive several components at once.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    PoolConfig(#[from] PoolConfigError),
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

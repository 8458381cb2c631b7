// src/multicall.rs
//
// Atomic multi-call primitive for the write path. A submitter receives the complete ordered
// call list and either lands every call or none of them.

use crate::address::PoolId;
use crate::error::SubmitError;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

/// A single contract call inside an atomic batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Call {
    /// Target contract address
    pub target: PoolId,
    /// Entrypoint name
    pub operation: String,
    /// Encoded arguments, one word per element
    pub arguments: Vec<String>,
}

impl Call {
    pub fn new(target: PoolId, operation: impl Into<String>, arguments: Vec<String>) -> Self {
        Self {
            target,
            operation: operation.into(),
            arguments,
        }
    }
}

/// Handle of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxHandle(pub String);

/// Executes an ordered call list as one atomic unit.
///
/// Implementations that can only submit calls one by one are not valid submitters.
#[async_trait]
pub trait AtomicSubmitter: Send + Sync {
    async fn submit_atomic(&self, calls: &[Call]) -> Result<TxHandle, SubmitError>;
}

/// Sends `calls` exactly once. Never retried on failure.
pub async fn submit_once<S: AtomicSubmitter + ?Sized>(
    submitter: &S,
    calls: &[Call],
) -> Result<TxHandle, SubmitError> {
    if calls.is_empty() {
        return Err(SubmitError::Rejected("empty call list".to_string()));
    }
    let handle = submitter.submit_atomic(calls).await?;
    info!("Submitted {} calls atomically: {}", calls.len(), handle.0);
    Ok(handle)
}

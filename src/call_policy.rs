// src/call_policy.rs
//
// The single place where collaborator calls get their timeout. Business logic never calls
// `tokio::time::timeout` directly. No retries: callers may re-run a whole read pipeline,
// the write path must never be re-sent.

use crate::metrics;
use log::warn;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::timeout;

/// Why a degradable call produced no value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    TimedOut(Duration),
    Failed(String),
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unavailable::TimedOut(after) => write!(f, "timed out after {:?}", after),
            Unavailable::Failed(reason) => write!(f, "{}", reason),
        }
    }
}

/// Per-call timeout applied uniformly at the collaborator boundary.
#[derive(Debug, Clone, Copy)]
pub struct CallPolicy {
    timeout: Duration,
}

impl CallPolicy {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs a call whose failure is fatal to the caller.
    pub async fn required<T, F>(&self, label: &str, call: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        match timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                metrics::increment_call_timeout(label);
                Err(anyhow::anyhow!("{} timed out after {:?}", label, self.timeout))
            }
        }
    }

    /// Runs a call whose failure only degrades the result. Logs and returns the reason.
    pub async fn optional<T, F>(&self, label: &str, call: F) -> Result<T, Unavailable>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let start = Instant::now();
        match timeout(self.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!("{} failed after {:?}: {}", label, start.elapsed(), e);
                Err(Unavailable::Failed(e.to_string()))
            }
            Err(_) => {
                warn!("{} timed out after {:?}", label, self.timeout);
                metrics::increment_call_timeout(label);
                Err(Unavailable::TimedOut(self.timeout))
            }
        }
    }
}

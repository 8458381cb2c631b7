// src/yield_aggregator.rs
//
// Balance-weighted blended yield across pools.

use crate::pools::PoolMetrics;
use ethers::types::{U256, U512};

/// Blended yield in bps: `Σ(balance·yield) / Σ(balance)`.
///
/// Only pools with both a known yield and a known balance take part; an unknown yield is
/// excluded from numerator and denominator alike. Returns `None` when no pool is eligible
/// or the eligible balance is zero. Sums are kept in 512 bits and rounded half-up once.
pub fn blended_yield(metrics: &[PoolMetrics]) -> Option<u32> {
    let mut numerator = U512::zero();
    let mut denominator = U512::zero();

    for m in metrics {
        let (Some(yield_bps), Some(balance)) = (m.yield_bps, m.balance) else {
            continue;
        };
        numerator += balance.wire.full_mul(U256::from(yield_bps));
        denominator += U512::from(balance.wire);
    }

    if denominator.is_zero() {
        return None;
    }
    let rounded = (numerator + denominator / 2) / denominator;
    // A weighted mean never exceeds its largest input, which is a u32.
    Some(rounded.low_u32())
}

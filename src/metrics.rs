// src/metrics.rs
//
// Counters for the read pipeline and the validators. Compiled to no-ops unless the
// `observability` feature is enabled.

#[cfg(feature = "observability")]
use metrics::{describe_counter, increment_counter};

/// Registers metric descriptions. Call once at startup.
pub fn describe_metrics() {
    #[cfg(feature = "observability")]
    {
        describe_counter!("vault_registry_fetches_total", "Pool registry fetches by result");
        describe_counter!(
            "vault_registry_skipped_entries_total",
            "Malformed or duplicate pool registry entries that were skipped"
        );
        describe_counter!("vault_call_timeouts_total", "Collaborator calls that hit their timeout");
        describe_counter!(
            "vault_market_data_misses_total",
            "Configured pools without a matching market-data record"
        );
        describe_counter!("vault_rebalance_rejections_total", "Rejected rebalance proposals by reason");
    }
}

/// Installs the Prometheus recorder and HTTP listener on `addr`.
#[cfg(feature = "observability")]
pub fn install_exporter(addr: std::net::SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    Ok(())
}

pub fn increment_registry_fetch(result: &'static str) {
    #[cfg(feature = "observability")]
    increment_counter!("vault_registry_fetches_total", "result" => result);
    #[cfg(not(feature = "observability"))]
    let _ = result;
}

pub fn increment_registry_skipped(reason: &'static str) {
    #[cfg(feature = "observability")]
    increment_counter!("vault_registry_skipped_entries_total", "reason" => reason);
    #[cfg(not(feature = "observability"))]
    let _ = reason;
}

pub fn increment_call_timeout(call: &str) {
    #[cfg(feature = "observability")]
    increment_counter!("vault_call_timeouts_total", "call" => call.to_string());
    #[cfg(not(feature = "observability"))]
    let _ = call;
}

pub fn increment_market_data_miss() {
    #[cfg(feature = "observability")]
    increment_counter!("vault_market_data_misses_total");
}

pub fn increment_rebalance_rejection(reason: &'static str) {
    #[cfg(feature = "observability")]
    increment_counter!("vault_rebalance_rejections_total", "reason" => reason);
    #[cfg(not(feature = "observability"))]
    let _ = reason;
}

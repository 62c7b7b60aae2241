//! Metrics collection.
//!
//! # Responsibilities
//! - Define settlement metrics (RPC outcomes, failovers, payouts, scans)
//! - Provide thin recording helpers for hot paths
//!
//! # Metrics
//! - `settlement_rpc_calls_total` (counter): RPC calls by provider, outcome
//! - `settlement_provider_failovers_total` (counter): active-provider switches
//! - `settlement_provider_healthy` (gauge): 1=healthy, 0=unhealthy
//! - `settlement_payouts_total` (counter): payout attempts by outcome
//! - `settlement_rebroadcasts_total` (counter): stuck-transaction rebroadcasts
//! - `settlement_payment_events_total` (counter): credited events by token
//! - `settlement_scan_chunks_total` (counter): scanned chunks by outcome
//!
//! # Design Decisions
//! - Low-overhead updates through the metrics facade
//! - No exporter installed here; the embedding process decides

use std::time::Duration;

/// Record the outcome of a single RPC call.
pub fn record_rpc_call(provider: &str, success: bool, latency: Duration) {
    let outcome = if success { "ok" } else { "error" };
    metrics::counter!(
        "settlement_rpc_calls_total",
        "provider" => provider.to_string(),
        "outcome" => outcome,
    )
    .increment(1);
    metrics::histogram!(
        "settlement_rpc_call_duration_seconds",
        "provider" => provider.to_string(),
    )
    .record(latency.as_secs_f64());
}

/// Record an active-provider switch.
pub fn record_provider_failover(from: &str, to: &str) {
    metrics::counter!(
        "settlement_provider_failovers_total",
        "from" => from.to_string(),
        "to" => to.to_string(),
    )
    .increment(1);
}

/// Record a provider health transition.
pub fn record_provider_health(provider: &str, healthy: bool) {
    metrics::gauge!(
        "settlement_provider_healthy",
        "provider" => provider.to_string(),
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

/// Record a payout attempt outcome.
pub fn record_payout(outcome: &'static str) {
    metrics::counter!("settlement_payouts_total", "outcome" => outcome).increment(1);
}

/// Record a stuck-transaction rebroadcast.
pub fn record_rebroadcast() {
    metrics::counter!("settlement_rebroadcasts_total").increment(1);
}

/// Record a newly credited payment event.
pub fn record_payment_event(token: &str) {
    metrics::counter!(
        "settlement_payment_events_total",
        "token" => token.to_string(),
    )
    .increment(1);
}

/// Record a scanned chunk outcome.
pub fn record_scan_chunk(success: bool) {
    let outcome = if success { "ok" } else { "error" };
    metrics::counter!("settlement_scan_chunks_total", "outcome" => outcome).increment(1);
}

//! Per-provider health state machine.
//!
//! # States
//! - Healthy: provider is eligible for selection
//! - Unhealthy: provider is skipped until its cool-down elapses
//!
//! # State Transitions
//! ```text
//! Healthy → Unhealthy: consecutive failures >= failure_threshold
//! Unhealthy → eligible again: cool-down elapsed (half-open retry)
//! eligible → Healthy: next call succeeds, counters reset
//! ```
//!
//! # Design Decisions
//! - Counters are atomics; health is observed from concurrent callers
//! - A success resets the failure counter completely (no decay math)
//! - The rolling health score is informational, for status reporting

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use alloy::providers::Provider;

use crate::observability::metrics;
use crate::store::now_ms;

/// One configured RPC endpoint with its health state.
///
/// Created from configuration at startup; never removed, only marked
/// unhealthy/healthy.
pub struct ProviderEndpoint {
    pub name: String,
    /// Priority rank; lower is preferred.
    pub priority: u32,
    provider: Arc<dyn Provider + Send + Sync>,
    healthy: AtomicBool,
    consecutive_failures: AtomicU32,
    /// Rolling score in [0, 100].
    health_score: AtomicU32,
    last_success_ms: AtomicU64,
    last_failure_ms: AtomicU64,
}

impl ProviderEndpoint {
    pub fn new(name: String, priority: u32, provider: Arc<dyn Provider + Send + Sync>) -> Self {
        Self {
            name,
            priority,
            provider,
            healthy: AtomicBool::new(true),
            consecutive_failures: AtomicU32::new(0),
            health_score: AtomicU32::new(100),
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
        }
    }

    pub fn provider(&self) -> Arc<dyn Provider + Send + Sync> {
        Arc::clone(&self.provider)
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn health_score(&self) -> u32 {
        self.health_score.load(Ordering::SeqCst)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::SeqCst)
    }

    pub fn last_success_ms(&self) -> u64 {
        self.last_success_ms.load(Ordering::SeqCst)
    }

    /// Eligible for selection: healthy, or unhealthy with the cool-down
    /// elapsed (half-open retry).
    pub fn is_available(&self, now: u64, cooldown_ms: u64) -> bool {
        if self.healthy.load(Ordering::SeqCst) {
            return true;
        }
        let last_failure = self.last_failure_ms.load(Ordering::SeqCst);
        now.saturating_sub(last_failure) >= cooldown_ms
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        self.last_success_ms.store(now_ms(), Ordering::SeqCst);
        let _ = self
            .health_score
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |score| {
                Some((score + 20).min(100))
            });

        if !self.healthy.swap(true, Ordering::SeqCst) {
            tracing::info!(provider = %self.name, "Provider recovered");
            metrics::record_provider_health(&self.name, true);
        }
    }

    /// Record a failed call. Returns true when this failure crossed the
    /// threshold and flipped the provider to unhealthy.
    pub fn record_failure(&self, failure_threshold: u32) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        self.last_failure_ms.store(now_ms(), Ordering::SeqCst);
        let _ = self
            .health_score
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |score| {
                Some(score.saturating_sub(25))
            });

        if failures >= failure_threshold && self.healthy.swap(false, Ordering::SeqCst) {
            tracing::warn!(
                provider = %self.name,
                consecutive_failures = failures,
                "Provider marked unhealthy"
            );
            metrics::record_provider_health(&self.name, false);
            return true;
        }
        false
    }
}

impl std::fmt::Debug for ProviderEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEndpoint")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("healthy", &self.is_healthy())
            .field("consecutive_failures", &self.consecutive_failures())
            .finish()
    }
}

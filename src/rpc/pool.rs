//! Provider pool with synchronous failover.
//!
//! # Responsibilities
//! - Hold the configured endpoints for one chain, by priority
//! - Return the current active endpoint without network I/O
//! - Switch the active pointer on the failure-reporting path so the
//!   very next call already uses the new provider
//!
//! # Design Decisions
//! - Pool state is process-local; each worker learns provider health
//!   independently (only nonces and cursors need cross-process state)
//! - Switching is an atomic pointer store; a call either fully uses
//!   provider A or fully uses provider B, never a mix mid-call
//! - A recovered higher-priority endpoint reclaims the active slot
//!   after its cool-down, on the next selection

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy::providers::{Provider, ProviderBuilder};

use crate::config::{FailoverConfig, ProviderConfig};
use crate::error::{SettlementError, SettlementResult};
use crate::observability::metrics;
use crate::rpc::health::ProviderEndpoint;
use crate::store::now_ms;

/// The endpoint chosen for one call.
pub struct SelectedProvider {
    pub index: usize,
    pub name: String,
    pub provider: Arc<dyn Provider + Send + Sync>,
}

/// Ordered set of providers for one chain plus the active pointer.
pub struct ProviderPool {
    /// Endpoints sorted by (priority, config order).
    endpoints: Vec<Arc<ProviderEndpoint>>,
    active: AtomicUsize,
    failure_threshold: u32,
    cooldown_ms: u64,
}

impl ProviderPool {
    /// Build a pool from configuration. Endpoint construction performs
    /// no network I/O.
    pub fn from_config(
        providers: &[ProviderConfig],
        failover: &FailoverConfig,
    ) -> SettlementResult<Self> {
        let mut configs: Vec<&ProviderConfig> = providers.iter().collect();
        configs.sort_by_key(|p| p.priority);

        let mut endpoints = Vec::with_capacity(configs.len());
        for config in configs {
            let url: url::Url = config.url.parse().map_err(|e| {
                SettlementError::Config(format!("invalid RPC URL '{}': {}", config.url, e))
            })?;
            let provider = Arc::new(ProviderBuilder::new().connect_http(url))
                as Arc<dyn Provider + Send + Sync>;
            endpoints.push(Arc::new(ProviderEndpoint::new(
                config.name.clone(),
                config.priority,
                provider,
            )));
        }

        if endpoints.is_empty() {
            return Err(SettlementError::Config(
                "at least one RPC provider is required".into(),
            ));
        }

        tracing::info!(
            providers = endpoints.len(),
            failure_threshold = failover.failure_threshold,
            cooldown_secs = failover.cooldown_secs,
            "Provider pool initialized"
        );

        Ok(Self {
            endpoints,
            active: AtomicUsize::new(0),
            failure_threshold: failover.failure_threshold,
            cooldown_ms: failover.cooldown_secs * 1_000,
        })
    }

    /// Return the current active provider without performing I/O.
    ///
    /// Prefers the best available endpoint by priority, which lets a
    /// recovered endpoint reclaim the active slot after its cool-down.
    pub fn select(&self) -> SettlementResult<SelectedProvider> {
        let now = now_ms();
        let best = self
            .endpoints
            .iter()
            .position(|ep| ep.is_available(now, self.cooldown_ms));

        let Some(best) = best else {
            tracing::error!("No healthy RPC provider available");
            return Err(SettlementError::NoHealthyProvider);
        };

        let previous = self.active.swap(best, Ordering::SeqCst);
        if previous != best {
            tracing::info!(
                from = %self.endpoints[previous].name,
                to = %self.endpoints[best].name,
                "Active provider changed"
            );
            metrics::record_provider_failover(
                &self.endpoints[previous].name,
                &self.endpoints[best].name,
            );
        }

        let endpoint = &self.endpoints[best];
        Ok(SelectedProvider {
            index: best,
            name: endpoint.name.clone(),
            provider: endpoint.provider(),
        })
    }

    /// Report the outcome of a call made through `select`.
    ///
    /// Failover is decided here, synchronously: when the failure
    /// threshold is crossed the active pointer moves to the next
    /// available endpoint immediately.
    pub fn report_outcome(&self, index: usize, success: bool, latency: Duration) {
        let endpoint = &self.endpoints[index];
        metrics::record_rpc_call(&endpoint.name, success, latency);

        if success {
            endpoint.record_success();
            return;
        }

        let became_unhealthy = endpoint.record_failure(self.failure_threshold);
        if became_unhealthy && self.active.load(Ordering::SeqCst) == index {
            let now = now_ms();
            if let Some(next) = self
                .endpoints
                .iter()
                .position(|ep| ep.is_available(now, self.cooldown_ms))
            {
                self.active.store(next, Ordering::SeqCst);
                tracing::warn!(
                    from = %endpoint.name,
                    to = %self.endpoints[next].name,
                    "Failing over to next provider"
                );
                metrics::record_provider_failover(&endpoint.name, &self.endpoints[next].name);
            } else {
                tracing::error!("All RPC providers are unhealthy");
            }
        }
    }

    /// Name of the currently active endpoint.
    pub fn active_name(&self) -> &str {
        &self.endpoints[self.active.load(Ordering::SeqCst)].name
    }

    pub fn provider_count(&self) -> usize {
        self.endpoints.len()
    }

    /// Health snapshot for status reporting: (name, healthy, score).
    pub fn health_snapshot(&self) -> Vec<(String, bool, u32)> {
        self.endpoints
            .iter()
            .map(|ep| (ep.name.clone(), ep.is_healthy(), ep.health_score()))
            .collect()
    }
}

impl std::fmt::Debug for ProviderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderPool")
            .field("endpoints", &self.endpoints)
            .field("active", &self.active_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(names: &[&str]) -> ProviderPool {
        let providers: Vec<ProviderConfig> = names
            .iter()
            .enumerate()
            .map(|(i, name)| ProviderConfig {
                name: name.to_string(),
                url: format!("http://localhost:{}", 8545 + i),
                priority: i as u32,
            })
            .collect();
        ProviderPool::from_config(
            &providers,
            &FailoverConfig {
                failure_threshold: 3,
                cooldown_secs: 60,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_empty_pool_rejected() {
        let result = ProviderPool::from_config(&[], &FailoverConfig::default());
        assert!(result.is_err());
    }

    #[test]
    fn test_failover_at_exact_threshold() {
        let pool = pool(&["primary", "backup"]);
        let latency = Duration::from_millis(10);

        let selected = pool.select().unwrap();
        assert_eq!(selected.name, "primary");

        // Two failures: still on primary
        pool.report_outcome(0, false, latency);
        assert_eq!(pool.select().unwrap().name, "primary");
        pool.report_outcome(0, false, latency);
        assert_eq!(pool.select().unwrap().name, "primary");

        // Third consecutive failure triggers the switch
        pool.report_outcome(0, false, latency);
        assert_eq!(pool.select().unwrap().name, "backup");
    }

    #[test]
    fn test_success_between_failures_resets_streak() {
        let pool = pool(&["primary", "backup"]);
        let latency = Duration::from_millis(10);

        pool.report_outcome(0, false, latency);
        pool.report_outcome(0, false, latency);
        pool.report_outcome(0, true, latency);
        pool.report_outcome(0, false, latency);
        pool.report_outcome(0, false, latency);

        // Never three in a row, so still on primary
        assert_eq!(pool.select().unwrap().name, "primary");
    }

    #[test]
    fn test_all_unhealthy_is_hard_failure() {
        let pool = pool(&["primary", "backup"]);
        let latency = Duration::from_millis(10);

        for index in 0..2 {
            for _ in 0..3 {
                pool.report_outcome(index, false, latency);
            }
        }

        match pool.select() {
            Err(SettlementError::NoHealthyProvider) => {}
            other => panic!("expected NoHealthyProvider, got {:?}", other.map(|s| s.name)),
        }
    }

    #[test]
    fn test_backup_failure_does_not_restore_primary_early() {
        let pool = pool(&["primary", "backup"]);
        let latency = Duration::from_millis(10);

        for _ in 0..3 {
            pool.report_outcome(0, false, latency);
        }
        assert_eq!(pool.select().unwrap().name, "backup");

        // One backup failure is below threshold; still on backup, and
        // primary is inside its cool-down
        pool.report_outcome(1, false, latency);
        assert_eq!(pool.select().unwrap().name, "backup");
    }
}

//! Distributed-lock capability and the in-memory implementation.
//!
//! # Responsibilities
//! - Mutual exclusion scoped to a named resource (wallet, scan pair)
//! - Bounded acquisition wait and TTL-based takeover of dead holders
//! - Ownership re-validation so an expired holder fails closed
//!
//! # Design Decisions
//! - Lock state is leased, never held forever: a crashed holder's lock
//!   becomes acquirable after its TTL
//! - Guards release on drop so every exit path gives the lock back
//! - If the lock backend is unreachable the acquisition simply times
//!   out; there is no local-only fallback that would weaken the
//!   cross-process guarantee

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use uuid::Uuid;

use crate::resilience::backoff::calculate_backoff;
use crate::store::now_ms;

/// Proof of lock ownership handed to the holder.
#[derive(Debug, Clone)]
pub struct LockToken {
    pub resource: String,
    pub holder: Uuid,
    pub expires_at_ms: u64,
}

/// Distributed-lock capability consumed by the settlement core.
pub trait LockService: Send + Sync {
    /// Try to take the lock once. Returns a token on success, None when
    /// another holder owns an unexpired lease.
    fn try_acquire(&self, resource: &str, ttl: Duration) -> Option<LockToken>;

    /// Release the lock if the token still owns it.
    fn release(&self, token: &LockToken);

    /// Whether the token still owns an unexpired lease. Used to
    /// re-validate ownership before committing.
    fn is_held(&self, token: &LockToken) -> bool;
}

/// RAII wrapper releasing the lock on drop.
pub struct LockGuard {
    token: LockToken,
    service: Arc<dyn LockService>,
}

impl LockGuard {
    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Re-validate ownership against the lock service.
    pub fn is_live(&self) -> bool {
        self.service.is_held(&self.token)
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.service.release(&self.token);
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("resource", &self.token.resource)
            .field("holder", &self.token.holder)
            .finish()
    }
}

/// Acquire a lock within a bounded wait, polling with backoff.
///
/// Returns None when the wait budget is exhausted.
pub async fn acquire_lock(
    service: &Arc<dyn LockService>,
    resource: &str,
    ttl: Duration,
    wait: Duration,
) -> Option<LockGuard> {
    let deadline = now_ms() + wait.as_millis() as u64;
    let mut attempt = 0u32;

    loop {
        if let Some(token) = service.try_acquire(resource, ttl) {
            return Some(LockGuard {
                token,
                service: Arc::clone(service),
            });
        }

        attempt += 1;
        let delay = calculate_backoff(attempt, 25, 250);
        if now_ms() + delay.as_millis() as u64 > deadline {
            return None;
        }
        tokio::time::sleep(delay).await;
    }
}

/// In-process lock table with TTL takeover.
///
/// Stands in for a real distributed lock (Redis, advisory locks) behind
/// the same trait.
#[derive(Default)]
pub struct MemoryLockService {
    table: DashMap<String, (Uuid, u64)>,
}

impl MemoryLockService {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockService for MemoryLockService {
    fn try_acquire(&self, resource: &str, ttl: Duration) -> Option<LockToken> {
        let now = now_ms();
        let holder = Uuid::new_v4();
        let expires_at_ms = now + ttl.as_millis() as u64;

        let mut entry = self
            .table
            .entry(resource.to_string())
            .or_insert((holder, expires_at_ms));

        let (current_holder, current_expiry) = *entry;
        if current_holder == holder {
            // We inserted it ourselves just now.
            return Some(LockToken {
                resource: resource.to_string(),
                holder,
                expires_at_ms,
            });
        }

        if current_expiry <= now {
            // Previous holder's lease expired (presumed crashed); take over.
            *entry = (holder, expires_at_ms);
            tracing::debug!(resource = %resource, "Took over expired lock lease");
            return Some(LockToken {
                resource: resource.to_string(),
                holder,
                expires_at_ms,
            });
        }

        None
    }

    fn release(&self, token: &LockToken) {
        self.table
            .remove_if(&token.resource, |_, (holder, _)| *holder == token.holder);
    }

    fn is_held(&self, token: &LockToken) -> bool {
        if token.expires_at_ms <= now_ms() {
            return false;
        }
        self.table
            .get(&token.resource)
            .map(|entry| entry.0 == token.holder)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutual_exclusion() {
        let locks = MemoryLockService::new();
        let ttl = Duration::from_secs(10);

        let first = locks.try_acquire("nonce:0xabc", ttl).unwrap();
        assert!(locks.try_acquire("nonce:0xabc", ttl).is_none());
        // Other resources are independent
        assert!(locks.try_acquire("nonce:0xdef", ttl).is_some());

        locks.release(&first);
        assert!(locks.try_acquire("nonce:0xabc", ttl).is_some());
    }

    #[test]
    fn test_expired_lease_takeover() {
        let locks = MemoryLockService::new();

        let stale = locks.try_acquire("scan:w:USDT", Duration::from_millis(0)).unwrap();
        // Lease expired immediately; the next caller takes over.
        let fresh = locks.try_acquire("scan:w:USDT", Duration::from_secs(10)).unwrap();

        assert!(!locks.is_held(&stale));
        assert!(locks.is_held(&fresh));

        // The stale holder's release must not evict the new holder.
        locks.release(&stale);
        assert!(locks.is_held(&fresh));
    }

    #[tokio::test]
    async fn test_bounded_wait_times_out() {
        let locks: Arc<dyn LockService> = Arc::new(MemoryLockService::new());

        let held = acquire_lock(&locks, "nonce:w", Duration::from_secs(30), Duration::from_secs(5))
            .await
            .unwrap();

        let waited = acquire_lock(
            &locks,
            "nonce:w",
            Duration::from_secs(30),
            Duration::from_millis(100),
        )
        .await;
        assert!(waited.is_none());

        drop(held);
        let acquired = acquire_lock(
            &locks,
            "nonce:w",
            Duration::from_secs(30),
            Duration::from_millis(100),
        )
        .await;
        assert!(acquired.is_some());
    }

    #[tokio::test]
    async fn test_guard_releases_on_drop() {
        let locks: Arc<dyn LockService> = Arc::new(MemoryLockService::new());
        {
            let _guard =
                acquire_lock(&locks, "r", Duration::from_secs(30), Duration::from_secs(1))
                    .await
                    .unwrap();
        }
        assert!(locks.try_acquire("r", Duration::from_secs(1)).is_some());
    }
}

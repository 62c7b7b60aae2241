//! Nonce coordination for outbound wallets.
//!
//! # Responsibilities
//! - Serialize nonce assignment per wallet across processes via the
//!   lock service
//! - Hand out the next usable nonce as a lease that must be committed
//!   or released
//! - Reconcile the chain's pending nonce with the locally committed
//!   high-water mark so a rebroadcast gap never hands out a duplicate
//!
//! # Design Decisions
//! - The lease holds the wallet lock for its whole lifetime; commit
//!   re-validates ownership so an expired holder fails closed instead
//!   of double-spending a nonce
//! - The chain nonce source is a trait so coordination logic is
//!   testable without a node

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};

use crate::config::NonceConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::store::{acquire_lock, LockGuard, LockService, SettlementStore};

/// Source of the chain's pending transaction count for an account.
pub trait AccountNonceSource: Send + Sync {
    fn next_chain_nonce(
        &self,
        address: Address,
    ) -> Pin<Box<dyn Future<Output = SettlementResult<u64>> + Send + '_>>;
}

/// An exclusive claim on one nonce for one wallet.
///
/// The embedded lock guard keeps other issuers out until the lease is
/// committed or dropped.
#[derive(Debug)]
pub struct NonceLease {
    pub wallet: Address,
    pub nonce: u64,
    guard: LockGuard,
}

impl NonceLease {
    /// Whether the underlying lock lease is still owned.
    pub fn is_live(&self) -> bool {
        self.guard.is_live()
    }
}

/// Hands out per-wallet nonce leases under a distributed lock.
pub struct NonceCoordinator {
    nonce_source: Arc<dyn AccountNonceSource>,
    store: Arc<dyn SettlementStore>,
    locks: Arc<dyn LockService>,
    lease_ttl: Duration,
    acquire_timeout: Duration,
}

impl NonceCoordinator {
    pub fn new(
        nonce_source: Arc<dyn AccountNonceSource>,
        store: Arc<dyn SettlementStore>,
        locks: Arc<dyn LockService>,
        config: &NonceConfig,
    ) -> Self {
        Self {
            nonce_source,
            store,
            locks,
            lease_ttl: Duration::from_secs(config.lease_ttl_secs),
            acquire_timeout: Duration::from_secs(config.acquire_timeout_secs),
        }
    }

    /// Lease the next nonce for a wallet.
    ///
    /// Takes the wallet's lock within the bounded acquire timeout, then
    /// picks `max(chain pending nonce, committed + 1)` so that nonces
    /// the chain has not yet observed (in-flight rebroadcasts) are
    /// still skipped.
    pub async fn lease(&self, wallet: Address) -> SettlementResult<NonceLease> {
        let resource = format!("nonce:{wallet:#x}");
        let guard = acquire_lock(&self.locks, &resource, self.lease_ttl, self.acquire_timeout)
            .await
            .ok_or(SettlementError::NonceLeaseTimeout { wallet })?;

        let chain_nonce = self.nonce_source.next_chain_nonce(wallet).await?;
        let committed = self.store.committed_nonce(wallet);
        let nonce = match committed {
            Some(committed) => chain_nonce.max(committed + 1),
            None => chain_nonce,
        };

        tracing::debug!(
            wallet = %wallet,
            nonce,
            chain_nonce,
            committed = ?committed,
            "Nonce leased"
        );

        Ok(NonceLease {
            wallet,
            nonce,
            guard,
        })
    }

    /// Commit a lease after its transaction was broadcast.
    ///
    /// Ownership is re-validated first: if the lease's lock expired and
    /// another holder took over, the commit is refused and the caller
    /// must treat the transaction as failed.
    pub fn commit(&self, lease: NonceLease, tx_hash: TxHash) -> SettlementResult<()> {
        if !lease.guard.is_live() {
            tracing::error!(
                wallet = %lease.wallet,
                nonce = lease.nonce,
                tx_hash = %tx_hash,
                "Nonce lease expired before commit"
            );
            return Err(SettlementError::LeaseExpired);
        }

        self.store.record_committed_nonce(lease.wallet, lease.nonce);
        tracing::info!(
            wallet = %lease.wallet,
            nonce = lease.nonce,
            tx_hash = %tx_hash,
            "Nonce committed"
        );
        // Guard drops here, releasing the wallet lock.
        Ok(())
    }

    /// Release a lease without committing. The nonce stays available
    /// for the next holder.
    pub fn release(&self, lease: NonceLease) {
        tracing::debug!(
            wallet = %lease.wallet,
            nonce = lease.nonce,
            "Nonce lease released without commit"
        );
        drop(lease);
    }
}

//! Concurrent nonce coordination over the in-tree store and locks.

mod common;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, TxHash};

use settlement_core::config::NonceConfig;
use settlement_core::nonce::{AccountNonceSource, NonceCoordinator};
use settlement_core::store::{MemoryLockService, MemoryStore, SettlementStore};
use settlement_core::SettlementError;

use common::wallet_a;

struct FixedNonceSource(u64);

impl AccountNonceSource for FixedNonceSource {
    fn next_chain_nonce(
        &self,
        _address: Address,
    ) -> Pin<Box<dyn Future<Output = settlement_core::SettlementResult<u64>> + Send + '_>> {
        let nonce = self.0;
        Box::pin(async move { Ok(nonce) })
    }
}

fn coordinator(
    chain_nonce: u64,
    store: Arc<dyn SettlementStore>,
    config: NonceConfig,
) -> NonceCoordinator {
    NonceCoordinator::new(
        Arc::new(FixedNonceSource(chain_nonce)),
        store,
        Arc::new(MemoryLockService::new()),
        &config,
    )
}

#[tokio::test]
async fn concurrent_leases_serialize_and_never_share_a_nonce() {
    let store: Arc<dyn SettlementStore> = Arc::new(MemoryStore::new(None));
    store.record_committed_nonce(wallet_a(), 41);

    let coordinator = Arc::new(coordinator(
        40,
        Arc::clone(&store),
        NonceConfig {
            lease_ttl_secs: 30,
            acquire_timeout_secs: 5,
        },
    ));

    let first = coordinator.lease(wallet_a()).await.unwrap();
    assert_eq!(first.nonce, 42);

    // A second caller must block until the first lease resolves.
    let contender = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.lease(wallet_a()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!contender.is_finished());

    coordinator.commit(first, TxHash::repeat_byte(0x11)).unwrap();

    let second = contender.await.unwrap().unwrap();
    assert_eq!(second.nonce, 43);
}

#[tokio::test]
async fn lease_times_out_when_holder_never_yields() {
    let store: Arc<dyn SettlementStore> = Arc::new(MemoryStore::new(None));
    let coordinator = coordinator(
        0,
        store,
        NonceConfig {
            lease_ttl_secs: 30,
            acquire_timeout_secs: 1,
        },
    );

    let _held = coordinator.lease(wallet_a()).await.unwrap();

    match coordinator.lease(wallet_a()).await {
        Err(SettlementError::NonceLeaseTimeout { wallet }) => assert_eq!(wallet, wallet_a()),
        other => panic!("expected NonceLeaseTimeout, got {:?}", other.map(|l| l.nonce)),
    }
}

#[tokio::test]
async fn released_nonce_is_reissued_unchanged() {
    let store: Arc<dyn SettlementStore> = Arc::new(MemoryStore::new(None));
    store.record_committed_nonce(wallet_a(), 9);
    let coordinator = coordinator(
        10,
        store,
        NonceConfig {
            lease_ttl_secs: 30,
            acquire_timeout_secs: 5,
        },
    );

    let lease = coordinator.lease(wallet_a()).await.unwrap();
    assert_eq!(lease.nonce, 10);
    coordinator.release(lease);

    // Nothing was committed, so the same nonce comes back.
    let again = coordinator.lease(wallet_a()).await.unwrap();
    assert_eq!(again.nonce, 10);
}

#[tokio::test]
async fn expired_lease_cannot_commit() {
    let store: Arc<dyn SettlementStore> = Arc::new(MemoryStore::new(None));
    let coordinator = coordinator(
        0,
        Arc::clone(&store),
        NonceConfig {
            lease_ttl_secs: 0,
            acquire_timeout_secs: 1,
        },
    );

    let lease = coordinator.lease(wallet_a()).await.unwrap();
    // TTL of zero: the lease is dead on arrival.
    tokio::time::sleep(Duration::from_millis(10)).await;

    match coordinator.commit(lease, TxHash::repeat_byte(0x22)) {
        Err(SettlementError::LeaseExpired) => {}
        other => panic!("expected LeaseExpired, got {other:?}"),
    }
    // The refused commit must not have advanced the committed nonce.
    assert_eq!(store.committed_nonce(wallet_a()), None);
}

//! Durable-state and locking capabilities.
//!
//! # Data Flow
//! ```text
//! Nonce Coordinator ──┐
//! Transaction Issuer ─┼─▶ SettlementStore (committed nonces, pending
//! Payment Verifier ───┘    transactions, payment events, scan cursors)
//!
//! Nonce Coordinator ──┐
//! Payment Verifier ───┴─▶ LockService (wallet- and scan-scoped locks)
//! ```
//!
//! # Design Decisions
//! - Both capabilities are traits; the core never assumes a backend
//! - In-tree implementations (memory.rs, locks.rs) are dashmap-based
//!   and snapshot to JSON, which is enough for a single host; multi-host
//!   deployments plug in a relational store and a real distributed lock
//! - Payment-event insertion is atomic check-and-insert on the
//!   (tx hash, log index) identity key
//! - Scan cursors and committed nonces only ever move forward

pub mod locks;
pub mod memory;

use std::time::{SystemTime, UNIX_EPOCH};

use alloy::primitives::Address;

use crate::issuer::types::{PendingTransaction, TransactionId};
use crate::scanner::types::PaymentEvent;

pub use locks::{acquire_lock, LockGuard, LockService, LockToken, MemoryLockService};
pub use memory::MemoryStore;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Persistence capability consumed by the settlement core.
pub trait SettlementStore: Send + Sync {
    /// Highest nonce committed (broadcast) for a wallet, if any.
    fn committed_nonce(&self, wallet: Address) -> Option<u64>;

    /// Record a nonce as used. Never moves backwards.
    fn record_committed_nonce(&self, wallet: Address, nonce: u64);

    /// Insert or update a pending transaction record.
    fn put_pending(&self, tx: &PendingTransaction);

    /// Fetch a pending transaction by id.
    fn pending(&self, id: TransactionId) -> Option<PendingTransaction>;

    /// All transactions the sweep must keep tracking (past broadcast,
    /// not yet terminal, see [`crate::issuer::TxStatus::needs_sweep`]) whose last
    /// submission is older than the cutoff.
    fn sweepable_before(&self, cutoff_ms: u64) -> Vec<PendingTransaction>;

    /// Atomically record a payment event. Returns false when the
    /// (tx hash, log index) key already exists; the caller must treat
    /// that as "already credited".
    fn insert_payment_event(&self, event: &PaymentEvent) -> bool;

    /// All recorded payment events for a (wallet, token) pair.
    fn payment_events_for(&self, wallet: Address, token: &str) -> Vec<PaymentEvent>;

    /// Last fully-scanned block for a (wallet, token) pair.
    fn scan_cursor(&self, wallet: Address, token: &str) -> Option<u64>;

    /// Advance the scan cursor. Ignored if `block` is not ahead of the
    /// stored value.
    fn advance_scan_cursor(&self, wallet: Address, token: &str, block: u64);
}

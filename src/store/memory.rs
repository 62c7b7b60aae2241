//! In-memory settlement store with optional JSON snapshots.
//!
//! Backs the `SettlementStore` trait with dashmap tables. A snapshot
//! file, when configured, is loaded at startup and written on shutdown
//! so a single-host deployment survives restarts without a database.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use alloy::primitives::{Address, TxHash};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::issuer::types::{PendingTransaction, TransactionId};
use crate::scanner::types::PaymentEvent;
use crate::store::SettlementStore;

/// Thread-safe in-memory store.
#[derive(Default)]
pub struct MemoryStore {
    committed_nonces: DashMap<Address, u64>,
    pending: DashMap<TransactionId, PendingTransaction>,
    payment_events: DashMap<(TxHash, u64), PaymentEvent>,
    cursors: DashMap<(Address, String), u64>,
    snapshot_path: Option<String>,
}

/// On-disk snapshot shape.
#[derive(Serialize, Deserialize, Default)]
struct Snapshot {
    committed_nonces: Vec<(Address, u64)>,
    pending: Vec<PendingTransaction>,
    payment_events: Vec<PaymentEvent>,
    cursors: Vec<(Address, String, u64)>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(snapshot_path: Option<String>) -> Self {
        Self {
            snapshot_path,
            ..Default::default()
        }
    }

    /// Load from the snapshot file if it exists.
    pub fn load_from_file(path: &str) -> std::io::Result<Self> {
        let store = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let file = File::open(path)?;
            let reader = BufReader::new(file);
            let snapshot: Snapshot = serde_json::from_reader(reader)?;

            for (wallet, nonce) in snapshot.committed_nonces {
                store.committed_nonces.insert(wallet, nonce);
            }
            for tx in snapshot.pending {
                store.pending.insert(tx.id, tx);
            }
            for event in snapshot.payment_events {
                store.payment_events.insert(event.key(), event);
            }
            for (wallet, token, block) in snapshot.cursors {
                store.cursors.insert((wallet, token), block);
            }
            tracing::info!(
                payment_events = store.payment_events.len(),
                pending = store.pending.len(),
                "Loaded settlement records from snapshot"
            );
        }
        Ok(store)
    }

    /// Write the snapshot file, if one is configured.
    pub fn save_to_file(&self) -> std::io::Result<()> {
        if let Some(path) = &self.snapshot_path {
            let snapshot = Snapshot {
                committed_nonces: self
                    .committed_nonces
                    .iter()
                    .map(|r| (*r.key(), *r.value()))
                    .collect(),
                pending: self.pending.iter().map(|r| r.value().clone()).collect(),
                payment_events: self
                    .payment_events
                    .iter()
                    .map(|r| r.value().clone())
                    .collect(),
                cursors: self
                    .cursors
                    .iter()
                    .map(|r| (r.key().0, r.key().1.clone(), *r.value()))
                    .collect(),
            };

            let file = File::create(path)?;
            let writer = BufWriter::new(file);
            serde_json::to_writer(writer, &snapshot)?;
            tracing::info!(
                path = %path,
                payment_events = snapshot.payment_events.len(),
                "Saved settlement records to snapshot"
            );
        }
        Ok(())
    }

    /// Number of recorded payment events.
    pub fn payment_event_count(&self) -> usize {
        self.payment_events.len()
    }
}

impl SettlementStore for MemoryStore {
    fn committed_nonce(&self, wallet: Address) -> Option<u64> {
        self.committed_nonces.get(&wallet).map(|r| *r.value())
    }

    fn record_committed_nonce(&self, wallet: Address, nonce: u64) {
        let mut entry = self.committed_nonces.entry(wallet).or_insert(nonce);
        if *entry < nonce {
            *entry = nonce;
        }
    }

    fn put_pending(&self, tx: &PendingTransaction) {
        self.pending.insert(tx.id, tx.clone());
    }

    fn pending(&self, id: TransactionId) -> Option<PendingTransaction> {
        self.pending.get(&id).map(|r| r.value().clone())
    }

    fn sweepable_before(&self, cutoff_ms: u64) -> Vec<PendingTransaction> {
        self.pending
            .iter()
            .filter(|r| r.value().status.needs_sweep() && r.value().submitted_at_ms < cutoff_ms)
            .map(|r| r.value().clone())
            .collect()
    }

    fn insert_payment_event(&self, event: &PaymentEvent) -> bool {
        match self.payment_events.entry(event.key()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(event.clone());
                true
            }
        }
    }

    fn payment_events_for(&self, wallet: Address, token: &str) -> Vec<PaymentEvent> {
        let mut events: Vec<PaymentEvent> = self
            .payment_events
            .iter()
            .filter(|r| r.value().wallet == wallet && r.value().token == token)
            .map(|r| r.value().clone())
            .collect();
        events.sort_by_key(|e| (e.block_number, e.log_index));
        events
    }

    fn scan_cursor(&self, wallet: Address, token: &str) -> Option<u64> {
        self.cursors
            .get(&(wallet, token.to_string()))
            .map(|r| *r.value())
    }

    fn advance_scan_cursor(&self, wallet: Address, token: &str, block: u64) {
        let mut entry = self
            .cursors
            .entry((wallet, token.to_string()))
            .or_insert(block);
        if *entry < block {
            *entry = block;
        }
    }
}

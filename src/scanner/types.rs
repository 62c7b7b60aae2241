//! Inbound payment-event records.

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};

/// A confirmed inbound token transfer detected by the scanner.
///
/// Identity key is (transaction hash, log index); crediting the same
/// key twice is a store-level no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub tx_hash: TxHash,
    pub log_index: u64,
    /// Sender of the transfer.
    pub from: Address,
    /// Transfer amount in token base units.
    pub amount: U256,
    /// Token symbol.
    pub token: String,
    /// Receiving wallet this event was matched to.
    pub wallet: Address,
    pub block_number: u64,
    /// When this core recorded the event, ms since epoch.
    pub processed_at_ms: u64,
}

impl PaymentEvent {
    /// The globally unique identity key.
    pub fn key(&self) -> (TxHash, u64) {
        (self.tx_hash, self.log_index)
    }
}

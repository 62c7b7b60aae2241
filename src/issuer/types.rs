//! Outbound-transaction records and lifecycle states.

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for an outbound transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of an outbound transaction.
///
/// ```text
/// built → submitted → {mined | stuck} → {confirmed | rebroadcast → submitted | failed}
/// ```
///
/// `Confirmed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    Built,
    Submitted,
    Mined,
    Stuck,
    Rebroadcast,
    Failed,
    Confirmed,
}

impl TxStatus {
    /// Whether this status admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Failed)
    }

    /// Whether a transaction in this status is waiting for block
    /// inclusion (and can therefore become stuck).
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TxStatus::Submitted | TxStatus::Rebroadcast)
    }

    /// Whether the sweep must keep tracking this transaction.
    ///
    /// Everything past broadcast and short of a terminal state
    /// qualifies. `Stuck` and `Mined` records stay candidates: a stuck
    /// one may still need the next bump, a mined one may confirm, or
    /// reorg back out.
    pub fn needs_sweep(&self) -> bool {
        self.is_in_flight() || matches!(self, TxStatus::Stuck | TxStatus::Mined)
    }
}

/// An outbound transaction tracked by the issuer.
///
/// Created by the issuer, mutated only by the issuer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingTransaction {
    pub id: TransactionId,
    /// Signing wallet address.
    pub wallet: Address,
    /// Nonce the payload was signed with.
    pub nonce: u64,
    pub recipient: Address,
    pub amount: U256,
    /// Token symbol; the native token is configured like any other.
    pub token: String,
    /// Gas price of the latest signed payload, in wei.
    pub gas_price: u128,
    pub gas_limit: u64,
    /// Hash of the latest signed payload.
    pub tx_hash: TxHash,
    pub status: TxStatus,
    /// When the latest payload was broadcast, ms since epoch. Zero
    /// until first submission.
    pub submitted_at_ms: u64,
    pub rebroadcast_count: u32,
}

//! Settlement error taxonomy.
//!
//! Every failure surfaced to callers is one of these variants. Transient
//! provider trouble is absorbed by pool failover and only shows up here
//! once the pool is exhausted (`NoHealthyProvider`) or the bounded retry
//! for a single call ran out (`Rpc`/`Timeout`).

use alloy::primitives::{Address, TxHash};
use thiserror::Error;

/// Errors that can occur in the settlement core.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Every configured RPC provider is unhealthy. Fatal; operators
    /// should be alerted.
    #[error("no healthy RPC provider available")]
    NoHealthyProvider,

    /// The active provider could not answer a gas query and no cached
    /// sample was fresh enough. Retryable via provider failover.
    #[error("gas quote unavailable: {0}")]
    QuoteUnavailable(String),

    /// The wallet-scoped nonce lock could not be acquired within the
    /// bounded wait. Retryable with backoff; the caller decides.
    #[error("nonce lease acquisition timed out for wallet {wallet}")]
    NonceLeaseTimeout { wallet: Address },

    /// A nonce lease outlived its TTL before commit. Fail-closed: the
    /// caller must re-lease.
    #[error("nonce lease expired before commit")]
    LeaseExpired,

    /// A submitted transaction exhausted its rebroadcast budget without
    /// block inclusion. Terminal; requires manual intervention outside
    /// this core.
    #[error("transaction {tx_hash} stuck after {rebroadcasts} rebroadcasts")]
    TransactionStuckPermanently { tx_hash: TxHash, rebroadcasts: u32 },

    /// The provider rejected the broadcast (malformed, underfunded,
    /// nonce collision). Terminal for this attempt.
    #[error("transaction submission rejected: {0}")]
    SubmissionRejected(String),

    /// A log-scan chunk failed; the cursor was not advanced past it.
    /// Retryable on the next scan pass.
    #[error("scan chunk {from_block}-{to_block} failed: {reason}")]
    ScanChunkFailed {
        from_block: u64,
        to_block: u64,
        reason: String,
    },

    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Connected chain does not match configuration.
    #[error("chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Key material or wallet role problem.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// Durable-store failure.
    #[error("store error: {0}")]
    Store(String),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl SettlementError {
    /// Whether the caller may retry the whole operation (with backoff).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SettlementError::QuoteUnavailable(_)
                | SettlementError::NonceLeaseTimeout { .. }
                | SettlementError::ScanChunkFailed { .. }
                | SettlementError::Rpc(_)
                | SettlementError::Timeout(_)
        )
    }
}

/// Result type for settlement operations.
pub type SettlementResult<T> = Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SettlementError::Timeout(10);
        assert_eq!(err.to_string(), "RPC timeout after 10 seconds");

        let err = SettlementError::ChainMismatch {
            expected: 56,
            actual: 1,
        };
        assert!(err.to_string().contains("56"));
    }

    #[test]
    fn test_retryability() {
        assert!(SettlementError::QuoteUnavailable("x".into()).is_retryable());
        assert!(SettlementError::NonceLeaseTimeout {
            wallet: Address::ZERO
        }
        .is_retryable());
        assert!(!SettlementError::LeaseExpired.is_retryable());
        assert!(!SettlementError::NoHealthyProvider.is_retryable());
        assert!(!SettlementError::SubmissionRejected("reverted".into()).is_retryable());
    }
}

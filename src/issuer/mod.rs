//! Outbound transaction issuance: records, state machine, sweeps.

pub mod service;
pub mod types;

pub use service::{ChainAccess, ChainFuture, SweepReport, TransactionIssuer};
pub use types::{PendingTransaction, TransactionId, TxStatus};

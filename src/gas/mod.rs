//! Gas pricing: sampled chain prices clamped into a configured band.

pub mod oracle;

pub use oracle::{GasOracle, GasQuote, TxClass};

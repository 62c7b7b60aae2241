//! Incoming-payment detection: chunked log scans with exact-once
//! crediting.

pub mod types;
pub mod verifier;

pub use types::PaymentEvent;
pub use verifier::{plan_chunks, PaymentVerifier};

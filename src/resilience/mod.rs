//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! RPC call attempt fails:
//!     → backoff.rs computes the delay before the next bounded attempt
//!     → caller-level retries (payouts, scans) use the same curve
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Retries are always bounded; this core never loops silently
//! - Jitter avoids lockstep retries from concurrent workers

pub mod backoff;

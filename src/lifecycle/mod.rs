//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast to background loops → drain → exit
//!
//! Signals (signals.rs):
//!     SIGINT/SIGTERM → trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Background loops subscribe before they start
//! - Shutdown stops new work first; in-flight settlement steps finish

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

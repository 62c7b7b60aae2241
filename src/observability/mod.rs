//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Logging (logging.rs):
//!     init at startup → tracing events from every subsystem
//!
//! Metrics (metrics.rs):
//!     hot-path helpers → metrics facade
//!     (no exporter is installed by this core; recording is a no-op
//!     until the embedding process installs one)
//! ```
//!
//! # Design Decisions
//! - Structured tracing fields, not format strings, on hot paths
//! - Metric updates are low-overhead counter/gauge bumps
//! - Log level configurable via config and RUST_LOG

pub mod logging;
pub mod metrics;

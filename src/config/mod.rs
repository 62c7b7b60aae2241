//! Configuration subsystem.
//!
//! # Data Flow
//! ```text
//! Startup:
//!     loader.rs reads TOML
//!     → schema.rs deserializes with defaults
//!     → validation.rs checks semantics (all errors reported)
//!     → accepted config is handed to the service by value
//! ```
//!
//! # Design Decisions
//! - Config is consumed, not owned: this core never writes it back
//! - Every section has serde defaults so partial files work
//! - Validation failures abort startup, never degrade silently

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::{
    ChainConfig, FailoverConfig, GasConfig, IssuerConfig, NonceConfig, ObservabilityConfig,
    ProviderConfig, ScannerConfig, SettlementConfig, StoreConfig, TokenConfig, WalletConfig,
};

//! Custodial token-ledger settlement core.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌────────────────────────────────────────────┐
//!                         │              SETTLEMENT CORE                │
//!                         │                                            │
//!   request_payout ───────┼▶ issuer ──▶ nonce ──▶ gas ──▶ keys         │
//!                         │     │        │                  │          │
//!                         │     └────────┴──────┬───────────┘          │
//!                         │                     ▼                      │
//!   verify_incoming ──────┼▶ scanner ──▶      rpc (pool + failover)    │
//!                         │     │              │                       │
//!                         │     ▼              ▼                       │
//!                         │   store ◀──── chain providers              │
//!                         │                                            │
//!                         │  ┌──────────────────────────────────────┐  │
//!                         │  │       Cross-Cutting Concerns          │  │
//!                         │  │  config · observability · resilience  │  │
//!                         │  │           · lifecycle                 │  │
//!                         │  └──────────────────────────────────────┘  │
//!                         └────────────────────────────────────────────┘
//! ```
//!
//! The core moves value on one EVM chain for a custodial ledger: it
//! issues payouts (nonce-coordinated, gas-clamped, rebroadcast when
//! stuck) and credits deposits (chunked log scans with exact-once
//! recording). Persistence, locking and key storage are traits so the
//! embedding application chooses the backends.

// Core subsystems
pub mod config;
pub mod error;
pub mod gas;
pub mod issuer;
pub mod keys;
pub mod nonce;
pub mod rpc;
pub mod scanner;
pub mod service;
pub mod store;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::SettlementConfig;
pub use error::{SettlementError, SettlementResult};
pub use service::SettlementService;

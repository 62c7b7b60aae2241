//! Chain connectivity: provider pool, failover, and typed RPC access.
//!
//! All chain traffic flows through [`RpcClient`], which selects an
//! endpoint from the [`ProviderPool`], applies a per-call timeout, and
//! reports the outcome back so unhealthy endpoints are rotated out.

pub mod client;
pub mod health;
pub mod pool;
pub mod types;

pub use client::RpcClient;
pub use pool::{ProviderPool, SelectedProvider};
pub use types::{ChainId, Token};

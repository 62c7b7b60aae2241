//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! settlement core. All types derive Serde traits for deserialization
//! from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the settlement service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SettlementConfig {
    /// Chain connectivity settings.
    pub chain: ChainConfig,

    /// RPC provider endpoints, highest priority first.
    pub providers: Vec<ProviderConfig>,

    /// Provider failover policy.
    pub failover: FailoverConfig,

    /// Gas pricing bounds and limits.
    pub gas: GasConfig,

    /// Nonce lease settings.
    pub nonce: NonceConfig,

    /// Outbound transaction lifecycle settings.
    pub issuer: IssuerConfig,

    /// Inbound payment scanning settings.
    pub scanner: ScannerConfig,

    /// Token definitions known to this deployment.
    pub tokens: Vec<TokenConfig>,

    /// Wallets this core operates on.
    pub wallets: Vec<WalletConfig>,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Store snapshot settings.
    pub store: StoreConfig,
}

/// Chain connectivity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Chain ID (e.g., 56 for BSC mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// Per-call RPC timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Bounded attempts per RPC call before the error surfaces.
    pub rpc_attempts: u32,

    /// Number of block confirmations required for finality.
    pub confirmation_blocks: u32,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            chain_id: 31337,
            rpc_timeout_secs: 10,
            rpc_attempts: 2,
            confirmation_blocks: 3,
        }
    }
}

/// A single RPC provider endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Provider name for logging/metrics (e.g., "quicknode").
    pub name: String,

    /// JSON-RPC endpoint URL.
    pub url: String,

    /// Priority rank (lower = preferred).
    #[serde(default)]
    pub priority: u32,
}

/// Provider failover policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FailoverConfig {
    /// Consecutive failures before a provider is marked unhealthy.
    pub failure_threshold: u32,

    /// Seconds an unhealthy provider waits before becoming eligible
    /// again.
    pub cooldown_secs: u64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown_secs: 60,
        }
    }
}

/// Gas pricing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GasConfig {
    /// Minimum gas price in gwei; sampled prices are clamped up to it.
    pub min_gwei: u64,

    /// Maximum gas price in gwei; sampled and bumped prices are clamped
    /// down to it.
    pub max_gwei: u64,

    /// Static gas limit for native transfers.
    pub native_transfer_limit: u64,

    /// Safety multiplier applied to estimated gas for token transfers.
    pub estimate_multiplier: f64,

    /// Floor for token-transfer gas limits; also the fallback when
    /// estimation fails.
    pub min_token_transfer_limit: u64,

    /// Seconds a cached gas sample stays usable as a fallback.
    pub sample_ttl_secs: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            min_gwei: 1,
            max_gwei: 100,
            native_transfer_limit: 21_000,
            estimate_multiplier: 1.2,
            min_token_transfer_limit: 60_000,
            sample_ttl_secs: 30,
        }
    }
}

/// Nonce lease configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NonceConfig {
    /// Lease TTL in seconds; a crashed holder's lock becomes acquirable
    /// after this.
    pub lease_ttl_secs: u64,

    /// Bounded wait for lock acquisition in seconds.
    pub acquire_timeout_secs: u64,
}

impl Default for NonceConfig {
    fn default() -> Self {
        Self {
            lease_ttl_secs: 30,
            acquire_timeout_secs: 10,
        }
    }
}

/// Outbound transaction lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IssuerConfig {
    /// Seconds a submitted transaction may stay unmined before it is
    /// considered stuck.
    pub stuck_after_secs: u64,

    /// Maximum rebroadcast attempts before a stuck transaction fails
    /// permanently.
    pub max_rebroadcasts: u32,

    /// Gas price multiplier applied on each rebroadcast.
    pub bump_multiplier: f64,

    /// Interval between stuck-transaction sweeps in seconds.
    pub sweep_interval_secs: u64,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            stuck_after_secs: 180,
            max_rebroadcasts: 3,
            bump_multiplier: 1.2,
            sweep_interval_secs: 60,
        }
    }
}

/// Inbound payment scanning configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Blocks per log query chunk (sized to provider limits).
    pub chunk_blocks: u64,

    /// Blocks held back from the chain tip to avoid scanning
    /// not-yet-final blocks.
    pub confirmation_lag: u64,

    /// TTL for the per-(wallet, token) scan lock in seconds.
    pub scan_lock_ttl_secs: u64,

    /// Interval between scan passes in seconds.
    pub interval_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            chunk_blocks: 2_000,
            confirmation_lag: 12,
            scan_lock_ttl_secs: 120,
            interval_secs: 30,
        }
    }
}

/// A token this deployment settles.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenConfig {
    /// Symbol used as the token identifier in records (e.g., "USDT").
    pub symbol: String,

    /// Contract address; absent for the chain's native token.
    #[serde(default)]
    pub address: Option<String>,

    /// Token decimals.
    pub decimals: u8,
}

/// A wallet this core operates on.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WalletConfig {
    /// Wallet address.
    pub address: String,

    /// Role: "input", "output" or "authorization".
    pub role: String,

    /// Reference into the external key storage; only valid for
    /// output-signing wallets.
    #[serde(default)]
    pub key_ref: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default log level filter when RUST_LOG is unset.
    pub log_level: String,

    /// Emit JSON-formatted logs (production) instead of pretty.
    pub log_json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "settlement_core=debug,info".to_string(),
            log_json: false,
        }
    }
}

/// Store snapshot configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// Path for the JSON snapshot of durable records; in-memory only
    /// when unset.
    pub snapshot_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SettlementConfig::default();
        assert_eq!(config.failover.failure_threshold, 3);
        assert_eq!(config.chain.confirmation_blocks, 3);
        assert_eq!(config.gas.native_transfer_limit, 21_000);
        assert_eq!(config.nonce.acquire_timeout_secs, 10);
        assert_eq!(config.issuer.max_rebroadcasts, 3);
        assert_eq!(config.scanner.chunk_blocks, 2_000);
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            [chain]
            chain_id = 56

            [[providers]]
            name = "quicknode"
            url = "https://example.invalid/rpc"
            priority = 0

            [[tokens]]
            symbol = "USDT"
            address = "0x55d398326f99059fF775485246999027B3197955"
            decimals = 18
        "#;
        let config: SettlementConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.chain.chain_id, 56);
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.tokens[0].symbol, "USDT");
        // Unspecified sections fall back to defaults
        assert_eq!(config.issuer.stuck_after_secs, 180);
    }
}

//! Gas price and gas limit quoting.
//!
//! # Responsibilities
//! - Sample the chain gas price and clamp it into the configured
//!   [min, max] band before anyone spends at it
//! - Assign gas limits: a fixed limit for native transfers, an
//!   estimate with a safety multiplier for token transfers
//! - Keep a short-lived cached sample as a fallback when the chain is
//!   briefly unreachable
//!
//! # Design Decisions
//! - The clamp is unconditional. A spiking chain price never produces
//!   a quote above the cap; a dust-level price never goes below the
//!   floor where nodes would ignore the transaction.
//! - Estimation failure falls back to the configured floor limit
//!   rather than failing the payout; an underestimate reverts on
//!   chain, an overestimate only reserves headroom.

use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::rpc::types::TransactionRequest;
use tokio::sync::Mutex;

use crate::config::GasConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::rpc::RpcClient;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// The two shapes of outbound transaction this core issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxClass {
    NativeTransfer,
    TokenTransfer,
}

/// A price and limit pair ready to build a transaction with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasQuote {
    /// Gas price in wei, already clamped into the configured band.
    pub gas_price_wei: u128,

    /// Gas limit for the transaction class.
    pub gas_limit: u64,
}

/// Quotes clamped gas prices with a short-lived sample cache.
pub struct GasOracle {
    rpc: Arc<RpcClient>,
    config: GasConfig,
    sample_ttl: Duration,
    last_sample: Mutex<Option<(u128, Instant)>>,
}

impl GasOracle {
    pub fn new(rpc: Arc<RpcClient>, config: GasConfig) -> Self {
        let sample_ttl = Duration::from_secs(config.sample_ttl_secs);
        Self {
            rpc,
            config,
            sample_ttl,
            last_sample: Mutex::new(None),
        }
    }

    /// Quote a price and limit for a transaction class, without an
    /// on-chain estimate. Token transfers get the configured floor
    /// limit.
    pub async fn quote(&self, class: TxClass) -> SettlementResult<GasQuote> {
        let gas_price_wei = self.sample_price().await?;
        let gas_limit = match class {
            TxClass::NativeTransfer => self.config.native_transfer_limit,
            TxClass::TokenTransfer => self.config.min_token_transfer_limit,
        };
        Ok(GasQuote {
            gas_price_wei,
            gas_limit,
        })
    }

    /// Quote with an on-chain estimate for the given request, scaled
    /// by the safety multiplier and floored at the configured minimum.
    /// Falls back to the floor limit when estimation fails.
    pub async fn quote_with_estimate(
        &self,
        request: &TransactionRequest,
    ) -> SettlementResult<GasQuote> {
        let gas_price_wei = self.sample_price().await?;
        let gas_limit = match self.rpc.estimate_gas(request.clone()).await {
            Ok(estimate) => {
                let scaled = (estimate as f64 * self.config.estimate_multiplier) as u64;
                scaled.max(self.config.min_token_transfer_limit)
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    fallback_limit = self.config.min_token_transfer_limit,
                    "Gas estimation failed, using floor limit"
                );
                self.config.min_token_transfer_limit
            }
        };
        Ok(GasQuote {
            gas_price_wei,
            gas_limit,
        })
    }

    /// Sample the chain gas price, clamp it, and cache it. When the
    /// chain is unreachable a cached sample inside its TTL is reused;
    /// past the TTL the quote is refused rather than priced stale.
    pub async fn sample_price(&self) -> SettlementResult<u128> {
        match self.rpc.gas_price().await {
            Ok(raw) => {
                let clamped = self.clamp_price(raw);
                if clamped != raw {
                    tracing::debug!(
                        raw_wei = raw,
                        clamped_wei = clamped,
                        "Sampled gas price clamped into band"
                    );
                }
                *self.last_sample.lock().await = Some((clamped, Instant::now()));
                Ok(clamped)
            }
            Err(e) => {
                let cached = *self.last_sample.lock().await;
                match cached {
                    Some((price, at)) if at.elapsed() <= self.sample_ttl => {
                        tracing::warn!(
                            error = %e,
                            cached_wei = price,
                            age_ms = at.elapsed().as_millis() as u64,
                            "Gas price sampling failed, reusing cached sample"
                        );
                        Ok(price)
                    }
                    _ => Err(SettlementError::QuoteUnavailable(e.to_string())),
                }
            }
        }
    }

    /// Clamp a wei price into the configured [min, max] band.
    pub fn clamp_price(&self, price_wei: u128) -> u128 {
        let min = self.config.min_gwei as u128 * WEI_PER_GWEI;
        let max = self.config.max_gwei as u128 * WEI_PER_GWEI;
        price_wei.clamp(min, max)
    }

    /// The hard price cap in wei. Rebroadcast bumps must never exceed
    /// this.
    pub fn max_price_wei(&self) -> u128 {
        self.config.max_gwei as u128 * WEI_PER_GWEI
    }

    /// Seed the sample cache so quoting works without a reachable node.
    #[cfg(test)]
    pub(crate) async fn prime_sample(&self, price_wei: u128) {
        *self.last_sample.lock().await = Some((price_wei, Instant::now()));
    }
}

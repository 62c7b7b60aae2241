//! Incoming-payment verification by chunked log scanning.
//!
//! # Responsibilities
//! - Scan token Transfer logs addressed to a watched wallet, in
//!   bounded block chunks below the confirmed head
//! - Record each payment exactly once under its (tx hash, log index)
//!   identity, no matter how often the same range is rescanned
//! - Keep a per-(wallet, token) cursor that only moves past a chunk
//!   once the chunk was fully processed
//!
//! # Design Decisions
//! - The cursor is planted at the confirmed head on the first scan;
//!   deposits made before the wallet was watched are out of scope
//! - A chunk failure stops the pass without advancing the cursor, so
//!   the failed range is re-covered by the next pass
//! - Scans hold a (wallet, token) lock and simply skip when another
//!   process holds it; the dedupe key makes overlap harmless anyway

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::Address;
use alloy::rpc::types::Filter;
use alloy::sol;
use alloy::sol_types::SolEvent;

use crate::config::ScannerConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::observability::metrics;
use crate::rpc::{RpcClient, Token};
use crate::scanner::types::PaymentEvent;
use crate::store::{now_ms, LockService, SettlementStore};

sol! {
    event Transfer(address indexed from, address indexed to, uint256 value);
}

/// Scans watched wallets for incoming token transfers.
pub struct PaymentVerifier {
    rpc: Arc<RpcClient>,
    store: Arc<dyn SettlementStore>,
    locks: Arc<dyn LockService>,
    config: ScannerConfig,
}

impl PaymentVerifier {
    pub fn new(
        rpc: Arc<RpcClient>,
        store: Arc<dyn SettlementStore>,
        locks: Arc<dyn LockService>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            rpc,
            store,
            locks,
            config,
        }
    }

    /// Run one scan pass for a (wallet, token) pair and return the
    /// payments newly recorded by this pass.
    ///
    /// Skips silently when another process already holds the pair's
    /// scan lock.
    pub async fn scan(&self, wallet: Address, token: &Token) -> SettlementResult<Vec<PaymentEvent>> {
        let Some(contract) = token.address else {
            return Err(SettlementError::Config(format!(
                "token '{}' is native and has no Transfer logs to scan",
                token.symbol
            )));
        };

        let resource = format!("scan:{wallet:#x}:{}", token.symbol);
        let ttl = Duration::from_secs(self.config.scan_lock_ttl_secs);
        let Some(lock) = self.locks.try_acquire(&resource, ttl) else {
            tracing::debug!(wallet = %wallet, token = %token.symbol, "Scan already running");
            return Ok(Vec::new());
        };

        let result = self.scan_locked(wallet, token, contract).await;
        self.locks.release(&lock);
        result
    }

    async fn scan_locked(
        &self,
        wallet: Address,
        token: &Token,
        contract: Address,
    ) -> SettlementResult<Vec<PaymentEvent>> {
        let head = self.rpc.block_number().await?;
        let safe_head = head.saturating_sub(self.config.confirmation_lag);

        let cursor = self.store.scan_cursor(wallet, &token.symbol);
        let Some(last_scanned) = cursor else {
            // First scan for this pair: plant the cursor at the
            // confirmed head and start watching from here.
            self.store.advance_scan_cursor(wallet, &token.symbol, safe_head);
            tracing::info!(
                wallet = %wallet,
                token = %token.symbol,
                start_block = safe_head,
                "Scan cursor initialized"
            );
            return Ok(Vec::new());
        };

        let chunks = plan_chunks(last_scanned, safe_head, self.config.chunk_blocks);
        let mut recorded = Vec::new();

        for (from_block, to_block) in chunks {
            let filter = Filter::new()
                .address(contract)
                .event(Transfer::SIGNATURE)
                .topic2(wallet.into_word())
                .from_block(from_block)
                .to_block(to_block);

            let logs = match self.rpc.get_logs(filter).await {
                Ok(logs) => logs,
                Err(e) => {
                    metrics::record_scan_chunk(false);
                    // Cursor stays put; the next pass re-covers this range.
                    return Err(SettlementError::ScanChunkFailed {
                        from_block,
                        to_block,
                        reason: e.to_string(),
                    });
                }
            };

            for log in logs {
                let decoded = match log.log_decode::<Transfer>() {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping undecodable Transfer log");
                        continue;
                    }
                };
                let (Some(tx_hash), Some(log_index), Some(block_number)) =
                    (log.transaction_hash, log.log_index, log.block_number)
                else {
                    // Pending logs lack these fields; the confirmed
                    // head guard should make this unreachable.
                    continue;
                };

                let Transfer { from, to: _, value } = decoded.inner.data;
                let event = PaymentEvent {
                    tx_hash,
                    log_index,
                    from,
                    amount: value,
                    token: token.symbol.clone(),
                    wallet,
                    block_number,
                    processed_at_ms: now_ms(),
                };

                if self.store.insert_payment_event(&event) {
                    metrics::record_payment_event(&token.symbol);
                    tracing::info!(
                        wallet = %wallet,
                        token = %token.symbol,
                        from = %from,
                        amount = %value,
                        tx_hash = %tx_hash,
                        log_index,
                        block = block_number,
                        "Payment received"
                    );
                    recorded.push(event);
                } else {
                    tracing::debug!(
                        tx_hash = %tx_hash,
                        log_index,
                        "Payment already credited, skipping"
                    );
                }
            }

            self.store.advance_scan_cursor(wallet, &token.symbol, to_block);
            metrics::record_scan_chunk(true);
        }

        Ok(recorded)
    }
}

/// Split the unscanned range `(last_scanned, safe_head]` into inclusive
/// chunks of at most `chunk_blocks` blocks.
pub fn plan_chunks(last_scanned: u64, safe_head: u64, chunk_blocks: u64) -> Vec<(u64, u64)> {
    let chunk_blocks = chunk_blocks.max(1);
    let mut chunks = Vec::new();
    let mut from = last_scanned.saturating_add(1);
    while from <= safe_head {
        let to = safe_head.min(from + chunk_blocks - 1);
        chunks.push((from, to));
        from = to + 1;
    }
    chunks
}

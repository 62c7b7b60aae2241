//! Chain access layer on top of the provider pool.
//!
//! # Responsibilities
//! - Run every chain call through pool selection, a per-call timeout,
//!   and outcome reporting
//! - Retry transient failures a bounded number of times with backoff,
//!   so a single flaky response does not surface to callers
//! - Expose the handful of typed chain operations the settlement
//!   services need
//!
//! # Design Decisions
//! - Each retry attempt re-selects from the pool, so an attempt after
//!   a failover lands on the new provider
//! - Timeouts count as failures toward the provider's health streak

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::network::TransactionResponse;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::Provider;
use alloy::rpc::types::{Filter, Log, TransactionReceipt, TransactionRequest};

use crate::config::ChainConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::issuer::{ChainAccess, ChainFuture};
use crate::nonce::AccountNonceSource;
use crate::resilience::backoff::calculate_backoff;
use crate::rpc::pool::ProviderPool;
use crate::rpc::types::ChainId;

type ProviderHandle = Arc<dyn Provider + Send + Sync>;
type CallFuture<T> = Pin<Box<dyn Future<Output = Result<T, String>> + Send>>;

/// Typed chain operations with failover, timeout and bounded retry.
pub struct RpcClient {
    pool: Arc<ProviderPool>,
    timeout: Duration,
    attempts: u32,
    expected_chain_id: ChainId,
}

impl RpcClient {
    pub fn new(pool: Arc<ProviderPool>, chain: &ChainConfig) -> Self {
        Self {
            pool,
            timeout: Duration::from_secs(chain.rpc_timeout_secs),
            attempts: chain.rpc_attempts.max(1),
            expected_chain_id: ChainId(chain.chain_id),
        }
    }

    pub fn pool(&self) -> &Arc<ProviderPool> {
        &self.pool
    }

    pub fn expected_chain_id(&self) -> ChainId {
        self.expected_chain_id
    }

    /// Run one chain call with pool selection, timeout, outcome
    /// reporting and bounded retry.
    async fn execute<T, F>(&self, op: &'static str, call: F) -> SettlementResult<T>
    where
        F: Fn(ProviderHandle) -> CallFuture<T>,
    {
        let mut last_error = String::new();

        for attempt in 0..self.attempts {
            if attempt > 0 {
                let delay = calculate_backoff(attempt, 100, 1_000);
                tokio::time::sleep(delay).await;
            }

            let selected = self.pool.select()?;
            let started = Instant::now();
            let outcome = tokio::time::timeout(self.timeout, call(selected.provider)).await;
            let latency = started.elapsed();

            match outcome {
                Ok(Ok(value)) => {
                    self.pool.report_outcome(selected.index, true, latency);
                    return Ok(value);
                }
                Ok(Err(e)) => {
                    self.pool.report_outcome(selected.index, false, latency);
                    tracing::warn!(
                        op,
                        provider = %selected.name,
                        attempt = attempt + 1,
                        error = %e,
                        "RPC call failed"
                    );
                    last_error = e;
                }
                Err(_) => {
                    self.pool.report_outcome(selected.index, false, latency);
                    tracing::warn!(
                        op,
                        provider = %selected.name,
                        attempt = attempt + 1,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "RPC call timed out"
                    );
                    last_error = format!("timed out after {}ms", self.timeout.as_millis());
                }
            }
        }

        if last_error.starts_with("timed out") {
            Err(SettlementError::Timeout(self.timeout.as_secs()))
        } else {
            Err(SettlementError::Rpc(format!("{op}: {last_error}")))
        }
    }

    pub async fn block_number(&self) -> SettlementResult<u64> {
        self.execute("block_number", |provider| {
            Box::pin(async move { provider.get_block_number().await.map_err(|e| e.to_string()) })
        })
        .await
    }

    pub async fn chain_id(&self) -> SettlementResult<u64> {
        self.execute("chain_id", |provider| {
            Box::pin(async move { provider.get_chain_id().await.map_err(|e| e.to_string()) })
        })
        .await
    }

    /// Confirm the connected chain is the configured one. Called once
    /// at startup; a mismatch means a misconfigured endpoint.
    pub async fn verify_chain_id(&self) -> SettlementResult<()> {
        let actual = self.chain_id().await?;
        if actual != self.expected_chain_id.0 {
            return Err(SettlementError::ChainMismatch {
                expected: self.expected_chain_id.0,
                actual,
            });
        }
        Ok(())
    }

    pub async fn transaction_count(&self, address: Address) -> SettlementResult<u64> {
        self.execute("transaction_count", move |provider| {
            Box::pin(async move {
                provider
                    .get_transaction_count(address)
                    .await
                    .map_err(|e| e.to_string())
            })
        })
        .await
    }

    pub async fn gas_price(&self) -> SettlementResult<u128> {
        self.execute("gas_price", |provider| {
            Box::pin(async move { provider.get_gas_price().await.map_err(|e| e.to_string()) })
        })
        .await
    }

    pub async fn estimate_gas(&self, tx: TransactionRequest) -> SettlementResult<u64> {
        self.execute("estimate_gas", move |provider| {
            let tx = tx.clone();
            Box::pin(async move { provider.estimate_gas(tx).await.map_err(|e| e.to_string()) })
        })
        .await
    }

    pub async fn get_logs(&self, filter: Filter) -> SettlementResult<Vec<Log>> {
        self.execute("get_logs", move |provider| {
            let filter = filter.clone();
            Box::pin(async move { provider.get_logs(&filter).await.map_err(|e| e.to_string()) })
        })
        .await
    }

    pub async fn send_raw_transaction(&self, raw: Vec<u8>) -> SettlementResult<TxHash> {
        self.execute("send_raw_transaction", move |provider| {
            let raw = raw.clone();
            Box::pin(async move {
                let pending = provider
                    .send_raw_transaction(&raw)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(*pending.tx_hash())
            })
        })
        .await
    }

    pub async fn transaction_receipt(
        &self,
        hash: TxHash,
    ) -> SettlementResult<Option<TransactionReceipt>> {
        self.execute("transaction_receipt", move |provider| {
            Box::pin(async move {
                provider
                    .get_transaction_receipt(hash)
                    .await
                    .map_err(|e| e.to_string())
            })
        })
        .await
    }

    /// Look up a transaction by hash in the mempool or a block.
    /// Returns the hash when known to the node, used to resolve
    /// ambiguous broadcast outcomes.
    pub async fn transaction_by_hash(&self, hash: TxHash) -> SettlementResult<Option<TxHash>> {
        self.execute("transaction_by_hash", move |provider| {
            Box::pin(async move {
                provider
                    .get_transaction_by_hash(hash)
                    .await
                    .map(|tx| tx.map(|t| t.tx_hash()))
                    .map_err(|e| e.to_string())
            })
        })
        .await
    }

    pub async fn balance(&self, address: Address) -> SettlementResult<U256> {
        self.execute("balance", move |provider| {
            Box::pin(async move { provider.get_balance(address).await.map_err(|e| e.to_string()) })
        })
        .await
    }
}

impl ChainAccess for RpcClient {
    fn head_block(&self) -> ChainFuture<'_, u64> {
        Box::pin(self.block_number())
    }

    fn broadcast_raw(&self, raw: Vec<u8>) -> ChainFuture<'_, TxHash> {
        Box::pin(self.send_raw_transaction(raw))
    }

    fn receipt_block(&self, tx_hash: TxHash) -> ChainFuture<'_, Option<u64>> {
        Box::pin(async move {
            Ok(self
                .transaction_receipt(tx_hash)
                .await?
                .and_then(|receipt| receipt.block_number))
        })
    }

    fn knows_transaction(&self, tx_hash: TxHash) -> ChainFuture<'_, bool> {
        Box::pin(async move { Ok(self.transaction_by_hash(tx_hash).await?.is_some()) })
    }
}

impl AccountNonceSource for RpcClient {
    fn next_chain_nonce(
        &self,
        address: Address,
    ) -> Pin<Box<dyn Future<Output = SettlementResult<u64>> + Send + '_>> {
        Box::pin(self.transaction_count(address))
    }
}

//! Outbound transaction issuance and lifecycle supervision.
//!
//! # Responsibilities
//! - Build, sign and broadcast payouts under a nonce lease
//! - Track every outbound transaction through
//!   built → submitted → {mined | stuck} → {confirmed | rebroadcast | failed}
//! - Sweep submitted transactions, rebroadcasting stuck ones with a
//!   bumped gas price until the rebroadcast budget runs out
//!
//! # Design Decisions
//! - The signed payload's hash is computed before broadcast, so an
//!   ambiguous broadcast error can be resolved by asking the chain
//!   whether it knows the hash; only a confirmed non-acceptance
//!   releases the nonce
//! - A rebroadcast reuses the original nonce so the replacement and
//!   the original can never both mine
//! - The sweep runs under a cross-process lock; overlapping sweeps
//!   would double-bump gas prices

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use alloy::eips::eip2718::Encodable2718;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;

use crate::config::{ChainConfig, IssuerConfig};
use crate::error::{SettlementError, SettlementResult};
use crate::gas::{GasOracle, TxClass};
use crate::issuer::types::{PendingTransaction, TransactionId, TxStatus};
use crate::keys::{self, KeyVault, WalletRef};
use crate::nonce::NonceCoordinator;
use crate::observability::metrics;
use crate::rpc::Token;
use crate::store::{now_ms, LockService, SettlementStore};

sol! {
    function transfer(address to, uint256 value) returns (bool);
}

const SWEEP_LOCK_RESOURCE: &str = "sweep:stuck";
const SWEEP_LOCK_TTL: Duration = Duration::from_secs(120);

/// Boxed future returned by [`ChainAccess`] operations.
pub type ChainFuture<'a, T> = Pin<Box<dyn Future<Output = SettlementResult<T>> + Send + 'a>>;

/// The chain operations the issuer needs, as a capability so lifecycle
/// transitions can be driven without a live node.
pub trait ChainAccess: Send + Sync {
    /// Latest block number.
    fn head_block(&self) -> ChainFuture<'_, u64>;

    /// Broadcast a signed raw transaction.
    fn broadcast_raw(&self, raw: Vec<u8>) -> ChainFuture<'_, TxHash>;

    /// Block number of the transaction's receipt, if mined.
    fn receipt_block(&self, tx_hash: TxHash) -> ChainFuture<'_, Option<u64>>;

    /// Whether the node knows the transaction, in the mempool or a
    /// block.
    fn knows_transaction(&self, tx_hash: TxHash) -> ChainFuture<'_, bool>;
}

/// Outcome counts of one stuck-transaction sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub confirmed: usize,
    pub rebroadcast: usize,
    pub failed: usize,
}

/// Builds, signs, broadcasts and supervises outbound transactions.
pub struct TransactionIssuer {
    chain: Arc<dyn ChainAccess>,
    oracle: Arc<GasOracle>,
    nonces: Arc<NonceCoordinator>,
    vault: Arc<dyn KeyVault>,
    store: Arc<dyn SettlementStore>,
    locks: Arc<dyn LockService>,
    config: IssuerConfig,
    chain_id: u64,
    confirmation_blocks: u64,
    /// Output wallets by address, for re-signing during rebroadcast.
    wallets: HashMap<Address, WalletRef>,
    /// Configured tokens by symbol, for rebuilding calldata.
    tokens: HashMap<String, Token>,
}

impl TransactionIssuer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<dyn ChainAccess>,
        oracle: Arc<GasOracle>,
        nonces: Arc<NonceCoordinator>,
        vault: Arc<dyn KeyVault>,
        store: Arc<dyn SettlementStore>,
        locks: Arc<dyn LockService>,
        config: IssuerConfig,
        chain_config: &ChainConfig,
        wallets: Vec<WalletRef>,
        tokens: Vec<Token>,
    ) -> Self {
        Self {
            chain,
            oracle,
            nonces,
            vault,
            store,
            locks,
            config,
            chain_id: chain_config.chain_id,
            confirmation_blocks: chain_config.confirmation_blocks as u64,
            wallets: wallets.into_iter().map(|w| (w.address, w)).collect(),
            tokens: tokens.into_iter().map(|t| (t.symbol.clone(), t)).collect(),
        }
    }

    /// Issue a payout from an output wallet.
    ///
    /// Returns once the transaction is broadcast (or rejected); block
    /// inclusion is tracked asynchronously by the sweep.
    pub async fn request_payout(
        &self,
        wallet: &WalletRef,
        recipient: Address,
        amount: U256,
        token: &Token,
    ) -> SettlementResult<TransactionId> {
        if !wallet.role.may_sign() {
            return Err(SettlementError::Wallet(format!(
                "wallet {} has role {:?} and cannot issue payouts",
                wallet.address, wallet.role
            )));
        }

        let lease = self.nonces.lease(wallet.address).await?;
        let nonce = lease.nonce;

        let base = payout_request(wallet.address, recipient, amount, token);
        let quote = if token.is_native() {
            self.oracle.quote(TxClass::NativeTransfer).await
        } else {
            self.oracle.quote_with_estimate(&base).await
        };
        let quote = match quote {
            Ok(quote) => quote,
            Err(e) => {
                self.nonces.release(lease);
                return Err(e);
            }
        };

        let request = base
            .with_nonce(nonce)
            .with_chain_id(self.chain_id)
            .with_gas_limit(quote.gas_limit)
            .with_gas_price(quote.gas_price_wei);

        let envelope = match keys::sign_transaction(&self.vault, wallet, request).await {
            Ok(envelope) => envelope,
            Err(e) => {
                self.nonces.release(lease);
                return Err(e);
            }
        };
        let tx_hash = *envelope.tx_hash();

        let mut record = PendingTransaction {
            id: TransactionId::new(),
            wallet: wallet.address,
            nonce,
            recipient,
            amount,
            token: token.symbol.clone(),
            gas_price: quote.gas_price_wei,
            gas_limit: quote.gas_limit,
            tx_hash,
            status: TxStatus::Built,
            submitted_at_ms: 0,
            rebroadcast_count: 0,
        };
        self.store.put_pending(&record);

        tracing::info!(
            id = %record.id,
            wallet = %wallet.address,
            recipient = %recipient,
            token = %token.symbol,
            amount = %amount,
            nonce,
            tx_hash = %tx_hash,
            "Payout built and signed"
        );

        match self.chain.broadcast_raw(envelope.encoded_2718()).await {
            Ok(_) => {}
            Err(e) => {
                // The broadcast outcome is ambiguous: the provider may
                // have accepted the payload before the error. The hash
                // is known, so ask the chain.
                match self.chain.knows_transaction(tx_hash).await {
                    Ok(true) => {
                        tracing::warn!(
                            id = %record.id,
                            tx_hash = %tx_hash,
                            "Broadcast errored but the chain knows the hash; treating as submitted"
                        );
                    }
                    Ok(false) => {
                        // Confirmed non-acceptance. Only here is the
                        // nonce safe to hand back.
                        self.nonces.release(lease);
                        record.status = TxStatus::Failed;
                        self.store.put_pending(&record);
                        metrics::record_payout("rejected");
                        tracing::error!(
                            id = %record.id,
                            tx_hash = %tx_hash,
                            error = %e,
                            "Payout broadcast rejected"
                        );
                        return Err(SettlementError::SubmissionRejected(e.to_string()));
                    }
                    Err(lookup_err) => {
                        // Still ambiguous. The payload may be in flight,
                        // so the nonce stays committed and the sweep
                        // takes over the record.
                        record.status = TxStatus::Submitted;
                        record.submitted_at_ms = now_ms();
                        self.store.put_pending(&record);
                        if let Err(commit_err) = self.nonces.commit(lease, tx_hash) {
                            tracing::warn!(
                                id = %record.id,
                                error = %commit_err,
                                "Nonce commit failed while resolving an ambiguous broadcast"
                            );
                        }
                        tracing::error!(
                            id = %record.id,
                            tx_hash = %tx_hash,
                            broadcast_error = %e,
                            lookup_error = %lookup_err,
                            "Broadcast outcome unresolvable; holding the nonce and deferring to the sweep"
                        );
                        return Err(e);
                    }
                }
            }
        }

        if let Err(e) = self.nonces.commit(lease, tx_hash) {
            // The payload is out but the lease died before commit.
            // Record the submission anyway so the sweep tracks it; the
            // caller still sees the lease failure.
            record.status = TxStatus::Submitted;
            record.submitted_at_ms = now_ms();
            self.store.put_pending(&record);
            return Err(e);
        }
        record.status = TxStatus::Submitted;
        record.submitted_at_ms = now_ms();
        self.store.put_pending(&record);
        metrics::record_payout("submitted");

        tracing::info!(id = %record.id, tx_hash = %tx_hash, "Payout submitted");
        Ok(record.id)
    }

    /// Current status of an outbound transaction, upgraded against the
    /// chain when the record is still in flight.
    pub async fn transaction_status(&self, id: TransactionId) -> SettlementResult<TxStatus> {
        let mut record = self
            .store
            .pending(id)
            .ok_or_else(|| SettlementError::Store(format!("unknown transaction {id}")))?;

        if record.status.is_terminal() || record.status == TxStatus::Built {
            return Ok(record.status);
        }

        if let Some(block) = self.chain.receipt_block(record.tx_hash).await? {
            let head = self.chain.head_block().await?;
            let confirmations = head.saturating_sub(block) + 1;
            record.status = if confirmations >= self.confirmation_blocks {
                metrics::record_payout("confirmed");
                TxStatus::Confirmed
            } else {
                TxStatus::Mined
            };
            self.store.put_pending(&record);
        }

        Ok(record.status)
    }

    /// Sweep every tracked non-terminal transaction: confirm mined
    /// ones, rebroadcast those stuck past the threshold with a bumped
    /// gas price, fail those out of budget.
    ///
    /// Held under a cross-process lock; a sweep already running
    /// elsewhere makes this a no-op.
    pub async fn sweep_stuck(&self) -> SettlementResult<SweepReport> {
        let Some(sweep_lock) = self.locks.try_acquire(SWEEP_LOCK_RESOURCE, SWEEP_LOCK_TTL) else {
            tracing::debug!("Stuck sweep already running elsewhere");
            return Ok(SweepReport::default());
        };

        let now = now_ms();
        let candidates = self.store.sweepable_before(now);
        let mut report = SweepReport {
            checked: candidates.len(),
            ..SweepReport::default()
        };

        for mut record in candidates {
            match self.sweep_one(&mut record, now).await {
                Ok(SweepOutcome::Confirmed) => report.confirmed += 1,
                Ok(SweepOutcome::Rebroadcast) => report.rebroadcast += 1,
                Ok(SweepOutcome::Waiting) => {}
                Err(e @ SettlementError::TransactionStuckPermanently { .. }) => {
                    report.failed += 1;
                    tracing::error!(
                        id = %record.id,
                        error = %e,
                        "Payout failed permanently; manual intervention required"
                    );
                }
                Err(e) => {
                    // Leave the record as-is; the next sweep retries.
                    tracing::warn!(id = %record.id, error = %e, "Sweep step failed");
                }
            }
        }

        self.locks.release(&sweep_lock);
        if report.checked > 0 {
            tracing::info!(
                checked = report.checked,
                confirmed = report.confirmed,
                rebroadcast = report.rebroadcast,
                failed = report.failed,
                "Stuck sweep complete"
            );
        }
        Ok(report)
    }

    async fn sweep_one(
        &self,
        record: &mut PendingTransaction,
        now: u64,
    ) -> SettlementResult<SweepOutcome> {
        // Mined after all? Upgrade instead of rebroadcasting.
        if let Some(block) = self.chain.receipt_block(record.tx_hash).await? {
            let head = self.chain.head_block().await?;
            let confirmations = head.saturating_sub(block) + 1;
            if confirmations >= self.confirmation_blocks {
                record.status = TxStatus::Confirmed;
                self.store.put_pending(record);
                metrics::record_payout("confirmed");
                return Ok(SweepOutcome::Confirmed);
            }
            record.status = TxStatus::Mined;
            self.store.put_pending(record);
            return Ok(SweepOutcome::Waiting);
        }

        // No receipt. A mined record that lost its receipt was reorged
        // out and falls through to the stuck path with everyone else;
        // a young submission just waits.
        if !is_stuck(record.submitted_at_ms, now, self.config.stuck_after_secs) {
            return Ok(SweepOutcome::Waiting);
        }

        record.status = TxStatus::Stuck;
        self.store.put_pending(record);

        if record.rebroadcast_count >= self.config.max_rebroadcasts {
            record.status = TxStatus::Failed;
            self.store.put_pending(record);
            metrics::record_payout("failed");
            return Err(SettlementError::TransactionStuckPermanently {
                tx_hash: record.tx_hash,
                rebroadcasts: record.rebroadcast_count,
            });
        }

        self.rebroadcast(record).await?;
        Ok(SweepOutcome::Rebroadcast)
    }

    /// Re-sign the payout with the same nonce and a bumped gas price,
    /// and broadcast the replacement.
    async fn rebroadcast(&self, record: &mut PendingTransaction) -> SettlementResult<()> {
        let wallet = self.wallets.get(&record.wallet).ok_or_else(|| {
            SettlementError::Wallet(format!("no configured wallet {}", record.wallet))
        })?;
        let token = self.tokens.get(&record.token).ok_or_else(|| {
            SettlementError::Config(format!("no configured token '{}'", record.token))
        })?;

        let bumped = bump_gas_price(
            record.gas_price,
            self.config.bump_multiplier,
            self.oracle.max_price_wei(),
        );

        let request = payout_request(record.wallet, record.recipient, record.amount, token)
            .with_nonce(record.nonce)
            .with_chain_id(self.chain_id)
            .with_gas_limit(record.gas_limit)
            .with_gas_price(bumped);

        let envelope = keys::sign_transaction(&self.vault, wallet, request).await?;
        let tx_hash = *envelope.tx_hash();
        self.chain.broadcast_raw(envelope.encoded_2718()).await?;

        record.tx_hash = tx_hash;
        record.gas_price = bumped;
        record.status = TxStatus::Rebroadcast;
        record.submitted_at_ms = now_ms();
        record.rebroadcast_count += 1;
        self.store.put_pending(record);
        metrics::record_rebroadcast();

        tracing::warn!(
            id = %record.id,
            tx_hash = %tx_hash,
            nonce = record.nonce,
            gas_price_wei = bumped,
            attempt = record.rebroadcast_count,
            "Stuck transaction rebroadcast with bumped gas price"
        );
        Ok(())
    }
}

enum SweepOutcome {
    Confirmed,
    Rebroadcast,
    /// Mined but not yet at the confirmation depth, or freshly bumped.
    Waiting,
}

/// The unsigned shape of a payout: a value transfer for the native
/// token, an ERC-20 `transfer` call otherwise.
fn payout_request(
    from: Address,
    recipient: Address,
    amount: U256,
    token: &Token,
) -> TransactionRequest {
    match token.address {
        None => TransactionRequest::default()
            .with_from(from)
            .with_to(recipient)
            .with_value(amount),
        Some(contract) => {
            let calldata = transferCall {
                to: recipient,
                value: amount,
            }
            .abi_encode();
            TransactionRequest::default()
                .with_from(from)
                .with_to(contract)
                .with_input(calldata)
        }
    }
}

/// Multiply a gas price for a replacement transaction, never exceeding
/// the hard cap.
pub fn bump_gas_price(current_wei: u128, multiplier: f64, max_wei: u128) -> u128 {
    let bumped = (current_wei as f64 * multiplier) as u128;
    bumped.min(max_wei)
}

/// Whether a submission is old enough to count as stuck.
pub fn is_stuck(submitted_at_ms: u64, now_ms: u64, stuck_after_secs: u64) -> bool {
    now_ms.saturating_sub(submitted_at_ms) >= stuck_after_secs * 1_000
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    use crate::config::{FailoverConfig, GasConfig, NonceConfig, ProviderConfig};
    use crate::keys::{EnvKeyVault, WalletRole};
    use crate::nonce::AccountNonceSource;
    use crate::rpc::{ProviderPool, RpcClient};
    use crate::store::{MemoryLockService, MemoryStore};

    // Well-known Anvil development key #0.
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    /// Scriptable chain backend for driving lifecycle transitions.
    #[derive(Default)]
    struct StubChain {
        head: AtomicU64,
        mined_block: StdMutex<Option<u64>>,
        fail_broadcast: AtomicBool,
        fail_lookup: AtomicBool,
        knows: AtomicBool,
    }

    impl ChainAccess for StubChain {
        fn head_block(&self) -> ChainFuture<'_, u64> {
            let head = self.head.load(Ordering::SeqCst);
            Box::pin(async move { Ok(head) })
        }

        fn broadcast_raw(&self, _raw: Vec<u8>) -> ChainFuture<'_, TxHash> {
            let fail = self.fail_broadcast.load(Ordering::SeqCst);
            Box::pin(async move {
                if fail {
                    Err(SettlementError::Rpc(
                        "connection reset during broadcast".into(),
                    ))
                } else {
                    Ok(TxHash::ZERO)
                }
            })
        }

        fn receipt_block(&self, _tx_hash: TxHash) -> ChainFuture<'_, Option<u64>> {
            let block = *self.mined_block.lock().unwrap();
            Box::pin(async move { Ok(block) })
        }

        fn knows_transaction(&self, _tx_hash: TxHash) -> ChainFuture<'_, bool> {
            let fail = self.fail_lookup.load(Ordering::SeqCst);
            let knows = self.knows.load(Ordering::SeqCst);
            Box::pin(async move {
                if fail {
                    Err(SettlementError::Rpc("transaction lookup unavailable".into()))
                } else {
                    Ok(knows)
                }
            })
        }
    }

    struct FixedNonceSource(u64);

    impl AccountNonceSource for FixedNonceSource {
        fn next_chain_nonce(
            &self,
            _address: Address,
        ) -> Pin<Box<dyn Future<Output = SettlementResult<u64>> + Send + '_>> {
            let nonce = self.0;
            Box::pin(async move { Ok(nonce) })
        }
    }

    fn usdt() -> Token {
        Token {
            symbol: "USDT".into(),
            address: Some(
                "0x55d398326f99059fF775485246999027B3197955"
                    .parse()
                    .unwrap(),
            ),
            decimals: 18,
        }
    }

    fn output_wallet() -> WalletRef {
        std::env::set_var("SETTLEMENT_TEST_ISSUER_KEY", DEV_KEY);
        WalletRef {
            address: DEV_ADDR.parse().unwrap(),
            role: WalletRole::OutputSigning,
            key_ref: Some("SETTLEMENT_TEST_ISSUER_KEY".into()),
        }
    }

    struct Harness {
        chain: Arc<StubChain>,
        store: Arc<MemoryStore>,
        oracle: Arc<GasOracle>,
        issuer: TransactionIssuer,
    }

    fn harness(config: IssuerConfig) -> Harness {
        let chain = Arc::new(StubChain::default());
        let store = Arc::new(MemoryStore::new(None));
        let locks = Arc::new(MemoryLockService::new());
        // The oracle's client points at a dead port; tests that need a
        // price seed the sample cache instead.
        let pool = ProviderPool::from_config(
            &[ProviderConfig {
                name: "test".into(),
                url: "http://127.0.0.1:9".into(),
                priority: 0,
            }],
            &FailoverConfig::default(),
        )
        .unwrap();
        let rpc = Arc::new(RpcClient::new(Arc::new(pool), &ChainConfig::default()));
        let oracle = Arc::new(GasOracle::new(
            rpc,
            GasConfig {
                min_gwei: 3,
                max_gwei: 10,
                ..GasConfig::default()
            },
        ));
        let nonces = Arc::new(NonceCoordinator::new(
            Arc::new(FixedNonceSource(7)) as Arc<dyn AccountNonceSource>,
            Arc::clone(&store) as Arc<dyn SettlementStore>,
            Arc::clone(&locks) as Arc<dyn LockService>,
            &NonceConfig::default(),
        ));
        let issuer = TransactionIssuer::new(
            Arc::clone(&chain) as Arc<dyn ChainAccess>,
            Arc::clone(&oracle),
            nonces,
            Arc::new(EnvKeyVault::new()) as Arc<dyn KeyVault>,
            Arc::clone(&store) as Arc<dyn SettlementStore>,
            locks as Arc<dyn LockService>,
            config,
            &ChainConfig::default(),
            vec![output_wallet()],
            vec![usdt()],
        );
        Harness {
            chain,
            store,
            oracle,
            issuer,
        }
    }

    fn submitted_record() -> PendingTransaction {
        PendingTransaction {
            id: TransactionId::new(),
            wallet: DEV_ADDR.parse().unwrap(),
            nonce: 7,
            recipient: Address::ZERO,
            amount: U256::from(1_000_000u64),
            token: "USDT".into(),
            gas_price: 5_000_000_000,
            gas_limit: 60_000,
            tx_hash: TxHash::repeat_byte(0xaa),
            status: TxStatus::Submitted,
            submitted_at_ms: 1_000,
            rebroadcast_count: 0,
        }
    }

    /// Rewind the submission timestamp so the next sweep sees the
    /// record again without waiting out the threshold.
    fn age(store: &MemoryStore, id: TransactionId) {
        let mut record = store.pending(id).unwrap();
        record.submitted_at_ms = 1_000;
        store.put_pending(&record);
    }

    #[tokio::test]
    async fn test_stuck_payout_rebroadcast_until_budget_exhausted() {
        let h = harness(IssuerConfig {
            stuck_after_secs: 0,
            max_rebroadcasts: 3,
            bump_multiplier: 1.2,
            ..IssuerConfig::default()
        });
        let record = submitted_record();
        let id = record.id;
        h.store.put_pending(&record);

        // No receipt ever appears; each sweep bumps 1.2x from 5 gwei.
        let expected_prices = [6_000_000_000u128, 7_200_000_000, 8_640_000_000];
        for (attempt, expected) in expected_prices.iter().enumerate() {
            let report = h.issuer.sweep_stuck().await.unwrap();
            assert_eq!(report.rebroadcast, 1, "sweep {attempt}");
            let current = h.store.pending(id).unwrap();
            assert_eq!(current.status, TxStatus::Rebroadcast);
            assert_eq!(current.gas_price, *expected);
            assert_eq!(current.rebroadcast_count, attempt as u32 + 1);
            age(&h.store, id);
        }

        // Budget exhausted: the record fails permanently.
        let report = h.issuer.sweep_stuck().await.unwrap();
        assert_eq!(report.rebroadcast, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(h.store.pending(id).unwrap().status, TxStatus::Failed);
        assert!(h.store.sweepable_before(now_ms() + 1_000).is_empty());
    }

    #[tokio::test]
    async fn test_transient_rebroadcast_failure_keeps_record_in_sweep() {
        let h = harness(IssuerConfig {
            stuck_after_secs: 0,
            ..IssuerConfig::default()
        });
        let record = submitted_record();
        let id = record.id;
        h.store.put_pending(&record);

        h.chain.fail_broadcast.store(true, Ordering::SeqCst);
        let report = h.issuer.sweep_stuck().await.unwrap();
        assert_eq!(report.rebroadcast, 0);
        assert_eq!(report.failed, 0);
        assert_eq!(h.store.pending(id).unwrap().status, TxStatus::Stuck);
        // The stored record must come back as a candidate next pass.
        assert_eq!(h.store.sweepable_before(now_ms()).len(), 1);

        h.chain.fail_broadcast.store(false, Ordering::SeqCst);
        let report = h.issuer.sweep_stuck().await.unwrap();
        assert_eq!(report.rebroadcast, 1);
        assert_eq!(h.store.pending(id).unwrap().status, TxStatus::Rebroadcast);
    }

    #[tokio::test]
    async fn test_mined_record_tracked_until_confirmation_depth() {
        let h = harness(IssuerConfig::default());
        let mut record = submitted_record();
        record.status = TxStatus::Mined;
        let id = record.id;
        h.store.put_pending(&record);

        *h.chain.mined_block.lock().unwrap() = Some(100);
        h.chain.head.store(101, Ordering::SeqCst);

        // Two confirmations out of three: still mined, still tracked.
        let report = h.issuer.sweep_stuck().await.unwrap();
        assert_eq!(report.confirmed, 0);
        assert_eq!(h.store.pending(id).unwrap().status, TxStatus::Mined);
        assert_eq!(h.store.sweepable_before(now_ms()).len(), 1);

        h.chain.head.store(102, Ordering::SeqCst);
        let report = h.issuer.sweep_stuck().await.unwrap();
        assert_eq!(report.confirmed, 1);
        assert_eq!(h.store.pending(id).unwrap().status, TxStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_unresolvable_broadcast_holds_nonce_for_sweep() {
        let h = harness(IssuerConfig::default());
        h.oracle.prime_sample(5_000_000_000).await;
        h.chain.fail_broadcast.store(true, Ordering::SeqCst);
        h.chain.fail_lookup.store(true, Ordering::SeqCst);

        let wallet = output_wallet();
        let err = h
            .issuer
            .request_payout(&wallet, Address::ZERO, U256::from(1_000_000u64), &usdt())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::Rpc(_)));

        // The nonce stays burned and the record stays visible to the
        // sweep; reusing the nonce here could double-spend.
        assert_eq!(h.store.committed_nonce(wallet.address), Some(7));
        let tracked = h.store.sweepable_before(now_ms() + 1_000);
        assert_eq!(tracked.len(), 1);
        assert_eq!(tracked[0].status, TxStatus::Submitted);
        assert_eq!(tracked[0].nonce, 7);
    }

    #[tokio::test]
    async fn test_rejected_broadcast_releases_nonce() {
        let h = harness(IssuerConfig::default());
        h.oracle.prime_sample(5_000_000_000).await;
        h.chain.fail_broadcast.store(true, Ordering::SeqCst);
        // Lookup works and confirms the chain never saw the payload.

        let wallet = output_wallet();
        let err = h
            .issuer
            .request_payout(&wallet, Address::ZERO, U256::from(1_000_000u64), &usdt())
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::SubmissionRejected(_)));

        assert_eq!(h.store.committed_nonce(wallet.address), None);
        assert!(h.store.sweepable_before(now_ms() + 1_000).is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_error_with_known_hash_counts_as_submitted() {
        let h = harness(IssuerConfig::default());
        h.oracle.prime_sample(5_000_000_000).await;
        h.chain.fail_broadcast.store(true, Ordering::SeqCst);
        h.chain.knows.store(true, Ordering::SeqCst);

        let wallet = output_wallet();
        let id = h
            .issuer
            .request_payout(&wallet, Address::ZERO, U256::from(1_000_000u64), &usdt())
            .await
            .unwrap();

        assert_eq!(h.store.pending(id).unwrap().status, TxStatus::Submitted);
        assert_eq!(h.store.committed_nonce(wallet.address), Some(7));
    }

    #[test]
    fn test_bump_below_cap() {
        // 5 gwei bumped by 1.2 is 6 gwei.
        let bumped = bump_gas_price(5_000_000_000, 1.2, 10_000_000_000);
        assert_eq!(bumped, 6_000_000_000);
    }

    #[test]
    fn test_bump_clamped_to_cap() {
        let bumped = bump_gas_price(9_000_000_000, 1.2, 10_000_000_000);
        assert_eq!(bumped, 10_000_000_000);
    }

    #[test]
    fn test_bump_at_cap_stays_at_cap() {
        let bumped = bump_gas_price(10_000_000_000, 1.2, 10_000_000_000);
        assert_eq!(bumped, 10_000_000_000);
    }

    #[test]
    fn test_stuck_threshold() {
        let submitted = 1_000_000;
        assert!(!is_stuck(submitted, submitted + 179_999, 180));
        assert!(is_stuck(submitted, submitted + 180_000, 180));
    }

    #[test]
    fn test_native_payout_request_shape() {
        let token = Token {
            symbol: "BNB".into(),
            address: None,
            decimals: 18,
        };
        let request = payout_request(Address::ZERO, Address::ZERO, U256::from(100), &token);
        assert_eq!(request.value, Some(U256::from(100)));
        assert!(request.input.input().is_none());
    }

    #[test]
    fn test_token_payout_request_shape() {
        let contract: Address = "0x55d398326f99059fF775485246999027B3197955"
            .parse()
            .unwrap();
        let token = Token {
            symbol: "USDT".into(),
            address: Some(contract),
            decimals: 18,
        };
        let recipient: Address = "0x00000000000000000000000000000000000000bb"
            .parse()
            .unwrap();
        let request = payout_request(Address::ZERO, recipient, U256::from(100), &token);

        assert!(request.value.is_none());
        let calldata = request.input.input().unwrap();
        // transfer(address,uint256) selector.
        assert_eq!(&calldata[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
    }
}

//! Top-level settlement service wiring.
//!
//! Builds the provider pool, RPC client, gas oracle, nonce coordinator,
//! issuer and verifier from one validated configuration, and exposes
//! the operations the daemon (or an embedding application) calls.

use std::sync::Arc;

use alloy::primitives::{Address, U256};

use crate::config::SettlementConfig;
use crate::error::{SettlementError, SettlementResult};
use crate::gas::GasOracle;
use crate::issuer::{ChainAccess, SweepReport, TransactionId, TransactionIssuer, TxStatus};
use crate::keys::{KeyVault, WalletRef, WalletRole};
use crate::nonce::NonceCoordinator;
use crate::rpc::{ProviderPool, RpcClient, Token};
use crate::scanner::{PaymentEvent, PaymentVerifier};
use crate::store::{LockService, SettlementStore};

/// The assembled settlement core.
pub struct SettlementService {
    issuer: TransactionIssuer,
    verifier: PaymentVerifier,
    rpc: Arc<RpcClient>,
    wallets: Vec<WalletRef>,
    tokens: Vec<Token>,
}

impl SettlementService {
    /// Wire the service from configuration and its three pluggable
    /// capabilities. Performs no network I/O.
    pub fn new(
        config: &SettlementConfig,
        store: Arc<dyn SettlementStore>,
        locks: Arc<dyn LockService>,
        vault: Arc<dyn KeyVault>,
    ) -> SettlementResult<Self> {
        let wallets = config
            .wallets
            .iter()
            .map(WalletRef::try_from)
            .collect::<SettlementResult<Vec<_>>>()?;
        let tokens = config
            .tokens
            .iter()
            .map(Token::try_from)
            .collect::<SettlementResult<Vec<_>>>()?;

        let pool = Arc::new(ProviderPool::from_config(
            &config.providers,
            &config.failover,
        )?);
        let rpc = Arc::new(RpcClient::new(pool, &config.chain));
        let oracle = Arc::new(GasOracle::new(Arc::clone(&rpc), config.gas.clone()));
        let nonces = Arc::new(NonceCoordinator::new(
            Arc::clone(&rpc) as Arc<dyn crate::nonce::AccountNonceSource>,
            Arc::clone(&store),
            Arc::clone(&locks),
            &config.nonce,
        ));

        let issuer = TransactionIssuer::new(
            Arc::clone(&rpc) as Arc<dyn ChainAccess>,
            oracle,
            nonces,
            vault,
            Arc::clone(&store),
            Arc::clone(&locks),
            config.issuer.clone(),
            &config.chain,
            wallets.clone(),
            tokens.clone(),
        );
        let verifier = PaymentVerifier::new(
            Arc::clone(&rpc),
            store,
            locks,
            config.scanner.clone(),
        );

        Ok(Self {
            issuer,
            verifier,
            rpc,
            wallets,
            tokens,
        })
    }

    /// Confirm the connected chain matches the configured chain ID.
    pub async fn verify_chain(&self) -> SettlementResult<()> {
        self.rpc.verify_chain_id().await
    }

    pub fn rpc(&self) -> &Arc<RpcClient> {
        &self.rpc
    }

    /// Issue a payout from a configured output wallet.
    pub async fn request_payout(
        &self,
        wallet: Address,
        recipient: Address,
        amount: U256,
        token: &str,
    ) -> SettlementResult<TransactionId> {
        let wallet = self.wallet(wallet)?;
        let token = self.token(token)?;
        self.issuer.request_payout(wallet, recipient, amount, token).await
    }

    /// Current lifecycle status of an outbound transaction.
    pub async fn transaction_status(&self, id: TransactionId) -> SettlementResult<TxStatus> {
        self.issuer.transaction_status(id).await
    }

    /// Run one incoming-payment scan for a (wallet, token) pair.
    pub async fn verify_incoming(
        &self,
        wallet: Address,
        token: &str,
    ) -> SettlementResult<Vec<PaymentEvent>> {
        let token = self.token(token)?;
        self.verifier.scan(wallet, token).await
    }

    /// Sweep in-flight transactions for confirmations and stuck ones.
    pub async fn sweep_stuck(&self) -> SettlementResult<SweepReport> {
        self.issuer.sweep_stuck().await
    }

    /// All configured wallets watched for incoming payments.
    pub fn watched_wallets(&self) -> Vec<&WalletRef> {
        self.wallets
            .iter()
            .filter(|w| {
                matches!(
                    w.role,
                    WalletRole::Input | WalletRole::AuthorizationReceiving
                )
            })
            .collect()
    }

    /// All configured tokens with a contract address (scannable).
    pub fn scannable_tokens(&self) -> Vec<&Token> {
        self.tokens.iter().filter(|t| !t.is_native()).collect()
    }

    fn wallet(&self, address: Address) -> SettlementResult<&WalletRef> {
        self.wallets
            .iter()
            .find(|w| w.address == address)
            .ok_or_else(|| SettlementError::Wallet(format!("no configured wallet {address}")))
    }

    fn token(&self, symbol: &str) -> SettlementResult<&Token> {
        self.tokens
            .iter()
            .find(|t| t.symbol == symbol)
            .ok_or_else(|| SettlementError::Config(format!("no configured token '{symbol}'")))
    }
}

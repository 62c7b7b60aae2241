//! Wallet roles and scoped signing-key access.
//!
//! # Responsibilities
//! - Model the three wallet roles and which of them may ever sign
//! - Fetch decrypted key material only inside a signing call, scrub it
//!   on every exit path, and never expose it outside this module
//! - Verify the decrypted key actually controls the configured address
//!   before anything is signed with it
//!
//! # Design Decisions
//! - `SecretKeyMaterial` zeroizes on drop and has no `Debug`/`Display`,
//!   so key bytes cannot leak through logs or error messages
//! - The vault is a trait; the in-tree implementation reads from the
//!   environment, production deployments plug in a real KMS

use std::sync::Arc;

use alloy::consensus::TxEnvelope;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::Address;
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::WalletConfig;
use crate::error::{SettlementError, SettlementResult};

/// What a wallet is for. Only output wallets ever sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WalletRole {
    /// Receives customer deposits; watched by the payment verifier.
    Input,
    /// Signs and funds outbound payouts.
    OutputSigning,
    /// Receives authorization transfers; watched, never signs.
    AuthorizationReceiving,
}

impl WalletRole {
    pub fn may_sign(&self) -> bool {
        matches!(self, WalletRole::OutputSigning)
    }
}

/// A configured wallet with its role and optional key reference.
#[derive(Debug, Clone)]
pub struct WalletRef {
    pub address: Address,
    pub role: WalletRole,
    /// Opaque reference into the key vault; present only for
    /// output-signing wallets.
    pub key_ref: Option<String>,
}

impl TryFrom<&WalletConfig> for WalletRef {
    type Error = SettlementError;

    fn try_from(config: &WalletConfig) -> Result<Self, Self::Error> {
        let address: Address = config.address.parse().map_err(|e| {
            SettlementError::Config(format!("invalid wallet address '{}': {}", config.address, e))
        })?;
        let role = match config.role.as_str() {
            "input" => WalletRole::Input,
            "output" => WalletRole::OutputSigning,
            "authorization" => WalletRole::AuthorizationReceiving,
            other => {
                return Err(SettlementError::Config(format!(
                    "unknown wallet role '{other}'"
                )))
            }
        };
        Ok(Self {
            address,
            role,
            key_ref: config.key_ref.clone(),
        })
    }
}

/// Decrypted private-key bytes, scrubbed on drop.
///
/// Deliberately has no `Debug`, `Display`, `Clone` or serde impls.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKeyMaterial(Vec<u8>);

impl SecretKeyMaterial {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Key-storage capability. Implementations hold keys encrypted at rest
/// and return decrypted material only on demand.
pub trait KeyVault: Send + Sync {
    /// Decrypt and return the key material behind a reference.
    fn decrypt(&self, key_ref: &str) -> SettlementResult<SecretKeyMaterial>;
}

/// Vault reading hex-encoded keys from environment variables named by
/// the key reference. Suitable for development and tests.
#[derive(Default)]
pub struct EnvKeyVault;

impl EnvKeyVault {
    pub fn new() -> Self {
        Self
    }
}

impl KeyVault for EnvKeyVault {
    fn decrypt(&self, key_ref: &str) -> SettlementResult<SecretKeyMaterial> {
        let mut encoded = std::env::var(key_ref)
            .map_err(|_| SettlementError::Wallet(format!("key reference '{key_ref}' not set")))?;
        let decoded = alloy::hex::decode(encoded.trim_start_matches("0x"))
            .map_err(|_| SettlementError::Wallet(format!("key reference '{key_ref}' is not hex")));
        encoded.zeroize();
        Ok(SecretKeyMaterial::new(decoded?))
    }
}

/// Sign a transaction request with a wallet's key.
///
/// The decrypted material lives only for the duration of this call and
/// is scrubbed on every path out, including errors. Non-signing roles
/// are refused before the vault is touched.
pub async fn sign_transaction(
    vault: &Arc<dyn KeyVault>,
    wallet: &WalletRef,
    request: TransactionRequest,
) -> SettlementResult<TxEnvelope> {
    if !wallet.role.may_sign() {
        return Err(SettlementError::Wallet(format!(
            "wallet {} has role {:?} and must never sign",
            wallet.address, wallet.role
        )));
    }
    let key_ref = wallet.key_ref.as_deref().ok_or_else(|| {
        SettlementError::Wallet(format!("wallet {} has no key reference", wallet.address))
    })?;

    let material = vault.decrypt(key_ref)?;
    let signer = PrivateKeySigner::from_slice(material.as_bytes())
        .map_err(|e| SettlementError::Wallet(format!("invalid key material: {e}")))?;
    drop(material);

    if signer.address() != wallet.address {
        return Err(SettlementError::Wallet(format!(
            "key behind '{key_ref}' does not control wallet {}",
            wallet.address
        )));
    }

    let signer_wallet = EthereumWallet::from(signer);
    request
        .build(&signer_wallet)
        .await
        .map_err(|e| SettlementError::Wallet(format!("signing failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::network::TransactionBuilder;
    use alloy::primitives::U256;

    // Well-known Anvil development key #0.
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDR: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn output_wallet(key_ref: &str) -> WalletRef {
        WalletRef {
            address: DEV_ADDR.parse().unwrap(),
            role: WalletRole::OutputSigning,
            key_ref: Some(key_ref.to_string()),
        }
    }

    fn transfer_request() -> TransactionRequest {
        TransactionRequest::default()
            .with_to(Address::ZERO)
            .with_value(U256::from(1_000u64))
            .with_nonce(0)
            .with_chain_id(31337)
            .with_gas_limit(21_000)
            .with_gas_price(5_000_000_000)
    }

    #[test]
    fn test_role_parsing() {
        let config = WalletConfig {
            address: DEV_ADDR.to_string(),
            role: "output".to_string(),
            key_ref: Some("KEY".to_string()),
        };
        let wallet = WalletRef::try_from(&config).unwrap();
        assert_eq!(wallet.role, WalletRole::OutputSigning);
        assert!(wallet.role.may_sign());

        let config = WalletConfig {
            address: DEV_ADDR.to_string(),
            role: "deposit".to_string(),
            key_ref: None,
        };
        assert!(WalletRef::try_from(&config).is_err());
    }

    #[tokio::test]
    async fn test_input_wallet_refused_before_vault_access() {
        let vault: Arc<dyn KeyVault> = Arc::new(EnvKeyVault::new());
        let wallet = WalletRef {
            address: DEV_ADDR.parse().unwrap(),
            role: WalletRole::Input,
            key_ref: Some("SETTLEMENT_TEST_UNSET_KEY".to_string()),
        };

        // Fails on the role, not on the missing env var.
        let err = sign_transaction(&vault, &wallet, transfer_request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must never sign"));
    }

    #[tokio::test]
    async fn test_sign_produces_envelope_with_known_hash() {
        std::env::set_var("SETTLEMENT_TEST_SIGN_KEY", DEV_KEY);
        let vault: Arc<dyn KeyVault> = Arc::new(EnvKeyVault::new());
        let wallet = output_wallet("SETTLEMENT_TEST_SIGN_KEY");

        let envelope = sign_transaction(&vault, &wallet, transfer_request())
            .await
            .unwrap();
        // The hash is known before broadcast.
        assert_ne!(*envelope.tx_hash(), alloy::primitives::TxHash::ZERO);
    }

    #[tokio::test]
    async fn test_address_mismatch_refused() {
        std::env::set_var("SETTLEMENT_TEST_MISMATCH_KEY", DEV_KEY);
        let vault: Arc<dyn KeyVault> = Arc::new(EnvKeyVault::new());
        let mut wallet = output_wallet("SETTLEMENT_TEST_MISMATCH_KEY");
        wallet.address = Address::ZERO;

        let err = sign_transaction(&vault, &wallet, transfer_request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not control"));
    }
}

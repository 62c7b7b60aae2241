//! Chain-level shared types.

use alloy::primitives::Address;

use crate::config::TokenConfig;
use crate::error::{SettlementError, SettlementResult};

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// A token this deployment settles, resolved from configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Symbol used as the token identifier in records.
    pub symbol: String,
    /// Contract address; None for the chain's native token.
    pub address: Option<Address>,
    pub decimals: u8,
}

impl Token {
    /// Whether this is the chain's native token (no contract).
    pub fn is_native(&self) -> bool {
        self.address.is_none()
    }
}

impl TryFrom<&TokenConfig> for Token {
    type Error = SettlementError;

    fn try_from(config: &TokenConfig) -> SettlementResult<Self> {
        let address = match &config.address {
            Some(raw) => Some(raw.parse::<Address>().map_err(|e| {
                SettlementError::Config(format!("invalid token address '{}': {}", raw, e))
            })?),
            None => None,
        };
        Ok(Self {
            symbol: config.symbol.clone(),
            address,
            decimals: config.decimals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_id_conversion() {
        let chain_id = ChainId::from(56u64);
        assert_eq!(chain_id.0, 56);
        assert_eq!(u64::from(chain_id), 56);
    }

    #[test]
    fn test_token_from_config() {
        let config = TokenConfig {
            symbol: "USDT".into(),
            address: Some("0x55d398326f99059fF775485246999027B3197955".into()),
            decimals: 18,
        };
        let token = Token::try_from(&config).unwrap();
        assert!(!token.is_native());
        assert_eq!(token.decimals, 18);

        let native = TokenConfig {
            symbol: "BNB".into(),
            address: None,
            decimals: 18,
        };
        assert!(Token::try_from(&native).unwrap().is_native());
    }

    #[test]
    fn test_invalid_token_address_rejected() {
        let config = TokenConfig {
            symbol: "BAD".into(),
            address: Some("not-an-address".into()),
            decimals: 18,
        };
        assert!(Token::try_from(&config).is_err());
    }
}

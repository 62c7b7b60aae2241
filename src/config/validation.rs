//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (wallet roles vs key refs)
//! - Validate value ranges (thresholds > 0, min <= max)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: SettlementConfig -> Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use alloy::primitives::Address;

use crate::config::schema::SettlementConfig;

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(errors: &mut Vec<ValidationError>, field: &str, message: impl Into<String>) {
    errors.push(ValidationError {
        field: field.to_string(),
        message: message.into(),
    });
}

/// Validate a configuration, collecting every violation.
pub fn validate_config(config: &SettlementConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.providers.is_empty() {
        err(&mut errors, "providers", "at least one RPC provider is required");
    }
    for (i, provider) in config.providers.iter().enumerate() {
        if provider.name.is_empty() {
            err(&mut errors, &format!("providers[{}].name", i), "must not be empty");
        }
        if provider.url.parse::<url::Url>().is_err() {
            err(
                &mut errors,
                &format!("providers[{}].url", i),
                format!("invalid URL '{}'", provider.url),
            );
        }
    }

    if config.failover.failure_threshold == 0 {
        err(&mut errors, "failover.failure_threshold", "must be greater than zero");
    }

    if config.gas.min_gwei > config.gas.max_gwei {
        err(
            &mut errors,
            "gas.min_gwei",
            format!(
                "minimum {} exceeds maximum {}",
                config.gas.min_gwei, config.gas.max_gwei
            ),
        );
    }
    if config.gas.estimate_multiplier < 1.0 {
        err(&mut errors, "gas.estimate_multiplier", "must be at least 1.0");
    }

    if config.nonce.lease_ttl_secs == 0 {
        err(&mut errors, "nonce.lease_ttl_secs", "must be greater than zero");
    }
    if config.nonce.acquire_timeout_secs == 0 {
        err(&mut errors, "nonce.acquire_timeout_secs", "must be greater than zero");
    }

    if config.issuer.bump_multiplier <= 1.0 {
        err(&mut errors, "issuer.bump_multiplier", "must be greater than 1.0");
    }

    if config.scanner.chunk_blocks == 0 {
        err(&mut errors, "scanner.chunk_blocks", "must be greater than zero");
    }

    for (i, token) in config.tokens.iter().enumerate() {
        if token.symbol.is_empty() {
            err(&mut errors, &format!("tokens[{}].symbol", i), "must not be empty");
        }
        if let Some(addr) = &token.address {
            if addr.parse::<Address>().is_err() {
                err(
                    &mut errors,
                    &format!("tokens[{}].address", i),
                    format!("invalid address '{}'", addr),
                );
            }
        }
    }

    for (i, wallet) in config.wallets.iter().enumerate() {
        if wallet.address.parse::<Address>().is_err() {
            err(
                &mut errors,
                &format!("wallets[{}].address", i),
                format!("invalid address '{}'", wallet.address),
            );
        }
        match wallet.role.as_str() {
            "input" => {
                // Input wallets never hold decryptable key material here.
                if wallet.key_ref.is_some() {
                    err(
                        &mut errors,
                        &format!("wallets[{}].key_ref", i),
                        "input wallets must not reference key material",
                    );
                }
            }
            "output" => {
                if wallet.key_ref.is_none() {
                    err(
                        &mut errors,
                        &format!("wallets[{}].key_ref", i),
                        "output wallets require a key reference",
                    );
                }
            }
            "authorization" => {}
            other => {
                err(
                    &mut errors,
                    &format!("wallets[{}].role", i),
                    format!("unknown role '{}'", other),
                );
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Shared fixtures for integration tests.

use alloy::primitives::{Address, TxHash, U256};

use settlement_core::scanner::PaymentEvent;

/// Deterministic test addresses.
pub fn wallet_a() -> Address {
    "0x00000000000000000000000000000000000000a1"
        .parse()
        .unwrap()
}

pub fn wallet_b() -> Address {
    "0x00000000000000000000000000000000000000b2"
        .parse()
        .unwrap()
}

/// A payment event with a fixed identity, for dedupe tests.
pub fn payment(tx_hash_byte: u8, log_index: u64, wallet: Address) -> PaymentEvent {
    PaymentEvent {
        tx_hash: TxHash::repeat_byte(tx_hash_byte),
        log_index,
        from: wallet_b(),
        amount: U256::from(1_000_000u64),
        token: "USDT".to_string(),
        wallet,
        block_number: 1_000,
        processed_at_ms: 0,
    }
}

//! Deterministic genesis state: one block minting the initial grant to the
//! first accounts derived from the devnet mnemonic.

use super::chain::{Block, ZERO_HASH};
use super::state::Account;
use crate::crypto::{Address, ZERO_ADDRESS};
use crate::economics::genesis_grant;
use crate::error::Result;
use crate::hdwallet::{derive_address, DEVNET_MNEMONIC};
use crate::transaction::Transaction;
use num_bigint::BigUint;
use tracing::debug;

pub const GENESIS_TIMESTAMP: i64 = 1_767_441_600;

/// Number of funded accounts.
pub const GENESIS_ACCOUNTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Genesis {
    pub block: Block,
    pub transactions: Vec<Transaction>,
    pub accounts: Vec<Account>,
}

impl Genesis {
    pub fn devnet() -> Result<Self> {
        Self::from_mnemonic(DEVNET_MNEMONIC, GENESIS_ACCOUNTS)
    }

    pub fn from_mnemonic(mnemonic: &str, count: u32) -> Result<Self> {
        let mut allocations = Vec::with_capacity(count as usize);
        for index in 0..count {
            let address = derive_address(mnemonic, index)?;
            debug!(index, address = %hex::encode(address), "Genesis account");
            allocations.push((address, genesis_grant(index)));
        }
        Ok(Self::with_allocations(&allocations))
    }

    /// Genesis minting `balance` to each `address`, in the given order.
    pub fn with_allocations(allocations: &[(Address, BigUint)]) -> Self {
        // Mints carry no signature and come from the zero address.
        let transactions: Vec<Transaction> = allocations
            .iter()
            .map(|(address, balance)| Transaction::new(ZERO_ADDRESS, *address, 0, balance.clone()))
            .collect();
        let accounts = allocations
            .iter()
            .map(|(address, balance)| Account {
                address: *address,
                nonce: 0,
                balance: balance.clone(),
            })
            .collect();

        let block = Block::with_timestamp(
            0,
            GENESIS_TIMESTAMP,
            ZERO_HASH,
            ZERO_ADDRESS,
            transactions.iter().map(|tx| tx.hash).collect(),
        );

        Genesis {
            block,
            transactions,
            accounts,
        }
    }
}

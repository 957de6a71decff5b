use crate::crypto::{self, Address};
use crate::economics::format_amount;
use crate::error::Result;
use num_bigint::BigUint;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Account {
    pub address: Address,
    pub nonce: u64,
    pub balance: BigUint,
}

impl Account {
    /// The implicit state of an address with no history.
    pub fn empty(address: Address) -> Self {
        Account {
            address,
            nonce: 0,
            balance: BigUint::default(),
        }
    }

    pub fn to_info(&self) -> AccountInfo {
        AccountInfo {
            address: crypto::address_to_hex(&self.address),
            nonce: self.nonce,
            balance: format_amount(&self.balance),
            balance_raw: self.balance.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AccountInfo {
    pub address: String,
    pub nonce: u64,
    /// Human readable, e.g. `60 MONO`
    pub balance: String,
    /// Base units, decimal
    pub balance_raw: String,
}

/// Read access to committed account state.
pub trait AccountReader {
    /// Never fails for unknown addresses; those read as [`Account::empty`].
    fn get_account(&self, address: &Address) -> Result<Account>;
}

/// Per-batch working copy of the accounts touched so far.
///
/// Each account is copied out of the reader on first touch and only the copy
/// is mutated afterwards.
#[derive(Debug, Default)]
pub struct AccountOverlay {
    accounts: HashMap<Address, Account>,
}

impl AccountOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn account<R: AccountReader + ?Sized>(
        &mut self,
        reader: &R,
        address: &Address,
    ) -> Result<&mut Account> {
        match self.accounts.entry(*address) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let account = reader.get_account(address)?;
                Ok(entry.insert(account))
            }
        }
    }

    /// Touched accounts ordered by address.
    pub fn into_accounts(self) -> Vec<Account> {
        let mut accounts: Vec<Account> = self.accounts.into_values().collect();
        accounts.sort_by(|a, b| a.address.cmp(&b.address));
        accounts
    }
}

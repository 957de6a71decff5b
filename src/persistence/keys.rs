//! Key layout and value codec of the `kv` table.
//!
//! Every key starts with a one-byte prefix; heights are big-endian so the
//! height index sorts numerically.

use crate::blockchain::Sha256Hash;
use crate::crypto::Address;
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const HEIGHT_PREFIX: u8 = 0x00;
pub const ACCOUNT_PREFIX: u8 = 0x01;
pub const TRANSACTION_PREFIX: u8 = 0x02;
pub const BLOCK_PREFIX: u8 = 0x03;
pub const HEIGHT_INDEX_PREFIX: u8 = 0x0a;

/// Current chain height pointer.
pub fn height_key() -> Vec<u8> {
    vec![HEIGHT_PREFIX]
}

pub fn account_key(address: &Address) -> Vec<u8> {
    prefixed(ACCOUNT_PREFIX, address)
}

pub fn transaction_key(hash: &Sha256Hash) -> Vec<u8> {
    prefixed(TRANSACTION_PREFIX, hash)
}

pub fn block_key(hash: &Sha256Hash) -> Vec<u8> {
    prefixed(BLOCK_PREFIX, hash)
}

/// Height -> block hash.
pub fn height_index_key(height: u64) -> Vec<u8> {
    prefixed(HEIGHT_INDEX_PREFIX, &height.to_be_bytes())
}

fn prefixed(prefix: u8, rest: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + rest.len());
    key.push(prefix);
    key.extend_from_slice(rest);
    key
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    Ok(bincode::serialize(value)?)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

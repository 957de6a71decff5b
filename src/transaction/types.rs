/// Transaction types for Monochain
use crate::blockchain::Sha256Hash;
use crate::crypto::{self, Address, KeyPair};
use crate::economics::format_amount;
use crate::error::LedgerError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Maximum encoded transaction size in bytes to prevent DoS
pub const MAX_TRANSACTION_SIZE: usize = 4_096;

/// A value transfer between two accounts.
///
/// `hash` covers `from`, `nonce`, `to` and `value` only; the signature
/// authenticates that hash and `block_height` is assigned at commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: Sha256Hash,
    pub block_height: u64,
    pub from: Address,
    pub to: Address,
    pub nonce: u64,
    pub value: BigUint,
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Builds an unsigned transaction with its hash already computed.
    pub fn new(from: Address, to: Address, nonce: u64, value: BigUint) -> Self {
        let mut tx = Transaction {
            hash: [0u8; 32],
            block_height: 0,
            from,
            to,
            nonce,
            value,
            signature: Vec::new(),
        };
        tx.hash = tx.calculate_hash();
        tx
    }

    /// Builds and signs a transfer from `keypair`'s address.
    pub fn new_signed(
        keypair: &KeyPair,
        to: Address,
        nonce: u64,
        value: BigUint,
    ) -> Result<Self, LedgerError> {
        let mut tx = Self::new(keypair.address(), to, nonce, value);
        tx.sign(keypair)?;
        Ok(tx)
    }

    pub fn calculate_hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.from);
        hasher.update(self.nonce.to_be_bytes());
        hasher.update(self.to);
        hasher.update(self.value.to_bytes_be());
        hasher.finalize().into()
    }

    pub fn sign(&mut self, keypair: &KeyPair) -> Result<(), LedgerError> {
        self.hash = self.calculate_hash();
        self.signature = keypair.sign_digest(&self.hash)?;
        Ok(())
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash)
    }

    /// Stable binary encoding used on the wire and in storage.
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        bincode::serialize(self)
            .map_err(|e| LedgerError::InvalidArgument(format!("Serialization failed: {}", e)))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, LedgerError> {
        if bytes.len() > MAX_TRANSACTION_SIZE {
            return Err(LedgerError::InvalidArgument(format!(
                "Transaction too large: {} bytes (max: {})",
                bytes.len(),
                MAX_TRANSACTION_SIZE
            )));
        }
        let tx: Transaction = bincode::deserialize(bytes)
            .map_err(|e| LedgerError::InvalidArgument(format!("Malformed transaction: {}", e)))?;

        // The hash keys the mempool, so it must be the content digest.
        if tx.calculate_hash() != tx.hash {
            return Err(LedgerError::InvalidArgument(format!(
                "Transaction hash {} does not match its contents",
                tx.hash_str()
            )));
        }
        Ok(tx)
    }

    pub fn to_base64(&self) -> Result<String, LedgerError> {
        Ok(BASE64.encode(self.encode()?))
    }

    pub fn from_base64(encoded: &str) -> Result<Self, LedgerError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| LedgerError::InvalidArgument(format!("Invalid base64: {}", e)))?;
        Self::decode(&bytes)
    }

    pub fn to_info(&self) -> TransactionInfo {
        TransactionInfo {
            hash: hex::encode(self.hash),
            block_height: self.block_height,
            from: crypto::address_to_hex(&self.from),
            nonce: self.nonce,
            to: crypto::address_to_hex(&self.to),
            value: self.value.to_string(),
            signature: BASE64.encode(&self.signature),
        }
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Transaction{{hash: {}, block: {}, from: {}, nonce: {}, to: {}, value: {}}}",
            self.hash_str(),
            self.block_height,
            crypto::address_to_hex(&self.from),
            self.nonce,
            crypto::address_to_hex(&self.to),
            format_amount(&self.value),
        )
    }
}

/// JSON view of a transaction served over RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub hash: String,
    pub block_height: u64,
    pub from: String,
    pub nonce: u64,
    pub to: String,
    /// Base units, decimal
    pub value: String,
    /// Base64
    pub signature: String,
}

impl TransactionInfo {
    pub fn to_transaction(&self) -> Result<Transaction, LedgerError> {
        let value = self.value.parse::<BigUint>().map_err(|e| {
            LedgerError::InvalidArgument(format!("Invalid value {:?}: {}", self.value, e))
        })?;
        let signature = BASE64
            .decode(&self.signature)
            .map_err(|e| LedgerError::InvalidArgument(format!("Invalid signature encoding: {}", e)))?;

        Ok(Transaction {
            hash: crypto::hash_from_hex(&self.hash)?,
            block_height: self.block_height,
            from: crypto::address_from_hex(&self.from)?,
            to: crypto::address_from_hex(&self.to)?,
            nonce: self.nonce,
            value,
            signature,
        })
    }
}

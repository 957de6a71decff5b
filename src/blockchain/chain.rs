use crate::crypto::{self, Address, KeyPair};
use crate::error::{LedgerError, Result};
use crate::transaction::{Transaction, TransactionInfo};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::fmt;

pub type Sha256Hash = [u8; 32];

pub const ZERO_HASH: Sha256Hash = [0u8; 32];

/// Network identifier mixed into every block hash.
pub const CHAIN_ID: u64 = 21;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Block {
    pub chain_id: u64,
    pub hash: Sha256Hash,
    pub height: u64,
    /// Unix seconds
    pub timestamp: i64,
    pub prev_hash: Sha256Hash,
    pub validator: Address,
    pub signature: Vec<u8>,
    pub transactions: Vec<Sha256Hash>,
}

impl Block {
    /// Unsigned block stamped with the current time.
    pub fn new(
        height: u64,
        prev_hash: Sha256Hash,
        validator: Address,
        transactions: Vec<Sha256Hash>,
    ) -> Self {
        let timestamp = chrono::Utc::now().timestamp();
        Self::with_timestamp(height, timestamp, prev_hash, validator, transactions)
    }

    pub fn with_timestamp(
        height: u64,
        timestamp: i64,
        prev_hash: Sha256Hash,
        validator: Address,
        transactions: Vec<Sha256Hash>,
    ) -> Self {
        let mut block = Block {
            chain_id: CHAIN_ID,
            hash: ZERO_HASH,
            height,
            timestamp,
            prev_hash,
            validator,
            signature: Vec::new(),
            transactions,
        };
        block.hash = block.calculate_hash();
        block
    }

    pub fn calculate_hash(&self) -> Sha256Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.chain_id.to_be_bytes());
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update(self.prev_hash);
        hasher.update(self.validator);
        for tx_hash in &self.transactions {
            hasher.update(tx_hash);
        }
        hasher.finalize().into()
    }

    pub fn sign(&mut self, keypair: &KeyPair) -> Result<()> {
        self.hash = self.calculate_hash();
        self.signature = keypair.sign_digest(&self.hash)?;
        Ok(())
    }

    pub fn hash_str(&self) -> String {
        hex::encode(self.hash)
    }

    /// Checks the stored hash against the content and, above genesis, that the
    /// signature was produced by `validator`.
    pub fn verify_integrity(&self) -> Result<()> {
        if self.chain_id != CHAIN_ID {
            return Err(LedgerError::InvalidBlock(format!(
                "Block {} has chain id {}, expected {}",
                self.height, self.chain_id, CHAIN_ID
            )));
        }
        if self.calculate_hash() != self.hash {
            return Err(LedgerError::InvalidBlock(format!(
                "Block {} hash does not match its contents",
                self.height
            )));
        }
        if self.height == 0 {
            return Ok(());
        }

        let signer = crypto::recover_address(&self.hash, &self.signature)?;
        if signer != self.validator {
            return Err(LedgerError::InvalidBlock(format!(
                "Block {} was not signed by its validator {}",
                self.height,
                crypto::address_to_hex(&self.validator)
            )));
        }
        Ok(())
    }

    /// JSON view; `transactions` must be this block's transactions in order.
    pub fn to_info(&self, transactions: &[Transaction]) -> BlockInfo {
        BlockInfo {
            chain_id: self.chain_id,
            hash: self.hash_str(),
            height: self.height,
            timestamp: self.timestamp,
            prev_hash: hex::encode(self.prev_hash),
            validator: crypto::address_to_hex(&self.validator),
            signature: BASE64.encode(&self.signature),
            transactions: transactions.iter().map(Transaction::to_info).collect(),
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "Block{{height: {}, hash: {}, prev: {}, txs: {}}}",
            self.height,
            self.hash_str(),
            hex::encode(self.prev_hash),
            self.transactions.len()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockInfo {
    pub chain_id: u64,
    pub hash: String,
    pub height: u64,
    pub timestamp: i64,
    pub prev_hash: String,
    pub validator: String,
    pub signature: String,
    pub transactions: Vec<TransactionInfo>,
}

impl BlockInfo {
    /// Splits the view back into a block and its transactions.
    pub fn to_parts(&self) -> Result<(Block, Vec<Transaction>)> {
        let transactions = self
            .transactions
            .iter()
            .map(TransactionInfo::to_transaction)
            .collect::<Result<Vec<_>>>()?;

        let signature = BASE64.decode(&self.signature).map_err(|e| {
            LedgerError::InvalidArgument(format!("Invalid block signature encoding: {}", e))
        })?;

        let block = Block {
            chain_id: self.chain_id,
            hash: crypto::hash_from_hex(&self.hash)?,
            height: self.height,
            timestamp: self.timestamp,
            prev_hash: crypto::hash_from_hex(&self.prev_hash)?,
            validator: crypto::address_from_hex(&self.validator)?,
            signature,
            transactions: transactions.iter().map(|tx| tx.hash).collect(),
        };
        Ok((block, transactions))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockInfoList {
    pub count: usize,
    pub blocks: Vec<BlockInfo>,
}

impl BlockInfoList {
    pub fn new(blocks: Vec<BlockInfo>) -> Self {
        BlockInfoList {
            count: blocks.len(),
            blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::address_from_string;
    use num_bigint::BigUint;

    fn signed_block(keypair: &KeyPair, txs: &[Transaction]) -> Block {
        let hashes = txs.iter().map(|tx| tx.hash).collect();
        let mut block = Block::new(1, [9u8; 32], keypair.address(), hashes);
        block.sign(keypair).unwrap();
        block
    }

    #[test]
    fn test_hash_covers_chain_id_and_transactions() {
        let a = Block::with_timestamp(1, 100, ZERO_HASH, ZERO_HASH, vec![[1u8; 32]]);
        let b = Block::with_timestamp(1, 100, ZERO_HASH, ZERO_HASH, vec![[2u8; 32]]);
        assert_ne!(a.hash, b.hash);

        let mut c = a.clone();
        c.chain_id = 22;
        assert_ne!(c.calculate_hash(), a.hash);
    }

    #[test]
    fn test_signed_block_verifies() {
        let keypair = KeyPair::generate().unwrap();
        let block = signed_block(&keypair, &[]);
        assert!(block.verify_integrity().is_ok());
    }

    #[test]
    fn test_tampered_block_is_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let mut block = signed_block(&keypair, &[]);
        block.timestamp += 1;
        assert!(matches!(
            block.verify_integrity(),
            Err(LedgerError::InvalidBlock(_))
        ));
    }

    #[test]
    fn test_foreign_signature_is_rejected() {
        let keypair = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let mut block = signed_block(&keypair, &[]);
        block.signature = other.sign_digest(&block.hash).unwrap();
        assert!(block.verify_integrity().is_err());
    }

    #[test]
    fn test_info_converts_back() {
        let keypair = KeyPair::generate().unwrap();
        let mut tx = Transaction::new_signed(
            &keypair,
            address_from_string("bob"),
            0,
            BigUint::from(5u32),
        )
        .unwrap();
        tx.block_height = 1;
        let block = signed_block(&keypair, std::slice::from_ref(&tx));

        let (decoded, txs) = block.to_info(&[tx.clone()]).to_parts().unwrap();
        assert_eq!(decoded, block);
        assert_eq!(txs, vec![tx]);
    }
}

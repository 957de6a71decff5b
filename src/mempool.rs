//! Staging area for submitted transactions awaiting inclusion in a block.
//!
//! No validation happens here; the block producer filters every snapshot
//! through the verifier.

use crate::blockchain::Sha256Hash;
use crate::transaction::Transaction;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Mempool {
    pool: Mutex<HashMap<Sha256Hash, Transaction>>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `tx`, replacing any entry with the same hash.
    pub fn add(&self, tx: Transaction) {
        self.pool.lock().insert(tx.hash, tx);
    }

    /// Copy of all staged transactions ordered by (sender, nonce, hash).
    pub fn snapshot(&self) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = self.pool.lock().values().cloned().collect();
        txs.sort_by(|a, b| {
            a.from
                .cmp(&b.from)
                .then_with(|| a.nonce.cmp(&b.nonce))
                .then_with(|| a.hash.cmp(&b.hash))
        });
        txs
    }

    /// Drops the given hashes; unknown hashes are ignored.
    pub fn remove(&self, hashes: &[Sha256Hash]) {
        let mut pool = self.pool.lock();
        for hash in hashes {
            pool.remove(hash);
        }
    }

    pub fn contains(&self, hash: &Sha256Hash) -> bool {
        self.pool.lock().contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.pool.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{address_from_string, KeyPair};
    use num_bigint::BigUint;
    use std::sync::Arc;

    fn transfer(keypair: &KeyPair, nonce: u64) -> Transaction {
        Transaction::new_signed(
            keypair,
            address_from_string("bob"),
            nonce,
            BigUint::from(1u32),
        )
        .unwrap()
    }

    #[test]
    fn test_add_is_idempotent() {
        let mempool = Mempool::new();
        let keypair = KeyPair::generate().unwrap();
        let tx = transfer(&keypair, 0);

        mempool.add(tx.clone());
        mempool.add(tx.clone());

        assert_eq!(mempool.len(), 1);
        assert!(mempool.contains(&tx.hash));
    }

    #[test]
    fn test_snapshot_orders_by_sender_then_nonce() {
        let mempool = Mempool::new();
        let alice = KeyPair::generate().unwrap();
        let carol = KeyPair::generate().unwrap();

        for nonce in [2, 0, 1] {
            mempool.add(transfer(&alice, nonce));
            mempool.add(transfer(&carol, nonce));
        }

        let snapshot = mempool.snapshot();
        assert_eq!(snapshot.len(), 6);
        for pair in snapshot.windows(2) {
            assert!((pair[0].from, pair[0].nonce) < (pair[1].from, pair[1].nonce));
        }
        assert_eq!(snapshot, mempool.snapshot());
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mempool = Mempool::new();
        let keypair = KeyPair::generate().unwrap();
        mempool.add(transfer(&keypair, 0));

        let snapshot = mempool.snapshot();
        mempool.add(transfer(&keypair, 1));

        assert_eq!(snapshot.len(), 1);
        assert_eq!(mempool.len(), 2);
    }

    #[test]
    fn test_remove_ignores_unknown_hashes() {
        let mempool = Mempool::new();
        let keypair = KeyPair::generate().unwrap();
        let tx = transfer(&keypair, 0);
        mempool.add(tx.clone());

        mempool.remove(&[tx.hash, [9u8; 32]]);
        assert!(mempool.is_empty());
    }

    #[test]
    fn test_concurrent_adds() {
        let mempool = Arc::new(Mempool::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let mempool = Arc::clone(&mempool);
                std::thread::spawn(move || {
                    let keypair = KeyPair::generate().unwrap();
                    for nonce in 0..25 {
                        mempool.add(transfer(&keypair, nonce));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(mempool.len(), 100);
    }
}

/// Validation logic for transactions separated from type definitions
use crate::blockchain::{AccountOverlay, AccountReader, Sha256Hash};
use crate::crypto;
use crate::error::{LedgerError, Result};
use crate::transaction::types::Transaction;
use tracing::debug;

impl Transaction {
    /// Stateless check: the hash matches the content and the signature
    /// recovers to `from`.
    pub fn validate_signature(&self) -> Result<()> {
        if self.calculate_hash() != self.hash {
            return Err(LedgerError::InvalidSignature(format!(
                "Transaction {} hash does not match its contents",
                self.hash_str()
            )));
        }

        let signer = crypto::recover_address(&self.hash, &self.signature)?;
        if signer != self.from {
            return Err(LedgerError::InvalidSignature(format!(
                "Recovered signer {} does not match sender {}",
                crypto::address_to_hex(&signer),
                crypto::address_to_hex(&self.from)
            )));
        }
        Ok(())
    }

    /// Checks this transaction against the overlay and applies it on success.
    /// The overlay is left untouched when the transaction is rejected.
    fn apply<R: AccountReader + ?Sized>(
        &self,
        overlay: &mut AccountOverlay,
        reader: &R,
    ) -> Result<()> {
        self.validate_signature()?;

        if self.from == self.to {
            return Err(LedgerError::SelfTransfer(crypto::address_to_hex(&self.from)));
        }

        let sender = overlay.account(reader, &self.from)?;
        if sender.balance < self.value {
            return Err(LedgerError::InsufficientBalance {
                balance: sender.balance.clone(),
                required: self.value.clone(),
            });
        }
        if sender.nonce != self.nonce {
            return Err(LedgerError::NonceMismatch {
                expected: sender.nonce,
                got: self.nonce,
            });
        }

        // Load the recipient first so a failed read leaves the sender untouched.
        overlay.account(reader, &self.to)?;

        let sender = overlay.account(reader, &self.from)?;
        sender.balance -= &self.value;
        sender.nonce += 1;

        let recipient = overlay.account(reader, &self.to)?;
        recipient.balance += &self.value;
        Ok(())
    }
}

/// Result of virtually executing a batch.
#[derive(Debug, Default)]
pub struct VerificationOutcome {
    /// Valid transactions, in input order.
    pub accepted: Vec<Transaction>,
    pub rejected: Vec<(Sha256Hash, LedgerError)>,
}

/// Simulates `transactions` in order against committed state and returns the
/// subset that may be included in the next block.
///
/// Accounts are copied into a private overlay on first touch; `reader` is
/// never written to. Only rejections are collected; any other error, such as
/// a failed account read, aborts the whole batch.
pub fn verify_transactions<R: AccountReader + ?Sized>(
    transactions: &[Transaction],
    reader: &R,
) -> Result<VerificationOutcome> {
    let mut overlay = AccountOverlay::new();
    let mut outcome = VerificationOutcome::default();

    for tx in transactions {
        match tx.apply(&mut overlay, reader) {
            Ok(()) => outcome.accepted.push(tx.clone()),
            Err(e) if e.is_rejection() => {
                debug!(tx = %tx.hash_str(), error = %e, "Rejected transaction");
                outcome.rejected.push((tx.hash, e));
            }
            Err(e) => return Err(e),
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Account;
    use crate::crypto::{Address, KeyPair};
    use num_bigint::BigUint;
    use std::collections::HashMap;

    struct MapReader(HashMap<Address, Account>);

    impl AccountReader for MapReader {
        fn get_account(&self, address: &Address) -> Result<Account> {
            Ok(self
                .0
                .get(address)
                .cloned()
                .unwrap_or_else(|| Account::empty(*address)))
        }
    }

    struct FailingReader;

    impl AccountReader for FailingReader {
        fn get_account(&self, _address: &Address) -> Result<Account> {
            Err(LedgerError::Storage("disk unavailable".to_string()))
        }
    }

    fn funded(keypair: &KeyPair, balance: u64) -> MapReader {
        let address = keypair.address();
        let mut accounts = HashMap::new();
        accounts.insert(
            address,
            Account {
                address,
                nonce: 0,
                balance: BigUint::from(balance),
            },
        );
        MapReader(accounts)
    }

    fn transfer(keypair: &KeyPair, to: Address, nonce: u64, value: u64) -> Transaction {
        Transaction::new_signed(keypair, to, nonce, BigUint::from(value)).unwrap()
    }

    #[test]
    fn test_sequential_transfers_accepted() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap().address();
        let reader = funded(&alice, 100);

        let batch = vec![transfer(&alice, bob, 0, 30), transfer(&alice, bob, 1, 30)];
        let outcome = verify_transactions(&batch, &reader).unwrap();

        assert_eq!(outcome.accepted, batch);
        assert!(outcome.rejected.is_empty());
    }

    #[test]
    fn test_overdraft_rejected_within_batch() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap().address();
        let reader = funded(&alice, 100);

        let batch = vec![transfer(&alice, bob, 0, 60), transfer(&alice, bob, 1, 60)];
        let outcome = verify_transactions(&batch, &reader).unwrap();

        assert_eq!(outcome.accepted, vec![batch[0].clone()]);
        assert!(matches!(
            outcome.rejected[0].1,
            LedgerError::InsufficientBalance { .. }
        ));
    }

    #[test]
    fn test_nonce_gap_rejected() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap().address();
        let reader = funded(&alice, 100);

        let outcome = verify_transactions(&[transfer(&alice, bob, 1, 10)], &reader).unwrap();

        assert!(outcome.accepted.is_empty());
        assert_eq!(
            outcome.rejected[0].1,
            LedgerError::NonceMismatch { expected: 0, got: 1 }
        );
    }

    #[test]
    fn test_rejected_nonce_does_not_consume_balance() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap().address();
        let reader = funded(&alice, 100);

        let batch = vec![transfer(&alice, bob, 5, 90), transfer(&alice, bob, 0, 90)];
        let outcome = verify_transactions(&batch, &reader).unwrap();

        assert_eq!(outcome.accepted, vec![batch[1].clone()]);
    }

    #[test]
    fn test_self_transfer_rejected() {
        let alice = KeyPair::generate().unwrap();
        let reader = funded(&alice, 100);

        let outcome =
            verify_transactions(&[transfer(&alice, alice.address(), 0, 1)], &reader).unwrap();

        assert!(outcome.accepted.is_empty());
        assert!(matches!(outcome.rejected[0].1, LedgerError::SelfTransfer(_)));
    }

    #[test]
    fn test_forged_sender_rejected() {
        let alice = KeyPair::generate().unwrap();
        let mallory = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap().address();
        let reader = funded(&alice, 100);

        let mut forged = Transaction::new(alice.address(), bob, 0, BigUint::from(10u32));
        forged.signature = mallory.sign_digest(&forged.hash).unwrap();

        let outcome = verify_transactions(&[forged], &reader).unwrap();
        assert!(matches!(
            outcome.rejected[0].1,
            LedgerError::InvalidSignature(_)
        ));
    }

    #[test]
    fn test_altered_value_rejected() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap().address();
        let reader = funded(&alice, 100);

        let mut tx = transfer(&alice, bob, 0, 10);
        tx.value = BigUint::from(99u32);

        let outcome = verify_transactions(&[tx], &reader).unwrap();
        assert!(outcome.accepted.is_empty());
    }

    #[test]
    fn test_received_funds_spendable_in_same_batch() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap();
        let carol = KeyPair::generate().unwrap().address();
        let reader = funded(&alice, 100);

        let batch = vec![
            transfer(&alice, bob.address(), 0, 50),
            transfer(&bob, carol, 0, 20),
        ];
        let outcome = verify_transactions(&batch, &reader).unwrap();

        assert_eq!(outcome.accepted.len(), 2);
    }

    #[test]
    fn test_read_failure_aborts_batch() {
        let alice = KeyPair::generate().unwrap();
        let bob = KeyPair::generate().unwrap().address();

        let result = verify_transactions(&[transfer(&alice, bob, 0, 1)], &FailingReader);
        assert!(matches!(result, Err(LedgerError::Storage(_))));
    }

    #[test]
    fn test_rejection_before_read_failure_still_aborts() {
        let alice = KeyPair::generate().unwrap();
        let batch = vec![
            transfer(&alice, alice.address(), 0, 1),
            transfer(&alice, KeyPair::generate().unwrap().address(), 0, 1),
        ];

        assert!(verify_transactions(&batch, &FailingReader).is_err());
    }
}

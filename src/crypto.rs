//! Cryptographic primitives for Monochain

use crate::error::LedgerError;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::{
    constants::{PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::{RecoverableSignature, RecoveryId},
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Account address: SHA-256 of the compressed public key.
pub type Address = [u8; 32];

/// Address used as the sender of genesis mints and as the genesis validator.
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// Compact signature (64 bytes) followed by the recovery id.
pub const SIGNATURE_SIZE: usize = 65;

/// Convenience function to create an address from a string (hashes the string).
/// Useful for testing and debugging.
pub fn address_from_string(s: &str) -> Address {
    Sha256::digest(s.as_bytes()).into()
}

/// Convert an address to a hex string for display.
pub fn address_to_hex(addr: &Address) -> String {
    hex::encode(addr)
}

/// Convert a hex string (optionally `0x`-prefixed) to an address.
pub fn address_from_hex(hex_str: &str) -> Result<Address, LedgerError> {
    decode_32(hex_str).map_err(|e| LedgerError::InvalidArgument(format!("Invalid address: {}", e)))
}

/// Parse a 64-character hex digest.
pub fn hash_from_hex(hex_str: &str) -> Result<[u8; 32], LedgerError> {
    decode_32(hex_str).map_err(|e| LedgerError::InvalidArgument(format!("Invalid hash: {}", e)))
}

fn decode_32(hex_str: &str) -> Result<[u8; 32], String> {
    let trimmed = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let bytes = hex::decode(trimmed).map_err(|e| e.to_string())?;
    if bytes.len() != 32 {
        return Err(format!("expected 32 bytes, got {}", bytes.len()));
    }
    bytes
        .try_into()
        .map_err(|_| "failed to convert bytes".to_string())
}

fn public_key_to_address(public_key: &PublicKey) -> Address {
    let pubkey_bytes: [u8; PUBLIC_KEY_SIZE] = public_key.serialize();
    Sha256::digest(pubkey_bytes).into()
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Result<Self, LedgerError> {
        let secret_key = SecretKey::new(&mut OsRng);
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    /// Creates a KeyPair from raw secret key bytes.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, LedgerError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                LedgerError::Crypto(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                LedgerError::Crypto(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    pub fn address(&self) -> Address {
        public_key_to_address(&self.public_key)
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Signs a 32-byte digest and returns `compact || recovery_id`.
    ///
    /// The digest is signed as-is; callers pass transaction or block hashes.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, LedgerError> {
        let message = Message::from_digest(*digest);
        let signature = SECP256K1_CONTEXT.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let recovery_byte = u8::try_from(recovery_id.to_i32())
            .map_err(|_| LedgerError::Crypto("Recovery id out of range".to_string()))?;

        let mut bytes = Vec::with_capacity(SIGNATURE_SIZE);
        bytes.extend_from_slice(&compact);
        bytes.push(recovery_byte);
        Ok(bytes)
    }
}

/// Recovers the signer address of `digest` from a recoverable signature.
pub fn recover_address(digest: &[u8; 32], signature_bytes: &[u8]) -> Result<Address, LedgerError> {
    if signature_bytes.len() != SIGNATURE_SIZE {
        return Err(LedgerError::InvalidSignature(format!(
            "Signature must be exactly {} bytes, got {}",
            SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let recovery_id = RecoveryId::from_i32(i32::from(signature_bytes[64]))
        .map_err(|e| LedgerError::InvalidSignature(format!("Invalid recovery id: {}", e)))?;
    let signature = RecoverableSignature::from_compact(&signature_bytes[..64], recovery_id)
        .map_err(|e| LedgerError::InvalidSignature(format!("Malformed signature: {}", e)))?;

    let message = Message::from_digest(*digest);
    let public_key = SECP256K1_CONTEXT
        .recover_ecdsa(&message, &signature)
        .map_err(|e| LedgerError::InvalidSignature(format!("Recovery failed: {}", e)))?;

    Ok(public_key_to_address(&public_key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation() {
        let keypair = KeyPair::generate().unwrap();
        assert_eq!(keypair.public_key_bytes().len(), PUBLIC_KEY_SIZE);
        assert_eq!(keypair.secret_key.as_ref().len(), SECRET_KEY_SIZE);
    }

    #[test]
    fn test_address_generation() {
        let keypair = KeyPair::generate().unwrap();
        let address = keypair.address();
        assert_eq!(address_to_hex(&address).len(), 64);
        assert_eq!(address_from_hex(&address_to_hex(&address)).unwrap(), address);
    }

    #[test]
    fn test_sign_and_recover() {
        let keypair = KeyPair::generate().unwrap();
        let digest: [u8; 32] = Sha256::digest(b"Hello, Monochain!").into();

        let signature = keypair.sign_digest(&digest).unwrap();
        assert_eq!(signature.len(), SIGNATURE_SIZE);

        let recovered = recover_address(&digest, &signature).unwrap();
        assert_eq!(recovered, keypair.address());
    }

    #[test]
    fn test_tampered_digest_recovers_other_address() {
        let keypair = KeyPair::generate().unwrap();
        let digest: [u8; 32] = Sha256::digest(b"Original message").into();
        let tampered: [u8; 32] = Sha256::digest(b"Tampered message").into();

        let signature = keypair.sign_digest(&digest).unwrap();
        match recover_address(&tampered, &signature) {
            Ok(address) => assert_ne!(address, keypair.address()),
            Err(e) => assert!(matches!(e, LedgerError::InvalidSignature(_))),
        }
    }

    #[test]
    fn test_invalid_signature_length() {
        let keypair = KeyPair::generate().unwrap();
        let digest = [7u8; 32];
        let signature = keypair.sign_digest(&digest).unwrap();

        let result = recover_address(&digest, &signature[1..]);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Signature must be exactly"));
    }

    #[test]
    fn test_from_secret_bytes_invalid_length() {
        let short_bytes = [0u8; SECRET_KEY_SIZE - 1];
        let result = KeyPair::from_secret_bytes(&short_bytes);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Secret key must be"));
    }

    #[test]
    fn test_hex_parsing_accepts_prefix() {
        let hex_str = format!("0x{}", "ab".repeat(32));
        assert_eq!(hash_from_hex(&hex_str).unwrap(), [0xab; 32]);
        assert!(hash_from_hex("abcd").is_err());
    }
}

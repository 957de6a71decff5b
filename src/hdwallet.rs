//! HD key derivation (BIP-39 mnemonic, BIP-32 path `m/44'/60'/0'/0/{index}`)

use crate::crypto::{Address, KeyPair};
use crate::error::LedgerError;
use bip32::{DerivationPath, XPrv};
use bip39::Mnemonic;

/// Well-known devnet phrase. Genesis funds the first accounts derived from it.
pub const DEVNET_MNEMONIC: &str =
    "margin bounce nominee submit pupil duty bird daughter hotel onion wave write";

pub fn derivation_path(index: u32) -> String {
    format!("m/44'/60'/0'/0/{}", index)
}

/// Derives the signing key for `index` under the account-level path.
pub fn derive_keypair(mnemonic: &str, index: u32) -> Result<KeyPair, LedgerError> {
    let mnemonic = Mnemonic::parse(mnemonic)
        .map_err(|e| LedgerError::Crypto(format!("Invalid mnemonic: {}", e)))?;
    let seed = mnemonic.to_seed("");

    let path: DerivationPath = derivation_path(index)
        .parse()
        .map_err(|e| LedgerError::Crypto(format!("Invalid derivation path: {}", e)))?;
    let xprv = XPrv::derive_from_path(seed, &path)
        .map_err(|e| LedgerError::Crypto(format!("Key derivation failed: {}", e)))?;

    let secret: [u8; 32] = xprv.to_bytes();
    KeyPair::from_secret_bytes(&secret)
}

pub fn derive_address(mnemonic: &str, index: u32) -> Result<Address, LedgerError> {
    Ok(derive_keypair(mnemonic, index)?.address())
}

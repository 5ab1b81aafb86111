//! BIP-39 mnemonic handling and wallet-id derivation.
//!
//! The mnemonic and seed only ever live inside zeroizing buffers; callers
//! hold them for the duration of a flow and drop them on every exit path.

use bip39::{Language, Mnemonic};
use zeroize::Zeroizing;

use crate::hash::sha256d;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnemonicError {
    /// Entropy must be 16, 24 or 32 bytes.
    InvalidEntropyLength,
    /// Unknown word or bad checksum.
    InvalidPhrase,
}

impl core::fmt::Display for MnemonicError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MnemonicError::InvalidEntropyLength => write!(f, "Invalid entropy length"),
            MnemonicError::InvalidPhrase => write!(f, "Invalid mnemonic phrase"),
        }
    }
}

/// Builds the 12/18/24-word phrase for 16/24/32 bytes of entropy.
pub fn phrase_from_entropy(entropy: &[u8]) -> Result<Zeroizing<String>, MnemonicError> {
    if !matches!(entropy.len(), 16 | 24 | 32) {
        return Err(MnemonicError::InvalidEntropyLength);
    }
    let mnemonic = Mnemonic::from_entropy_in(Language::English, entropy)
        .map_err(|_| MnemonicError::InvalidEntropyLength)?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Recovers the entropy from a user-entered phrase.
pub fn entropy_from_phrase(phrase: &str) -> Result<Zeroizing<Vec<u8>>, MnemonicError> {
    let mnemonic = parse(phrase)?;
    Ok(Zeroizing::new(mnemonic.to_entropy()))
}

/// BIP-39 seed: PBKDF2-HMAC-SHA512, 2048 rounds, salt `"mnemonic" || passphrase`.
pub fn seed_from_phrase(
    phrase: &str,
    passphrase: &str,
) -> Result<Zeroizing<[u8; 64]>, MnemonicError> {
    let mnemonic = parse(phrase)?;
    Ok(Zeroizing::new(mnemonic.to_seed(passphrase)))
}

/// The device-wide wallet handle: double SHA-256 of the space-joined phrase.
pub fn wallet_id(phrase: &str) -> Result<[u8; 32], MnemonicError> {
    let mnemonic = parse(phrase)?;
    Ok(sha256d(mnemonic.to_string().as_bytes()))
}

pub fn word_count(phrase: &str) -> Result<usize, MnemonicError> {
    Ok(parse(phrase)?.word_count())
}

fn parse(phrase: &str) -> Result<Mnemonic, MnemonicError> {
    Mnemonic::parse_in_normalized(Language::English, phrase)
        .map_err(|_| MnemonicError::InvalidPhrase)
}

//! PIN-based share wrapping.
//!
//! When a wallet has a PIN, every share's `y` is AES-128-CBC encrypted
//! under `K = SHA-256(PIN)[..16]` with a fresh random IV, and a 16-byte
//! `HMAC-SHA-256(K, x || iv || ciphertext)` tag rides alongside. The unwrap
//! key is derived on demand and never persisted.

use subtle::ConstantTimeEq;
use x1_common::types::{EncryptionHeader, Share};
use x1_common::Error;
use x1_sdk::cipher::{aes128_cbc_decrypt, aes128_cbc_encrypt, pad_iso9797_m2, unpad_iso9797_m2};
use x1_sdk::hash::{hmac_sha256, sha256};
use x1_sdk::rand::Drbg;
use zeroize::Zeroizing;

/// Share-wrap key derived from the PIN.
pub fn pin_key(pin: &str) -> Zeroizing<[u8; 16]> {
    let digest = Zeroizing::new(sha256(pin.as_bytes()));
    let mut key = Zeroizing::new([0u8; 16]);
    key.copy_from_slice(&digest[..16]);
    key
}

fn share_mac(key: &[u8; 16], x: u8, iv: &[u8; 16], ciphertext: &[u8]) -> [u8; 16] {
    let mut preimage = Vec::with_capacity(1 + 16 + ciphertext.len());
    preimage.push(x);
    preimage.extend_from_slice(iv);
    preimage.extend_from_slice(ciphertext);
    let digest = hmac_sha256(key, &preimage);
    digest[..16].try_into().unwrap()
}

/// Encrypts a plain share in place.
pub fn wrap_share(share: &mut Share, key: &[u8; 16], rng: &mut Drbg) {
    debug_assert!(share.header.is_none());

    let mut iv = [0u8; 16];
    rng.fill(&mut iv);

    let mut padded = share.y.clone();
    pad_iso9797_m2(&mut padded);
    let ciphertext =
        aes128_cbc_encrypt(key, &iv, &padded).expect("padded share is block aligned");
    let mac = share_mac(key, share.x, &iv, &ciphertext);

    share.y = ciphertext;
    share.header = Some(EncryptionHeader { iv, mac });
}

/// Verifies the MAC and decrypts a wrapped share in place.
///
/// Rejecting before decryption means a tampered ciphertext (or a wrong PIN)
/// never reaches the interpolator.
pub fn unwrap_share(share: &mut Share, key: &[u8; 16]) -> Result<(), Error> {
    let header = share.header.ok_or(Error::ShareMacInvalid)?;

    let expected = share_mac(key, share.x, &header.iv, &share.y);
    if expected[..].ct_eq(&header.mac[..]).unwrap_u8() == 0 {
        return Err(Error::ShareMacInvalid);
    }

    let mut plain =
        aes128_cbc_decrypt(key, &header.iv, &share.y).map_err(|_| Error::ShareMacInvalid)?;
    unpad_iso9797_m2(&mut plain).map_err(|_| Error::ShareMacInvalid)?;

    share.y = plain;
    share.header = None;
    Ok(())
}

//! AES-128-CBC, used for share wrapping and the encrypted card channel.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

pub const AES_BLOCK: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherError {
    /// Plaintext/ciphertext length is not a multiple of the block size.
    LengthNotAligned,
}

impl core::fmt::Display for CipherError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CipherError::LengthNotAligned => write!(f, "Data length is not block aligned"),
        }
    }
}

/// Encrypts block-aligned data.
pub fn aes128_cbc_encrypt(
    key: &[u8; 16],
    iv: &[u8; 16],
    plaintext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    if plaintext.len() % AES_BLOCK != 0 {
        return Err(CipherError::LengthNotAligned);
    }
    Ok(Aes128CbcEnc::new(key.into(), iv.into())
        .encrypt_padded_vec_mut::<NoPadding>(plaintext))
}

/// Decrypts block-aligned data.
pub fn aes128_cbc_decrypt(
    key: &[u8; 16],
    iv: &[u8; 16],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CipherError> {
    if ciphertext.len() % AES_BLOCK != 0 || ciphertext.is_empty() {
        return Err(CipherError::LengthNotAligned);
    }
    Aes128CbcDec::new(key.into(), iv.into())
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| CipherError::LengthNotAligned)
}

/// ISO/IEC 9797-1 method 2 padding (0x80 then zeros), used by the card
/// channel where payloads are not block aligned.
pub fn pad_iso9797_m2(data: &mut Vec<u8>) {
    data.push(0x80);
    while data.len() % AES_BLOCK != 0 {
        data.push(0x00);
    }
}

/// Removes method-2 padding; fails if no 0x80 marker is found.
pub fn unpad_iso9797_m2(data: &mut Vec<u8>) -> Result<(), CipherError> {
    while let Some(byte) = data.pop() {
        match byte {
            0x00 => continue,
            0x80 => return Ok(()),
            _ => break,
        }
    }
    Err(CipherError::LengthNotAligned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_nist_cbc_vector() {
        // NIST SP 800-38A F.2.1 (AES-128-CBC, first block)
        let key = hex!("2b7e151628aed2a6abf7158809cf4f3c");
        let iv = hex!("000102030405060708090a0b0c0d0e0f");
        let plaintext = hex!("6bc1bee22e409f96e93d7e117393172a");
        let ciphertext = aes128_cbc_encrypt(&key, &iv, &plaintext).unwrap();
        assert_eq!(ciphertext, hex!("7649abac8119b246cee98e9b12e9197d"));
        assert_eq!(
            aes128_cbc_decrypt(&key, &iv, &ciphertext).unwrap(),
            plaintext
        );
    }

    #[test]
    fn test_rejects_unaligned() {
        let key = [0u8; 16];
        let iv = [0u8; 16];
        assert_eq!(
            aes128_cbc_encrypt(&key, &iv, &[1, 2, 3]),
            Err(CipherError::LengthNotAligned)
        );
    }

    #[test]
    fn test_padding_roundtrip() {
        for len in [0usize, 1, 15, 16, 17, 31] {
            let mut data: Vec<u8> = (0..len as u8).collect();
            let original = data.clone();
            pad_iso9797_m2(&mut data);
            assert_eq!(data.len() % AES_BLOCK, 0);
            unpad_iso9797_m2(&mut data).unwrap();
            assert_eq!(data, original);
        }
    }
}

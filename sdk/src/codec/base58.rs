//! Base58 and base58check.
//!
//! The checked variants append/verify the first four bytes of a double
//! SHA-256 over the payload, as used by legacy Bitcoin addresses and
//! serialized extended keys.

use super::CodecError;
use crate::hash::sha256d;

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

// -1 for characters outside the alphabet, index otherwise. Built at compile
// time so decode stays a table lookup.
const REVERSE: [i8; 128] = build_reverse_table();

const fn build_reverse_table() -> [i8; 128] {
    let mut table = [-1i8; 128];
    let mut i = 0;
    while i < 58 {
        table[ALPHABET[i] as usize] = i as i8;
        i += 1;
    }
    table
}

pub fn encode(payload: &[u8]) -> String {
    // Leading zero bytes map one-to-one onto leading '1' characters.
    let zeros = payload.iter().take_while(|&&b| b == 0).count();

    // Repeated long division of the payload by 58.
    let mut digits: Vec<u8> = Vec::with_capacity(payload.len() * 138 / 100 + 1);
    for &byte in &payload[zeros..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    for _ in 0..zeros {
        out.push('1');
    }
    for &digit in digits.iter().rev() {
        out.push(ALPHABET[digit as usize] as char);
    }
    out
}

pub fn decode(s: &str) -> Result<Vec<u8>, CodecError> {
    let ones = s.bytes().take_while(|&b| b == b'1').count();

    let mut bytes: Vec<u8> = Vec::with_capacity(s.len());
    for ch in s.bytes().skip(ones) {
        let digit = *REVERSE
            .get(ch as usize)
            .ok_or(CodecError::InvalidEncoding)?;
        if digit < 0 {
            return Err(CodecError::InvalidEncoding);
        }
        let mut carry = digit as u32;
        for byte in bytes.iter_mut() {
            carry += (*byte as u32) * 58;
            *byte = (carry & 0xFF) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xFF) as u8);
            carry >>= 8;
        }
    }

    let mut out = vec![0u8; ones];
    out.extend(bytes.iter().rev());
    Ok(out)
}

pub fn encode_check(payload: &[u8]) -> String {
    let checksum = sha256d(payload);
    let mut buf = Vec::with_capacity(payload.len() + 4);
    buf.extend_from_slice(payload);
    buf.extend_from_slice(&checksum[..4]);
    encode(&buf)
}

pub fn decode_check(s: &str) -> Result<Vec<u8>, CodecError> {
    let mut data = decode(s)?;
    if data.len() < 4 {
        return Err(CodecError::Truncated);
    }
    let payload_len = data.len() - 4;
    let checksum = sha256d(&data[..payload_len]);
    if checksum[..4] != data[payload_len..] {
        return Err(CodecError::ChecksumMismatch);
    }
    data.truncate(payload_len);
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_encode_known_vectors() {
        assert_eq!(encode(b""), "");
        assert_eq!(encode(&hex!("00000000")), "1111");
        assert_eq!(encode(b"Hello World!"), "2NEpo7TZRRrLZSi2U");
        assert_eq!(
            encode(&hex!("0000287fb4cd")),
            "11233QC4"
        );
    }

    #[test]
    fn test_decode_roundtrip() {
        let data = hex!("00f54a5851e9372b87810a8e60cdd2e7cfd80b6e31");
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }

    #[test]
    fn test_decode_rejects_bad_characters() {
        assert_eq!(decode("0OIl"), Err(CodecError::InvalidEncoding));
        assert_eq!(decode("abc~"), Err(CodecError::InvalidEncoding));
    }

    #[test]
    fn test_check_address_vector() {
        // 1PMycacnJaSqwwJqjawXBErnLsZ7RkXUAs
        let payload = hex!("00f54a5851e9372b87810a8e60cdd2e7cfd80b6e31");
        let addr = encode_check(&payload);
        assert_eq!(addr, "1PMycacnJaSqwwJqjawXBErnLsZ7RkXUAs");
        assert_eq!(decode_check(&addr).unwrap(), payload);
    }

    #[test]
    fn test_check_rejects_corruption() {
        let addr = encode_check(&hex!("00f54a5851e9372b87810a8e60cdd2e7cfd80b6e31"));
        let flipped = if addr.ends_with('s') { "t" } else { "s" };
        let corrupted = format!("{}{}", &addr[..addr.len() - 1], flipped);
        assert_eq!(decode_check(&corrupted), Err(CodecError::ChecksumMismatch));
    }
}

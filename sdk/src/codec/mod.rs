//! Codec primitives shared by the wire protocols and chain signers.
//!
//! All decoders are bounds-checked and fail closed; none of them allocate
//! beyond the returned buffer.

pub mod base58;
pub mod crc16;
pub mod der;
pub mod segwit;
pub mod varint;

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    InvalidEncoding,
    Truncated,
    ChecksumMismatch,
    OutOfRange,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidEncoding => write!(f, "Invalid encoding"),
            CodecError::Truncated => write!(f, "Input ended unexpectedly"),
            CodecError::ChecksumMismatch => write!(f, "Checksum mismatch"),
            CodecError::OutOfRange => write!(f, "Length or value out of range"),
        }
    }
}

impl From<CodecError> for x1_common::Error {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::InvalidEncoding => x1_common::Error::InvalidEncoding,
            CodecError::Truncated => x1_common::Error::Truncated,
            CodecError::ChecksumMismatch => x1_common::Error::ChecksumMismatch,
            CodecError::OutOfRange => x1_common::Error::OutOfRange,
        }
    }
}

/// Decodes a hex string, accepting upper and lower case.
pub fn hex_decode(s: &str) -> Result<Vec<u8>, CodecError> {
    hex::decode(s).map_err(|_| CodecError::InvalidEncoding)
}

/// Hex string of `bytes` in the order given.
pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Hex string of `bytes` reversed, as used for txid display.
pub fn hex_encode_reversed(bytes: &[u8]) -> String {
    let reversed: Vec<u8> = bytes.iter().rev().copied().collect();
    hex::encode(reversed)
}

/// Reads a big-endian unsigned integer of 1..=8 bytes.
pub fn read_be(bytes: &[u8]) -> Result<u64, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Truncated);
    }
    if bytes.len() > 8 {
        return Err(CodecError::OutOfRange);
    }
    let mut value = 0u64;
    for b in bytes {
        value = (value << 8) | u64::from(*b);
    }
    Ok(value)
}

/// Reads a little-endian u64 from the first 8 bytes.
pub fn read_u64_le(bytes: &[u8]) -> Result<u64, CodecError> {
    let arr: [u8; 8] = bytes
        .get(..8)
        .ok_or(CodecError::Truncated)?
        .try_into()
        .unwrap();
    Ok(u64::from_le_bytes(arr))
}

/// Reads a little-endian u32 from the first 4 bytes.
pub fn read_u32_le(bytes: &[u8]) -> Result<u32, CodecError> {
    let arr: [u8; 4] = bytes
        .get(..4)
        .ok_or(CodecError::Truncated)?
        .try_into()
        .unwrap();
    Ok(u32::from_le_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_be() {
        assert_eq!(read_be(&[0x01]).unwrap(), 1);
        assert_eq!(read_be(&[0x01, 0x00]).unwrap(), 256);
        assert_eq!(read_be(&[0xff; 8]).unwrap(), u64::MAX);
        assert_eq!(read_be(&[]), Err(CodecError::Truncated));
        assert_eq!(read_be(&[0u8; 9]), Err(CodecError::OutOfRange));
    }

    #[test]
    fn test_hex_reversed() {
        assert_eq!(hex_encode_reversed(&[0x01, 0x02, 0x03]), "030201");
    }
}

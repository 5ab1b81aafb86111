//! Bitcoin-style variable length integers.

use super::CodecError;

/// Reads a varint, returning the value and the number of bytes consumed.
pub fn read(data: &[u8]) -> Result<(u64, usize), CodecError> {
    let first = *data.first().ok_or(CodecError::Truncated)?;
    match first {
        0x00..=0xFC => Ok((first as u64, 1)),
        0xFD => {
            let bytes = data.get(1..3).ok_or(CodecError::Truncated)?;
            Ok((u16::from_le_bytes(bytes.try_into().unwrap()) as u64, 3))
        }
        0xFE => {
            let bytes = data.get(1..5).ok_or(CodecError::Truncated)?;
            Ok((u32::from_le_bytes(bytes.try_into().unwrap()) as u64, 5))
        }
        0xFF => {
            let bytes = data.get(1..9).ok_or(CodecError::Truncated)?;
            Ok((u64::from_le_bytes(bytes.try_into().unwrap()), 9))
        }
    }
}

/// Appends the shortest encoding of `value`.
pub fn write(value: u64, out: &mut Vec<u8>) {
    match value {
        0x00..=0xFC => out.push(value as u8),
        0xFD..=0xFFFF => {
            out.push(0xFD);
            out.extend_from_slice(&(value as u16).to_le_bytes());
        }
        0x1_0000..=0xFFFF_FFFF => {
            out.push(0xFE);
            out.extend_from_slice(&(value as u32).to_le_bytes());
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&value.to_le_bytes());
        }
    }
}

/// Encoded size of `value` in bytes.
pub fn size(value: u64) -> usize {
    match value {
        0x00..=0xFC => 1,
        0xFD..=0xFFFF => 3,
        0x1_0000..=0xFFFF_FFFF => 5,
        _ => 9,
    }
}

//! Calldata argument decoding.
//!
//! Arguments are a head of 32-byte slots; dynamic types (`bytes`,
//! `uint256[]`) put an offset in their slot and live in the tail. Every
//! offset and length is bounded against the payload before any access.

use crate::EvmError;

const SLOT: usize = 32;

/// Argument types the known-function table uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiType {
    Address,
    Uint256,
    Bytes,
    Uint256Array,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Address([u8; 20]),
    Uint256([u8; 32]),
    Bytes(Vec<u8>),
    Uint256Array(Vec<[u8; 32]>),
}

/// Decodes the argument tuple after the 4-byte selector.
pub fn decode_arguments(payload: &[u8], types: &[AbiType]) -> Result<Vec<AbiValue>, EvmError> {
    if payload.len() < types.len() * SLOT {
        return Err(EvmError::InvalidCalldata);
    }

    let mut values = Vec::with_capacity(types.len());
    for (i, kind) in types.iter().enumerate() {
        let slot = &payload[i * SLOT..(i + 1) * SLOT];
        let value = match kind {
            AbiType::Address => {
                // top 12 bytes must be zero padding
                if slot[..12].iter().any(|&b| b != 0) {
                    return Err(EvmError::InvalidCalldata);
                }
                AbiValue::Address(slot[12..].try_into().unwrap())
            }
            AbiType::Uint256 => AbiValue::Uint256(slot.try_into().unwrap()),
            AbiType::Bytes => {
                let (length, data_start) = dynamic_header(payload, slot)?;
                let data = payload
                    .get(data_start..data_start + length)
                    .ok_or(EvmError::InvalidCalldata)?;
                AbiValue::Bytes(data.to_vec())
            }
            AbiType::Uint256Array => {
                let (count, data_start) = dynamic_header(payload, slot)?;
                let byte_len = count.checked_mul(SLOT).ok_or(EvmError::InvalidCalldata)?;
                let data = payload
                    .get(data_start..data_start + byte_len)
                    .ok_or(EvmError::InvalidCalldata)?;
                AbiValue::Uint256Array(
                    data.chunks_exact(SLOT)
                        .map(|chunk| chunk.try_into().unwrap())
                        .collect(),
                )
            }
        };
        values.push(value);
    }
    Ok(values)
}

/// Resolves a dynamic slot: follows the offset, reads the length slot and
/// returns `(length, data_start)`.
fn dynamic_header(payload: &[u8], slot: &[u8]) -> Result<(usize, usize), EvmError> {
    let offset = slot_to_usize(slot)?;
    let length_slot = payload
        .get(offset..offset + SLOT)
        .ok_or(EvmError::InvalidCalldata)?;
    let length = slot_to_usize(length_slot)?;
    let data_start = offset + SLOT;
    if data_start
        .checked_add(length)
        .map(|end| end > payload.len())
        .unwrap_or(true)
    {
        return Err(EvmError::InvalidCalldata);
    }
    Ok((length, data_start))
}

fn slot_to_usize(slot: &[u8]) -> Result<usize, EvmError> {
    if slot[..SLOT - 4].iter().any(|&b| b != 0) {
        return Err(EvmError::InvalidCalldata);
    }
    let mut value = 0usize;
    for b in &slot[SLOT - 4..] {
        value = (value << 8) | *b as usize;
    }
    Ok(value)
}

/// Display form of a decoded argument.
pub fn stringify(value: &AbiValue) -> String {
    match value {
        AbiValue::Address(address) => format!("0x{}", hex::encode(address)),
        AbiValue::Uint256(bytes) => stringify_uint(bytes),
        AbiValue::Bytes(data) => format!("0x{}", hex::encode(data)),
        AbiValue::Uint256Array(items) => {
            let parts: Vec<String> = items.iter().map(stringify_uint).collect();
            format!("[{}]", parts.join(", "))
        }
    }
}

fn stringify_uint(bytes: &[u8; 32]) -> String {
    // decimal when it fits a u128, hex beyond that
    if bytes[..16].iter().all(|&b| b == 0) {
        let mut value = 0u128;
        for b in &bytes[16..] {
            value = (value << 8) | *b as u128;
        }
        format!("{}", value)
    } else {
        format!("0x{}", hex::encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_static_arguments() {
        // transfer(address,uint256): to || amount
        let payload = hex!(
            "000000000000000000000000b0ee076d7779a6ce152283f009f4c32b5f88756c
             00000000000000000000000000000000000000000000000000000000000f4240"
        );
        let values =
            decode_arguments(&payload, &[AbiType::Address, AbiType::Uint256]).unwrap();
        assert_eq!(
            stringify(&values[0]),
            "0xb0ee076d7779a6ce152283f009f4c32b5f88756c"
        );
        assert_eq!(stringify(&values[1]), "1000000");
    }

    #[test]
    fn test_dynamic_bytes_and_array() {
        // one bytes argument (3 bytes) and one uint256[] (2 elements)
        let mut payload = Vec::new();
        payload.extend_from_slice(&[0u8; 28]);
        payload.extend_from_slice(&64u32.to_be_bytes()); // bytes offset
        payload.extend_from_slice(&[0u8; 28]);
        payload.extend_from_slice(&128u32.to_be_bytes()); // array offset
        // bytes: len 3 || data padded
        payload.extend_from_slice(&[0u8; 28]);
        payload.extend_from_slice(&3u32.to_be_bytes());
        let mut data = [0u8; 32];
        data[..3].copy_from_slice(&[0xAA, 0xBB, 0xCC]);
        payload.extend_from_slice(&data);
        // array: len 2 || elements
        payload.extend_from_slice(&[0u8; 28]);
        payload.extend_from_slice(&2u32.to_be_bytes());
        let mut element = [0u8; 32];
        element[31] = 5;
        payload.extend_from_slice(&element);
        element[31] = 9;
        payload.extend_from_slice(&element);

        let values =
            decode_arguments(&payload, &[AbiType::Bytes, AbiType::Uint256Array]).unwrap();
        assert_eq!(values[0], AbiValue::Bytes(vec![0xAA, 0xBB, 0xCC]));
        assert_eq!(stringify(&values[1]), "[5, 9]");
    }

    #[test]
    fn test_out_of_bounds_offset_rejected() {
        let mut payload = vec![0u8; 32];
        payload[28..].copy_from_slice(&1024u32.to_be_bytes());
        assert_eq!(
            decode_arguments(&payload, &[AbiType::Bytes]).unwrap_err(),
            EvmError::InvalidCalldata
        );
    }

    #[test]
    fn test_length_past_end_rejected() {
        // offset 32, claimed length 64 but no data behind it
        let mut payload = vec![0u8; 64];
        payload[28..32].copy_from_slice(&32u32.to_be_bytes());
        payload[60..64].copy_from_slice(&64u32.to_be_bytes());
        assert_eq!(
            decode_arguments(&payload, &[AbiType::Bytes]).unwrap_err(),
            EvmError::InvalidCalldata
        );
    }

    #[test]
    fn test_dirty_address_padding_rejected() {
        let payload = [0xFFu8; 32];
        assert_eq!(
            decode_arguments(&payload, &[AbiType::Address]).unwrap_err(),
            EvmError::InvalidCalldata
        );
    }

    #[test]
    fn test_short_head_rejected() {
        assert_eq!(
            decode_arguments(&[0u8; 32], &[AbiType::Uint256, AbiType::Uint256]).unwrap_err(),
            EvmError::InvalidCalldata
        );
    }
}

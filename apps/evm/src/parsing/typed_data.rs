//! EIP-712 typed-data hashing.
//!
//! The host prepares the struct tree with per-struct type hashes (type
//! names sorted across referenced structs, per the standard); the device
//! recursively computes
//! `hashStruct(S) = keccak256(typeHash(S) || encodeData(S))` and the final
//! digest `keccak256(0x19 0x01 || hashStruct(domain) || hashStruct(message))`.

use x1_proto::{SignTypedDataStruct, TypedDataNode, TypedDataType};
use x1_sdk::hash::keccak256;

use crate::EvmError;

/// Final signing digest over domain and message.
pub fn digest(typed_data: &SignTypedDataStruct) -> Result<[u8; 32], EvmError> {
    let domain = typed_data.domain.as_ref().ok_or(EvmError::InvalidMessage)?;
    let message = typed_data.message.as_ref().ok_or(EvmError::InvalidMessage)?;

    let mut preimage = Vec::with_capacity(66);
    preimage.extend_from_slice(&[0x19, 0x01]);
    preimage.extend_from_slice(&hash_struct(domain)?);
    preimage.extend_from_slice(&hash_struct(message)?);
    Ok(keccak256(&preimage))
}

/// `keccak256(typeHash || encodeData(children))` for a struct node.
pub fn hash_struct(node: &TypedDataNode) -> Result<[u8; 32], EvmError> {
    if node_type(node)? != TypedDataType::Struct {
        return Err(EvmError::InvalidMessage);
    }
    if node.type_hash.len() != 32 {
        return Err(EvmError::InvalidMessage);
    }

    let mut preimage = Vec::with_capacity(32 * (1 + node.children.len()));
    preimage.extend_from_slice(&node.type_hash);
    for child in &node.children {
        preimage.extend_from_slice(&encode_node(child)?);
    }
    Ok(keccak256(&preimage))
}

/// One 32-byte encoded member: atomics are left-padded big-endian, strings
/// and bytes hash their content, structs recurse, arrays hash the
/// concatenation of their encoded elements.
fn encode_node(node: &TypedDataNode) -> Result<[u8; 32], EvmError> {
    match node_type(node)? {
        TypedDataType::Uint | TypedDataType::Int | TypedDataType::Bool => {
            pad_left(&node.data)
        }
        TypedDataType::Address => {
            if node.data.len() != 20 {
                return Err(EvmError::InvalidMessage);
            }
            pad_left(&node.data)
        }
        TypedDataType::String | TypedDataType::Bytes => Ok(keccak256(&node.data)),
        TypedDataType::Struct => hash_struct(node),
        TypedDataType::Array => {
            let mut concatenated = Vec::with_capacity(32 * node.children.len());
            for element in &node.children {
                concatenated.extend_from_slice(&encode_node(element)?);
            }
            Ok(keccak256(&concatenated))
        }
    }
}

fn node_type(node: &TypedDataNode) -> Result<TypedDataType, EvmError> {
    TypedDataType::try_from(node.r#type).map_err(|_| EvmError::InvalidMessage)
}

fn pad_left(data: &[u8]) -> Result<[u8; 32], EvmError> {
    if data.len() > 32 {
        return Err(EvmError::InvalidMessage);
    }
    let mut out = [0u8; 32];
    out[32 - data.len()..].copy_from_slice(data);
    Ok(out)
}

//! Unsigned-transaction decoding.
//!
//! Three variants dispatched by the first byte: type `0x01` (EIP-2930),
//! type `0x02` (EIP-1559) and legacy RLP otherwise. Decoding must consume
//! the entire buffer; trailing bytes, unexpected item types and a chain-id
//! mismatch against the app's configured chain all reject the transaction.

use x1_sdk::hash::keccak256;

use super::rlp::{self, RlpItem};
use crate::{ChainParams, EvmError};

pub type EthAddress = [u8; 20];

const MAX_TX_SIZE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    Legacy,
    AccessList,
    FeeMarket,
}

/// Decoded unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransaction {
    pub tx_type: TransactionType,
    pub chain_id: u64,
    pub nonce: u64,
    /// `None` for contract creation.
    pub to: Option<EthAddress>,
    /// Wei, 32-byte big-endian.
    pub value: [u8; 32],
    pub gas_limit: u64,
    /// Gas price (legacy/2930) or max fee per gas (1559), capped at 8
    /// bytes per the wire format.
    pub gas_price: u64,
    pub max_priority_fee: Option<u64>,
    pub data: Vec<u8>,
    pub access_list: Vec<(EthAddress, Vec<[u8; 32]>)>,
    /// keccak256 of the raw unsigned serialization.
    pub sign_hash: [u8; 32],
}

impl ParsedTransaction {
    pub fn selector(&self) -> Option<[u8; 4]> {
        if self.data.len() >= 4 {
            self.data[..4].try_into().ok()
        } else {
            None
        }
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

/// Parses an unsigned transaction and enforces the app's chain id.
pub fn parse(data: &[u8], params: &ChainParams) -> Result<ParsedTransaction, EvmError> {
    if data.is_empty() {
        return Err(EvmError::EmptyTransaction);
    }
    if data.len() > MAX_TX_SIZE {
        return Err(EvmError::OutOfRange);
    }

    let parsed = match data[0] {
        0x01 => parse_eip2930(data)?,
        0x02 => parse_eip1559(data)?,
        tx_type if tx_type < 0x80 => return Err(EvmError::UnknownTransactionType),
        _ => parse_legacy(data)?,
    };

    if parsed.chain_id != params.chain_id {
        return Err(EvmError::ChainIdMismatch);
    }
    Ok(parsed)
}

/// Legacy EIP-155 unsigned form:
/// `rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0])`.
fn parse_legacy(data: &[u8]) -> Result<ParsedTransaction, EvmError> {
    let item = rlp::decode_exact(data).map_err(EvmError::from)?;
    let fields = item.as_list().ok_or(EvmError::InvalidFieldCount)?;
    if fields.len() != 9 {
        return Err(EvmError::InvalidFieldCount);
    }

    let zero_r = fields[7].as_string().ok_or(EvmError::InvalidField)?;
    let zero_s = fields[8].as_string().ok_or(EvmError::InvalidField)?;
    if !zero_r.is_empty() || !zero_s.is_empty() {
        return Err(EvmError::InvalidField);
    }

    Ok(ParsedTransaction {
        tx_type: TransactionType::Legacy,
        chain_id: fields[6].as_u64().ok_or(EvmError::InvalidField)?,
        nonce: fields[0].as_u64().ok_or(EvmError::InvalidField)?,
        gas_price: fields[1].as_u64().ok_or(EvmError::InvalidField)?,
        gas_limit: fields[2].as_u64().ok_or(EvmError::InvalidField)?,
        to: parse_to_field(&fields[3])?,
        value: fields[4].as_bytes32().ok_or(EvmError::InvalidField)?,
        data: fields[5].as_string().ok_or(EvmError::InvalidField)?.to_vec(),
        max_priority_fee: None,
        access_list: Vec::new(),
        sign_hash: keccak256(data),
    })
}

/// `0x01 || rlp([chainId, nonce, gasPrice, gasLimit, to, value, data, accessList])`
fn parse_eip2930(data: &[u8]) -> Result<ParsedTransaction, EvmError> {
    let item = rlp::decode_exact(&data[1..]).map_err(EvmError::from)?;
    let fields = item.as_list().ok_or(EvmError::InvalidFieldCount)?;
    if fields.len() != 8 {
        return Err(EvmError::InvalidFieldCount);
    }

    Ok(ParsedTransaction {
        tx_type: TransactionType::AccessList,
        chain_id: fields[0].as_u64().ok_or(EvmError::InvalidField)?,
        nonce: fields[1].as_u64().ok_or(EvmError::InvalidField)?,
        gas_price: fields[2].as_u64().ok_or(EvmError::InvalidField)?,
        gas_limit: fields[3].as_u64().ok_or(EvmError::InvalidField)?,
        to: parse_to_field(&fields[4])?,
        value: fields[5].as_bytes32().ok_or(EvmError::InvalidField)?,
        data: fields[6].as_string().ok_or(EvmError::InvalidField)?.to_vec(),
        max_priority_fee: None,
        access_list: parse_access_list(&fields[7])?,
        sign_hash: keccak256(data),
    })
}

/// `0x02 || rlp([chainId, nonce, maxPriorityFee, maxFee, gasLimit, to, value,
/// data, accessList])`
fn parse_eip1559(data: &[u8]) -> Result<ParsedTransaction, EvmError> {
    let item = rlp::decode_exact(&data[1..]).map_err(EvmError::from)?;
    let fields = item.as_list().ok_or(EvmError::InvalidFieldCount)?;
    if fields.len() != 9 {
        return Err(EvmError::InvalidFieldCount);
    }

    Ok(ParsedTransaction {
        tx_type: TransactionType::FeeMarket,
        chain_id: fields[0].as_u64().ok_or(EvmError::InvalidField)?,
        nonce: fields[1].as_u64().ok_or(EvmError::InvalidField)?,
        max_priority_fee: Some(fields[2].as_u64().ok_or(EvmError::InvalidField)?),
        gas_price: fields[3].as_u64().ok_or(EvmError::InvalidField)?,
        gas_limit: fields[4].as_u64().ok_or(EvmError::InvalidField)?,
        to: parse_to_field(&fields[5])?,
        value: fields[6].as_bytes32().ok_or(EvmError::InvalidField)?,
        data: fields[7].as_string().ok_or(EvmError::InvalidField)?.to_vec(),
        access_list: parse_access_list(&fields[8])?,
        sign_hash: keccak256(data),
    })
}

fn parse_to_field(item: &RlpItem<'_>) -> Result<Option<EthAddress>, EvmError> {
    let bytes = item.as_string().ok_or(EvmError::InvalidField)?;
    match bytes.len() {
        0 => Ok(None),
        20 => Ok(Some(bytes.try_into().unwrap())),
        _ => Err(EvmError::InvalidField),
    }
}

fn parse_access_list(
    item: &RlpItem<'_>,
) -> Result<Vec<(EthAddress, Vec<[u8; 32]>)>, EvmError> {
    let entries = item.as_list().ok_or(EvmError::InvalidField)?;
    let mut out = Vec::with_capacity(entries.len());
    for entry in entries {
        let pair = entry.as_list().ok_or(EvmError::InvalidField)?;
        if pair.len() != 2 {
            return Err(EvmError::InvalidFieldCount);
        }
        let address = pair[0].as_address().ok_or(EvmError::InvalidField)?;
        let keys = pair[1]
            .as_list()
            .ok_or(EvmError::InvalidField)?
            .iter()
            .map(|key| {
                key.as_string()
                    .filter(|k| k.len() == 32)
                    .map(|k| k.try_into().unwrap())
                    .ok_or(EvmError::InvalidField)
            })
            .collect::<Result<Vec<[u8; 32]>, EvmError>>()?;
        out.push((address, keys));
    }
    Ok(out)
}

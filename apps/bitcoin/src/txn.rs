//! Unsigned-transaction model, previous-transaction verification and fee
//! safety.

use x1_sdk::codec::varint;

use crate::script::{classify, ScriptType};
use crate::{BtcError, CoinParams};

/// One input of the transaction being signed, as collected from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnInput {
    /// Previous txid in internal (little-endian) byte order.
    pub prev_txn_hash: [u8; 32],
    pub prev_output_index: u32,
    pub value: u64,
    pub script_pub_key: Vec<u8>,
    pub sequence: u32,
    /// Change/address levels appended to the account path for this input's
    /// key.
    pub change_index: u32,
    pub address_index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnOutput {
    pub value: u64,
    pub script_pub_key: Vec<u8>,
    pub is_change: bool,
    pub change_index: u32,
}

/// The transaction under construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnsignedTxn {
    pub version: u32,
    pub locktime: u32,
    pub sighash: u32,
    pub inputs: Vec<TxnInput>,
    pub outputs: Vec<TxnOutput>,
}

/// Verifies an input against the raw bytes of the transaction it spends.
///
/// Walks the raw transaction (skipping the segwit marker/flag pair when
/// present), finds the referenced output, rebuilds the non-witness
/// serialization and compares its double SHA-256 and the output value
/// against the claims. Marker `0x00` must be followed by flag `0x01`;
/// anything else is rejected.
pub fn verify_input_utxo(raw_txn: &[u8], input: &TxnInput) -> Result<(), BtcError> {
    if raw_txn.len() < 10 {
        return Err(BtcError::TruncatedPrevTxn);
    }

    let mut offset = 4usize;
    let has_witness = raw_txn[4] == 0x00;
    if has_witness {
        if raw_txn.get(5) != Some(&0x01) {
            return Err(BtcError::InvalidSegwitFlag);
        }
        offset += 2;
    }
    let body_start = offset;

    let (input_count, consumed) = read_varint(raw_txn, offset)?;
    offset = consumed;
    for _ in 0..input_count {
        offset = skip(raw_txn, offset, 36)?;
        let (script_len, after) = read_varint(raw_txn, offset)?;
        offset = skip(raw_txn, after, script_len as usize + 4)?;
    }

    let (output_count, consumed) = read_varint(raw_txn, offset)?;
    offset = consumed;
    let mut value_offset = None;
    for output_index in 0..output_count {
        if output_index == input.prev_output_index as u64 {
            value_offset = Some(offset);
        }
        offset = skip(raw_txn, offset, 8)?;
        let (script_len, after) = read_varint(raw_txn, offset)?;
        offset = skip(raw_txn, after, script_len as usize)?;
    }
    let Some(value_offset) = value_offset else {
        return Err(BtcError::OutputIndexNotFound);
    };
    let body_end = offset;

    // Non-witness serialization: version || ins/outs || locktime.
    let locktime = raw_txn
        .get(raw_txn.len() - 4..)
        .ok_or(BtcError::TruncatedPrevTxn)?;
    let mut stripped = Vec::with_capacity(8 + body_end - body_start);
    stripped.extend_from_slice(&raw_txn[..4]);
    stripped.extend_from_slice(&raw_txn[body_start..body_end]);
    stripped.extend_from_slice(locktime);

    if x1_sdk::hash::sha256d(&stripped) != input.prev_txn_hash {
        return Err(BtcError::PrevTxnHashMismatch);
    }

    let value_bytes: [u8; 8] = raw_txn[value_offset..value_offset + 8]
        .try_into()
        .map_err(|_| BtcError::TruncatedPrevTxn)?;
    if u64::from_le_bytes(value_bytes) != input.value {
        return Err(BtcError::ValueMismatch);
    }
    Ok(())
}

fn read_varint(data: &[u8], offset: usize) -> Result<(u64, usize), BtcError> {
    let slice = data.get(offset..).ok_or(BtcError::TruncatedPrevTxn)?;
    let (value, consumed) = varint::read(slice).map_err(|_| BtcError::TruncatedPrevTxn)?;
    Ok((value, offset + consumed))
}

fn skip(data: &[u8], offset: usize, count: usize) -> Result<usize, BtcError> {
    let next = offset.checked_add(count).ok_or(BtcError::TruncatedPrevTxn)?;
    if next > data.len() {
        return Err(BtcError::TruncatedPrevTxn);
    }
    Ok(next)
}

/// `Σ inputs − Σ outputs`. Rejects any single output larger than the input
/// total, and outputs exceeding inputs overall.
pub fn fee(txn: &UnsignedTxn) -> Result<u64, BtcError> {
    let input_total: u64 = txn.inputs.iter().map(|i| i.value).sum();
    let mut output_total = 0u64;
    for output in &txn.outputs {
        if output.value > input_total {
            return Err(BtcError::OutputExceedsInputs);
        }
        output_total = output_total
            .checked_add(output.value)
            .ok_or(BtcError::OutputsExceedInputs)?;
    }
    input_total
        .checked_sub(output_total)
        .ok_or(BtcError::OutputsExceedInputs)
}

/// Transaction weight: 4× the non-witness size, plus the witness estimate
/// of 2 header bytes and 106 bytes per segwit input.
pub fn transaction_weight(txn: &UnsignedTxn) -> u32 {
    let mut base = 4u32; // version
    base += varint::size(txn.inputs.len() as u64) as u32;
    let mut segwit_inputs = 0u32;
    for input in &txn.inputs {
        base += 36;
        base += varint::size(input.script_pub_key.len() as u64) as u32;
        base += input.script_pub_key.len() as u32;
        base += 4;
        if matches!(classify(&input.script_pub_key), Ok(kind) if kind.is_segwit()) {
            segwit_inputs += 1;
        }
    }
    base += varint::size(txn.outputs.len() as u64) as u32;
    for output in &txn.outputs {
        base += 8;
        base += varint::size(output.script_pub_key.len() as u64) as u32;
        base += output.script_pub_key.len() as u32;
    }
    base += 4; // locktime

    let mut weight = base * 4;
    if segwit_inputs > 0 {
        weight += 2 + 106 * segwit_inputs;
    }
    weight
}

/// Fee ceiling: `max_fee_per_kb × vbytes ÷ 1000`; fees above this need an
/// explicit extra confirmation.
pub fn fee_threshold(txn: &UnsignedTxn, params: &CoinParams) -> u64 {
    let vbytes = (transaction_weight(txn) as u64).div_ceil(4);
    (params.max_fee_per_kb / 1000) * vbytes
}

/// The last output must be a recognized change form when flagged as change.
pub fn validate_change_output(output: &TxnOutput, change_pubkey: &[u8]) -> Result<(), BtcError> {
    match crate::script::change_script_matches(&output.script_pub_key, change_pubkey) {
        Ok(true) => Ok(()),
        Ok(false) => Err(BtcError::UnknownChangeScript),
        Err(e) => Err(e),
    }
}

/// True when the script can be spent by this signer.
pub fn spendable_script(script: &[u8]) -> Result<ScriptType, BtcError> {
    let kind = classify(script)?;
    match kind {
        ScriptType::P2pkh | ScriptType::P2wpkh | ScriptType::P2sh | ScriptType::P2tr => Ok(kind),
        _ => Err(BtcError::UnknownScript),
    }
}

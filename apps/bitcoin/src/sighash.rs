//! Per-input signing digests.
//!
//! Legacy inputs hash the whole serialized transaction with the spent
//! scriptPubKey substituted in; segwit v0 inputs follow BIP-143 using the
//! per-transaction cache of `hashPrevouts`/`hashSequence`/`hashOutputs`.
//! The cache is computed once up-front and is required before any segwit
//! digest.

use x1_sdk::codec::varint;
use x1_sdk::hash::sha256d;

use crate::txn::UnsignedTxn;
use crate::BtcError;

/// BIP-143 intermediate hashes, computed once per transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegwitCache {
    pub hash_prevouts: [u8; 32],
    pub hash_sequence: [u8; 32],
    pub hash_outputs: [u8; 32],
}

impl SegwitCache {
    pub fn new(txn: &UnsignedTxn) -> SegwitCache {
        let mut prevouts = Vec::with_capacity(txn.inputs.len() * 36);
        let mut sequences = Vec::with_capacity(txn.inputs.len() * 4);
        for input in &txn.inputs {
            prevouts.extend_from_slice(&input.prev_txn_hash);
            prevouts.extend_from_slice(&input.prev_output_index.to_le_bytes());
            sequences.extend_from_slice(&input.sequence.to_le_bytes());
        }

        let mut outputs = Vec::new();
        for output in &txn.outputs {
            outputs.extend_from_slice(&output.value.to_le_bytes());
            varint::write(output.script_pub_key.len() as u64, &mut outputs);
            outputs.extend_from_slice(&output.script_pub_key);
        }

        SegwitCache {
            hash_prevouts: sha256d(&prevouts),
            hash_sequence: sha256d(&sequences),
            hash_outputs: sha256d(&outputs),
        }
    }
}

/// Legacy (pre-segwit) digest for one input.
pub fn legacy_digest(
    txn: &UnsignedTxn,
    input_index: usize,
    script_pubkey: &[u8],
) -> Result<[u8; 32], BtcError> {
    if input_index >= txn.inputs.len() {
        return Err(BtcError::InvalidRequest);
    }

    let mut preimage = Vec::new();
    preimage.extend_from_slice(&txn.version.to_le_bytes());
    varint::write(txn.inputs.len() as u64, &mut preimage);
    for (i, input) in txn.inputs.iter().enumerate() {
        preimage.extend_from_slice(&input.prev_txn_hash);
        preimage.extend_from_slice(&input.prev_output_index.to_le_bytes());
        if i == input_index {
            varint::write(script_pubkey.len() as u64, &mut preimage);
            preimage.extend_from_slice(script_pubkey);
        } else {
            preimage.push(0x00);
        }
        preimage.extend_from_slice(&input.sequence.to_le_bytes());
    }
    varint::write(txn.outputs.len() as u64, &mut preimage);
    for output in &txn.outputs {
        preimage.extend_from_slice(&output.value.to_le_bytes());
        varint::write(output.script_pub_key.len() as u64, &mut preimage);
        preimage.extend_from_slice(&output.script_pub_key);
    }
    preimage.extend_from_slice(&txn.locktime.to_le_bytes());
    preimage.extend_from_slice(&txn.sighash.to_le_bytes());

    Ok(sha256d(&preimage))
}

/// BIP-143 digest for a segwit v0 input.
pub fn segwit_digest(
    txn: &UnsignedTxn,
    cache: &SegwitCache,
    input_index: usize,
    script_code: &[u8],
) -> Result<[u8; 32], BtcError> {
    let input = txn.inputs.get(input_index).ok_or(BtcError::InvalidRequest)?;

    let mut preimage = Vec::with_capacity(156 + script_code.len());
    preimage.extend_from_slice(&txn.version.to_le_bytes());
    preimage.extend_from_slice(&cache.hash_prevouts);
    preimage.extend_from_slice(&cache.hash_sequence);
    preimage.extend_from_slice(&input.prev_txn_hash);
    preimage.extend_from_slice(&input.prev_output_index.to_le_bytes());
    varint::write(script_code.len() as u64, &mut preimage);
    preimage.extend_from_slice(script_code);
    preimage.extend_from_slice(&input.value.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&cache.hash_outputs);
    preimage.extend_from_slice(&txn.locktime.to_le_bytes());
    preimage.extend_from_slice(&txn.sighash.to_le_bytes());

    Ok(sha256d(&preimage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::{TxnInput, TxnOutput};
    use hex_literal::hex;

    /// BIP-143 "Native P2WPKH" reference transaction: two inputs, the
    /// second one P2WPKH, with published intermediate hashes and sighash.
    fn bip143_example() -> UnsignedTxn {
        let mut hash0 = hex!("9f96ade4b41d5433f4eda31e1738ec2b36f6e7d1420d94a6af99801a88f7f7ff");
        hash0.reverse();
        let mut hash1 = hex!("8ac60eb9575db5b2d987e29f301b5b819ea83a5c6579d282d189cc04b8e151ef");
        hash1.reverse();
        UnsignedTxn {
            version: 1,
            locktime: 0x11,
            sighash: 1,
            inputs: vec![
                TxnInput {
                    prev_txn_hash: hash0,
                    prev_output_index: 0,
                    value: 625_000_000,
                    script_pub_key: hex!(
                        "2103c9f4836b9a4f77fc0d81f7bcb01b7f1b35916864b9476c241ce9fc198bd25432ac"
                    )
                    .to_vec(),
                    sequence: 0xFFFFFFEE,
                    change_index: 0,
                    address_index: 0,
                },
                TxnInput {
                    prev_txn_hash: hash1,
                    prev_output_index: 1,
                    value: 600_000_000,
                    script_pub_key: hex!("00141d0f172a0ecb48aee1be1f2687d2963ae33f71a1").to_vec(),
                    sequence: 0xFFFFFFFF,
                    change_index: 0,
                    address_index: 0,
                },
            ],
            outputs: vec![
                TxnOutput {
                    value: 112_340_000,
                    script_pub_key: hex!("76a9148280b37df378db99f66f85c95a783a76ac7a6d5988ac")
                        .to_vec(),
                    is_change: false,
                    change_index: 0,
                },
                TxnOutput {
                    value: 223_450_000,
                    script_pub_key: hex!("76a9143bde42dbee7e4dbe6a21b2d50ce2f0167faa815988ac")
                        .to_vec(),
                    is_change: false,
                    change_index: 0,
                },
            ],
        }
    }

    #[test]
    fn test_bip143_intermediate_hashes() {
        let cache = SegwitCache::new(&bip143_example());
        assert_eq!(
            cache.hash_prevouts,
            hex!("96b827c8483d4e9b96712b6713a7b68d6e8003a781feba36c31143470b4efd37")
        );
        assert_eq!(
            cache.hash_sequence,
            hex!("52b0a642eea2fb7ae638c36f6252b6750293dbe574a806984b8e4d8548339a3b")
        );
        assert_eq!(
            cache.hash_outputs,
            hex!("863ef3e1a92afbfdb97f31ad0fc7683ee943e9abcf2501590ff8f6551f47e5e5")
        );
    }

    #[test]
    fn test_bip143_segwit_digest() {
        let txn = bip143_example();
        let cache = SegwitCache::new(&txn);
        // script code: p2pkh over the witness program's key hash
        let script_code = hex!("76a9141d0f172a0ecb48aee1be1f2687d2963ae33f71a188ac");
        let digest = segwit_digest(&txn, &cache, 1, &script_code).unwrap();
        assert_eq!(
            digest,
            hex!("c37af31116d1b27caf68aae9e3ac82f1477929014d5b917657d0eb49478cb670")
        );
    }

    #[test]
    fn test_legacy_digest_substitutes_only_target_script() {
        let txn = bip143_example();
        let script = &txn.inputs[0].script_pub_key.clone();
        let d0 = legacy_digest(&txn, 0, script).unwrap();
        let d1 = legacy_digest(&txn, 1, script).unwrap();
        assert_ne!(d0, d1);

        assert_eq!(
            legacy_digest(&txn, 2, script).unwrap_err(),
            BtcError::InvalidRequest
        );
    }
}

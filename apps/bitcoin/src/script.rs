//! Output-script classification, construction and address recovery.

use x1_sdk::codec::{base58, segwit};
use x1_sdk::hash::hash160;

use crate::{BtcError, CoinParams};

// Opcodes the classifier needs.
const OP_0: u8 = 0x00;
const OP_PUSH20: u8 = 0x14;
const OP_PUSH32: u8 = 0x20;
const OP_PUSH33: u8 = 0x21;
const OP_PUSH65: u8 = 0x41;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_RETURN: u8 = 0x6A;
const OP_DUP: u8 = 0x76;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_HASH160: u8 = 0xA9;
const OP_CHECKSIG: u8 = 0xAC;
const OP_CHECKMULTISIG: u8 = 0xAE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    P2pk,
    P2pkh,
    P2sh,
    P2wpkh,
    P2wsh,
    P2tr,
    P2ms,
    NullData,
    /// Future witness version (v1..v16) with a valid 2..40-byte program,
    /// excluding the recognized v0/v1 forms above.
    UnknownSegwit { version: u8 },
}

impl ScriptType {
    pub fn is_segwit(&self) -> bool {
        matches!(
            self,
            ScriptType::P2wpkh
                | ScriptType::P2wsh
                | ScriptType::P2tr
                | ScriptType::UnknownSegwit { .. }
        )
    }

    pub fn witness_version(&self) -> Option<u8> {
        match self {
            ScriptType::P2wpkh | ScriptType::P2wsh => Some(0),
            ScriptType::P2tr => Some(1),
            ScriptType::UnknownSegwit { version } => Some(*version),
            _ => None,
        }
    }
}

/// Byte-pattern classification of an output script.
pub fn classify(script: &[u8]) -> Result<ScriptType, BtcError> {
    match script {
        [OP_PUSH33, .., OP_CHECKSIG] if script.len() == 35 => Ok(ScriptType::P2pk),
        [OP_PUSH65, .., OP_CHECKSIG] if script.len() == 67 => Ok(ScriptType::P2pk),
        [OP_DUP, OP_HASH160, OP_PUSH20, .., OP_EQUALVERIFY, OP_CHECKSIG]
            if script.len() == 25 =>
        {
            Ok(ScriptType::P2pkh)
        }
        [OP_HASH160, OP_PUSH20, .., OP_EQUAL] if script.len() == 23 => Ok(ScriptType::P2sh),
        [OP_0, OP_PUSH20, ..] if script.len() == 22 => Ok(ScriptType::P2wpkh),
        [OP_0, OP_PUSH32, ..] if script.len() == 34 => Ok(ScriptType::P2wsh),
        [OP_1, OP_PUSH32, ..] if script.len() == 34 => Ok(ScriptType::P2tr),
        [OP_RETURN, ..] => Ok(ScriptType::NullData),
        [version @ OP_1..=OP_16, push, rest @ ..]
            if (2..=40).contains(push) && rest.len() == *push as usize =>
        {
            Ok(ScriptType::UnknownSegwit {
                version: version - OP_1 + 1,
            })
        }
        [first, .., OP_CHECKMULTISIG] if (OP_1..=OP_16).contains(first) => Ok(ScriptType::P2ms),
        _ => Err(BtcError::UnknownScript),
    }
}

/// Recovers the display address of an output script.
///
/// P2PKH/P2SH use base58check; witness outputs use bech32 or bech32m
/// according to the witness version. P2PK, bare multisig and null-data
/// outputs have no address form.
pub fn script_address(script: &[u8], params: &CoinParams) -> Result<String, BtcError> {
    match classify(script)? {
        ScriptType::P2pkh => {
            let mut payload = [0u8; 21];
            payload[0] = params.p2pkh_version;
            payload[1..].copy_from_slice(&script[3..23]);
            Ok(base58::encode_check(&payload))
        }
        ScriptType::P2sh => {
            let mut payload = [0u8; 21];
            payload[0] = params.p2sh_version;
            payload[1..].copy_from_slice(&script[2..22]);
            Ok(base58::encode_check(&payload))
        }
        kind @ (ScriptType::P2wpkh
        | ScriptType::P2wsh
        | ScriptType::P2tr
        | ScriptType::UnknownSegwit { .. }) => {
            let version = kind.witness_version().expect("segwit kind has a version");
            segwit::encode_address(params.bech32_hrp, version, &script[2..])
                .map_err(|_| BtcError::UnknownScript)
        }
        _ => Err(BtcError::UnknownScript),
    }
}

/// `OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG`
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.extend_from_slice(&[OP_DUP, OP_HASH160, OP_PUSH20]);
    script.extend_from_slice(pubkey_hash);
    script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
    script
}

/// `OP_0 <20>`
pub fn p2wpkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(22);
    script.extend_from_slice(&[OP_0, OP_PUSH20]);
    script.extend_from_slice(pubkey_hash);
    script
}

/// The redeem script wrapped by a P2SH-P2WPKH output.
pub fn p2sh_p2wpkh_redeem_script(pubkey: &[u8]) -> Vec<u8> {
    p2wpkh_script(&hash160(pubkey))
}

/// `OP_HASH160 <20> OP_EQUAL` over the v0 redeem script.
pub fn p2sh_p2wpkh_script(pubkey: &[u8]) -> Vec<u8> {
    let redeem = p2sh_p2wpkh_redeem_script(pubkey);
    let mut script = Vec::with_capacity(23);
    script.extend_from_slice(&[OP_HASH160, OP_PUSH20]);
    script.extend_from_slice(&hash160(&redeem));
    script.push(OP_EQUAL);
    script
}

/// Expected script for a derived change key, per supported change type.
pub fn change_script_matches(script: &[u8], pubkey: &[u8]) -> Result<bool, BtcError> {
    let pubkey_hash = hash160(pubkey);
    match classify(script)? {
        ScriptType::P2pkh => Ok(script[3..23] == pubkey_hash),
        ScriptType::P2wpkh => Ok(script[2..22] == pubkey_hash),
        ScriptType::P2sh => Ok(script[2..22] == hash160(&p2sh_p2wpkh_redeem_script(pubkey))),
        _ => Err(BtcError::UnknownChangeScript),
    }
}

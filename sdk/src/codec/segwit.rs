//! Segwit address encoding over bech32/bech32m.
//!
//! The bech32 crate picks the right checksum spec from the witness version
//! (v0 -> bech32, v1+ -> bech32m); this module just maps to and from raw
//! witness programs and surfaces codec errors.

use bech32::{segwit, Fe32, Hrp};

use super::CodecError;

/// Encodes a witness program as a segwit address for the given HRP.
pub fn encode_address(hrp: &str, witness_version: u8, program: &[u8]) -> Result<String, CodecError> {
    if witness_version > 16 {
        return Err(CodecError::OutOfRange);
    }
    if program.len() < 2 || program.len() > 40 {
        return Err(CodecError::OutOfRange);
    }
    let hrp = Hrp::parse(hrp).map_err(|_| CodecError::InvalidEncoding)?;
    let version = Fe32::try_from(witness_version).map_err(|_| CodecError::OutOfRange)?;
    segwit::encode(hrp, version, program).map_err(|_| CodecError::InvalidEncoding)
}

/// Decodes a segwit address into (hrp, witness version, witness program).
pub fn decode_address(addr: &str) -> Result<(String, u8, Vec<u8>), CodecError> {
    let (hrp, version, program) =
        segwit::decode(addr).map_err(|_| CodecError::InvalidEncoding)?;
    Ok((hrp.to_string().to_lowercase(), version.to_u8(), program))
}

//! Address and extended-key derivation for the four supported purposes.

use x1_sdk::curve::Prefix;
use x1_common::path::{
    Bip32Path, PURPOSE_LEGACY, PURPOSE_NESTED_SEGWIT, PURPOSE_SEGWIT, PURPOSE_TAPROOT,
};
use x1_sdk::codec::{base58, segwit};
use x1_sdk::curve::{self, HdNode};
use x1_sdk::hash::hash160;

use crate::script::p2sh_p2wpkh_redeem_script;
use crate::{BtcError, CoinParams};

/// Derives the display address for a validated address-level path.
pub fn derive_address(
    seed: &[u8],
    path: &Bip32Path,
    params: &CoinParams,
) -> Result<String, BtcError> {
    if !path.is_valid_bitcoin_path() || path.len() != 5 {
        return Err(BtcError::InvalidDerivationPath);
    }
    let node = HdNode::derive(seed, path).map_err(|_| BtcError::KeyDerivationFailed)?;
    let pubkey = node.public_key();
    address_for_purpose(path.as_slice()[0], &pubkey, params)
}

/// Address encoding for an already-derived compressed public key.
pub fn address_for_purpose(
    purpose: u32,
    pubkey: &[u8; 33],
    params: &CoinParams,
) -> Result<String, BtcError> {
    match purpose {
        PURPOSE_LEGACY => {
            let mut payload = [0u8; 21];
            payload[0] = params.p2pkh_version;
            payload[1..].copy_from_slice(&hash160(pubkey));
            Ok(base58::encode_check(&payload))
        }
        PURPOSE_NESTED_SEGWIT => {
            let mut payload = [0u8; 21];
            payload[0] = params.p2sh_version;
            payload[1..].copy_from_slice(&hash160(&p2sh_p2wpkh_redeem_script(pubkey)));
            Ok(base58::encode_check(&payload))
        }
        PURPOSE_SEGWIT => segwit::encode_address(params.bech32_hrp, 0, &hash160(pubkey))
            .map_err(|_| BtcError::InvalidDerivationPath),
        PURPOSE_TAPROOT => {
            let tweaked = curve::taproot_output_key(pubkey, None)
                .map_err(|_| BtcError::KeyDerivationFailed)?;
            segwit::encode_address(params.bech32_hrp, 1, &tweaked)
                .map_err(|_| BtcError::InvalidDerivationPath)
        }
        _ => Err(BtcError::InvalidDerivationPath),
    }
}

/// Serializes the account-level extended public key under the SLIP-132
/// prefix matching the purpose.
pub fn derive_xpub(seed: &[u8], path: &Bip32Path) -> Result<String, BtcError> {
    let purpose = match path.as_slice() {
        [] => return Err(BtcError::InvalidDerivationPath),
        steps => steps[0],
    };
    let prefix = xpub_prefix(purpose)?;
    let node = HdNode::derive(seed, path).map_err(|_| BtcError::KeyDerivationFailed)?;
    Ok(node.xpub_string(prefix))
}

fn xpub_prefix(purpose: u32) -> Result<Prefix, BtcError> {
    match purpose {
        PURPOSE_LEGACY | PURPOSE_TAPROOT => Ok(curve::PREFIX_XPUB),
        PURPOSE_NESTED_SEGWIT => Ok(curve::PREFIX_YPUB),
        PURPOSE_SEGWIT => Ok(curve::PREFIX_ZPUB),
        _ => Err(BtcError::InvalidDerivationPath),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::BITCOIN;
    use hex_literal::hex;

    // Shared test seed (128 hex chars) used across the signer tests.
    pub(crate) const SEED: [u8; 64] = hex!(
        "0e37516bfd9429d749b5b83048a52cbbbc960850f47f6973845491272a1eb8b7
         3ca2c7222f12aa7df09f851a9aeeae84aff9af17f7369e570b397ea8d550fb2c"
    );

    #[test]
    fn test_native_segwit_xpub() {
        let path = Bip32Path::parse("m/84'/0'/0'/0").unwrap();
        assert_eq!(
            derive_xpub(&SEED, &path).unwrap(),
            "zpub6snp4m6XZJZdyvM2bfff1bRFswErPnd3JkyhKNRLasDmFMcMEneVmD6rPZPJasYC3rt8aSEQbtp1JsjXbSeCraecR9sqUk1FrZpXLRntMPW"
        );
    }

    #[test]
    fn test_wrapped_segwit_xpub() {
        let path = Bip32Path::parse("m/49'/0'/0'/0").unwrap();
        assert_eq!(
            derive_xpub(&SEED, &path).unwrap(),
            "ypub6aBfyV8C1Jfrxf884pGY1Se1Eza1mvkB8XkuTwYKSQeCc621ZKsrg2ENLazFr3WkpDcrMdUu3f6SPnGqLWMFbsdo8pcmcmNQqqmyVdVcrSs"
        );
    }

    #[test]
    fn test_legacy_xpub() {
        let path = Bip32Path::parse("m/44'/0'/0'/0").unwrap();
        assert_eq!(
            derive_xpub(&SEED, &path).unwrap(),
            "xpub6E6ASSVjmAchK4RhoG6EaqZ9e3igYMpukcNxRk5mcB4L94QbfFrcxL8aur4YY9BiwzMt6oYbtMxg2SXptA3ubyKnnBvrQEEpPZut3F69Gvf"
        );
    }

    #[test]
    fn test_native_segwit_address() {
        let path = Bip32Path::parse("m/84'/0'/0'/0/0").unwrap();
        assert_eq!(
            derive_address(&SEED, &path, &BITCOIN).unwrap(),
            "bc1qv9mvxjhuwqmk389sfsvrty53z84gk2u5wwmdmt"
        );
    }

    #[test]
    fn test_segwit_address_odd_y_pubkey() {
        // m/84'/0'/0'/0/2 of the same root has an odd-y public key
        let path = Bip32Path::parse("m/84'/0'/0'/0/2").unwrap();
        assert_eq!(
            derive_address(&SEED, &path, &BITCOIN).unwrap(),
            "bc1q54l2zdaqsl4pzxmnm7j8f90hxugujkmzvt7d9l"
        );
    }

    #[test]
    fn test_segwit_address_from_known_pubkey() {
        let pubkey =
            hex!("0272f5ad20087473a0548ada65536a2f7242cc366d45473f0604a921a9c9ce70aa");
        assert_eq!(
            address_for_purpose(PURPOSE_SEGWIT, &pubkey, &BITCOIN).unwrap(),
            "bc1qv9mvxjhuwqmk389sfsvrty53z84gk2u5wwmdmt"
        );
    }

    #[test]
    fn test_taproot_address_shape() {
        let path = Bip32Path::parse("m/86'/0'/0'/0/0").unwrap();
        let address = derive_address(&SEED, &path, &BITCOIN).unwrap();
        assert!(address.starts_with("bc1p"));
        assert_eq!(address.len(), 62);
    }

    #[test]
    fn test_account_path_has_no_address() {
        let path = Bip32Path::parse("m/84'/0'/0'").unwrap();
        assert_eq!(
            derive_address(&SEED, &path, &BITCOIN).unwrap_err(),
            BtcError::InvalidDerivationPath
        );
    }
}

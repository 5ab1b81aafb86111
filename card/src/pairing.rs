//! One-time card pairing.
//!
//! The device signs a pairing challenge with its provisioned identity key on
//! nist256p1; the card answers with its own signed pairing data. Both sides
//! run ECDH and expand the shared x-coordinate through SHA-512 into the
//! {enc, mac} pairing keys. The keystore entry is persisted only after the
//! card's signature verifies.

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use sha2::{Digest, Sha256, Sha512};
use x1_common::types::KeystoreEntry;
use zeroize::Zeroizing;

use crate::error::CardError;

/// Length of the signed portion of a pairing payload:
/// `key_id(4) || nonce(32) || key_path(8)`.
pub const PAIRING_SIGNED_LEN: usize = 44;

/// Provisioned device identity used for pairing.
pub struct DeviceIdentity {
    pub key_id: [u8; 4],
    pub key_path: [u8; 8],
    signing_key: SigningKey,
    /// Trust anchor for card pairing signatures.
    card_root_key: VerifyingKey,
}

impl DeviceIdentity {
    pub fn new(
        key_id: [u8; 4],
        key_path: [u8; 8],
        secret: &[u8; 32],
        card_root_key_sec1: &[u8],
    ) -> Result<DeviceIdentity, CardError> {
        let signing_key =
            SigningKey::from_bytes(secret.into()).map_err(|_| CardError::PairingFailed)?;
        let card_root_key = VerifyingKey::from_sec1_bytes(card_root_key_sec1)
            .map_err(|_| CardError::PairingFailed)?;
        Ok(DeviceIdentity {
            key_id,
            key_path,
            signing_key,
            card_root_key,
        })
    }

    /// SEC1 public identity key, as shared with cards at provisioning.
    pub fn public_key(&self) -> Vec<u8> {
        self.signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Builds `key_id || nonce || key_path || DER(sig)`.
    pub fn build_pairing_request(&self, nonce: &[u8; 32]) -> Result<Vec<u8>, CardError> {
        let mut payload = Vec::with_capacity(PAIRING_SIGNED_LEN + 72);
        payload.extend_from_slice(&self.key_id);
        payload.extend_from_slice(nonce);
        payload.extend_from_slice(&self.key_path);

        let digest = Sha256::digest(&payload);
        let signature: Signature = self
            .signing_key
            .sign_prehash(&digest)
            .map_err(|_| CardError::PairingFailed)?;
        payload.extend_from_slice(signature.to_der().as_bytes());
        Ok(payload)
    }

    /// Verifies the card's pairing payload and derives the pairing keys.
    pub fn complete_pairing(
        &self,
        device_nonce: &[u8; 32],
        card_payload: &[u8],
    ) -> Result<KeystoreEntry, CardError> {
        if card_payload.len() < PAIRING_SIGNED_LEN + 8 {
            return Err(CardError::PairingFailed);
        }
        let signed = &card_payload[..PAIRING_SIGNED_LEN];
        let signature = Signature::from_der(&card_payload[PAIRING_SIGNED_LEN..])
            .map_err(|_| CardError::PairingFailed)?;
        let digest = Sha256::digest(signed);
        self.card_root_key
            .verify_prehash(&digest, &signature)
            .map_err(|_| CardError::PairingFailed)?;

        let card_key_id: [u8; 4] = signed[..4].try_into().unwrap();
        let card_nonce: [u8; 32] = signed[4..36].try_into().unwrap();

        let card_public: PublicKey = self.card_root_key.into();
        let shared = p256::ecdh::diffie_hellman(
            self.signing_key.as_nonzero_scalar(),
            card_public.as_affine(),
        );

        let (enc_key, mac_key) = expand_pairing_keys(
            shared.raw_secret_bytes().as_slice(),
            &card_nonce,
            device_nonce,
        );

        Ok(KeystoreEntry {
            key_id: card_key_id,
            enc_key: *enc_key,
            mac_key: *mac_key,
            used: true,
        })
    }
}

/// `SHA-512(shared_x || card_nonce || device_nonce)` split into enc/mac keys.
pub fn expand_pairing_keys(
    shared_x: &[u8],
    card_nonce: &[u8; 32],
    device_nonce: &[u8; 32],
) -> (Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>) {
    let mut hasher = Sha512::new();
    hasher.update(shared_x);
    hasher.update(card_nonce);
    hasher.update(device_nonce);
    let digest = hasher.finalize();

    let mut enc = Zeroizing::new([0u8; 32]);
    let mut mac = Zeroizing::new([0u8; 32]);
    enc.copy_from_slice(&digest[..32]);
    mac.copy_from_slice(&digest[32..]);
    (enc, mac)
}

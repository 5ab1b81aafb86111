//! secp256k1 operations: HD derivation, ECDSA signing and the BIP-340
//! output-key tweak.
//!
//! Private-path derivation walks bip32 extended keys exactly as the host
//! query supplies the raw `u32` steps; public-path derivation refuses
//! hardened steps. Scalar and point work stays inside k256, which is
//! constant-time for the operations used here.

use bip32::{ChildNumber, XPrv, XPub};
pub use bip32::Prefix;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::point::AffineCoordinates;
use k256::elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use k256::elliptic_curve::Group;
use k256::elliptic_curve::PrimeField;
use k256::{AffinePoint, EncodedPoint, ProjectivePoint, Scalar};
use x1_common::path::{Bip32Path, HARDENED};
use zeroize::Zeroizing;

use crate::hash::tagged_sha256;

/// SLIP-132 prefixes for the account-level xpub encodings the device
/// exposes.
pub const PREFIX_XPUB: Prefix = Prefix::XPUB;
pub const PREFIX_YPUB: Prefix = Prefix::from_parts_unchecked("ypub", 0x049d_7cb2);
pub const PREFIX_ZPUB: Prefix = Prefix::from_parts_unchecked("zpub", 0x04b2_4746);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveError {
    InvalidPoint,
    InvalidScalar,
    HardenedFromPublic,
    InvalidDerivationPath,
    SigningFailed,
}

impl core::fmt::Display for CurveError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CurveError::InvalidPoint => write!(f, "Invalid curve point"),
            CurveError::InvalidScalar => write!(f, "Invalid scalar"),
            CurveError::HardenedFromPublic => {
                write!(f, "Hardened derivation requires a private key")
            }
            CurveError::InvalidDerivationPath => write!(f, "Invalid derivation path"),
            CurveError::SigningFailed => write!(f, "Failed to produce signature"),
        }
    }
}

impl From<CurveError> for x1_common::Error {
    fn from(e: CurveError) -> Self {
        match e {
            CurveError::InvalidPoint => x1_common::Error::InvalidPoint,
            CurveError::InvalidScalar | CurveError::SigningFailed => {
                x1_common::Error::InvalidScalar
            }
            CurveError::HardenedFromPublic => x1_common::Error::HardenedFromPublic,
            CurveError::InvalidDerivationPath => x1_common::Error::InvalidDerivationPath,
        }
    }
}

/// A derived HD node; wraps the extended private key.
pub struct HdNode {
    xprv: XPrv,
}

impl HdNode {
    /// Derives the node at `path` from a BIP-39 seed.
    pub fn derive(seed: &[u8], path: &Bip32Path) -> Result<HdNode, CurveError> {
        let mut key = XPrv::new(seed).map_err(|_| CurveError::InvalidScalar)?;
        for &step in path.as_slice() {
            key = key
                .derive_child(ChildNumber::from(step))
                .map_err(|_| CurveError::InvalidDerivationPath)?;
        }
        Ok(HdNode { xprv: key })
    }

    /// The node's private key bytes; zeroed when the wrapper drops.
    pub fn private_key_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.xprv.private_key().to_bytes().into())
    }

    pub fn signing_key(&self) -> &SigningKey {
        self.xprv.private_key()
    }

    /// SEC1 compressed public key.
    pub fn public_key(&self) -> [u8; 33] {
        let point = self.xprv.private_key().verifying_key().to_encoded_point(true);
        point.as_bytes().try_into().expect("compressed point is 33 bytes")
    }

    /// SEC1 uncompressed public key.
    pub fn public_key_uncompressed(&self) -> [u8; 65] {
        let point = self
            .xprv
            .private_key()
            .verifying_key()
            .to_encoded_point(false);
        point.as_bytes().try_into().expect("uncompressed point is 65 bytes")
    }

    pub fn xpub(&self) -> XPub {
        self.xprv.public_key()
    }

    /// Serializes the extended public key under the given version prefix.
    pub fn xpub_string(&self, prefix: Prefix) -> String {
        self.xprv.public_key().to_extended_key(prefix).to_string()
    }
}

/// Non-hardened public derivation from an extended public key.
pub fn derive_pub(xpub: &XPub, steps: &[u32]) -> Result<XPub, CurveError> {
    let mut key = xpub.clone();
    for &step in steps {
        if step & HARDENED != 0 {
            return Err(CurveError::HardenedFromPublic);
        }
        key = key
            .derive_child(ChildNumber::from(step))
            .map_err(|_| CurveError::InvalidDerivationPath)?;
    }
    Ok(key)
}

/// Compressed SEC1 bytes of an extended public key.
pub fn xpub_compressed(xpub: &XPub) -> [u8; 33] {
    xpub.public_key()
        .to_encoded_point(true)
        .as_bytes()
        .try_into()
        .expect("compressed point is 33 bytes")
}

/// An ECDSA signature in fixed form with its recovery id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub recovery_id: u8,
}

impl RecoverableSignature {
    pub fn to_fixed_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r);
        out[32..].copy_from_slice(&self.s);
        out
    }
}

/// Deterministic (RFC 6979) ECDSA over a 32-byte digest, low-S normalized.
pub fn ecdsa_sign(privkey: &[u8; 32], digest: &[u8; 32]) -> Result<RecoverableSignature, CurveError> {
    let key = SigningKey::from_bytes(privkey.into()).map_err(|_| CurveError::InvalidScalar)?;
    let (sig, recid) = key
        .sign_prehash_recoverable(digest)
        .map_err(|_| CurveError::SigningFailed)?;

    // k256 already normalizes; flip the recovery parity if it ever did not.
    let (sig, recid) = match sig.normalize_s() {
        Some(normalized) => (
            normalized,
            RecoveryId::from_byte(recid.to_byte() ^ 1).ok_or(CurveError::SigningFailed)?,
        ),
        None => (sig, recid),
    };

    let bytes = sig.to_bytes();
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    r.copy_from_slice(&bytes[..32]);
    s.copy_from_slice(&bytes[32..]);
    Ok(RecoverableSignature {
        r,
        s,
        recovery_id: recid.to_byte(),
    })
}

/// Verifies a fixed-form signature over a 32-byte digest.
pub fn ecdsa_verify(pubkey: &[u8], digest: &[u8; 32], r: &[u8; 32], s: &[u8; 32]) -> Result<bool, CurveError> {
    let key = VerifyingKey::from_sec1_bytes(pubkey).map_err(|_| CurveError::InvalidPoint)?;
    let mut fixed = [0u8; 64];
    fixed[..32].copy_from_slice(r);
    fixed[32..].copy_from_slice(s);
    let sig = Signature::from_slice(&fixed).map_err(|_| CurveError::InvalidScalar)?;
    Ok(key.verify_prehash(digest, &sig).is_ok())
}

/// Compresses an uncompressed SEC1 public key.
pub fn compress_pubkey(pubkey: &[u8]) -> Result<[u8; 33], CurveError> {
    let key = VerifyingKey::from_sec1_bytes(pubkey).map_err(|_| CurveError::InvalidPoint)?;
    Ok(key
        .to_encoded_point(true)
        .as_bytes()
        .try_into()
        .expect("compressed point is 33 bytes"))
}

/// Uncompresses a compressed SEC1 public key.
pub fn decompress_pubkey(pubkey: &[u8]) -> Result<[u8; 65], CurveError> {
    let key = VerifyingKey::from_sec1_bytes(pubkey).map_err(|_| CurveError::InvalidPoint)?;
    Ok(key
        .to_encoded_point(false)
        .as_bytes()
        .try_into()
        .expect("uncompressed point is 65 bytes"))
}

/// BIP-340 output-key tweak for taproot addresses.
///
/// `Q = lift_x(P) + int(tagged_hash("TapTweak", x(P) || merkle_root)) · G`;
/// returns the x-only bytes of `Q`. Fails on an invalid point, a tweak of
/// zero, or a tweak outside the scalar field.
pub fn taproot_output_key(
    pubkey: &[u8],
    merkle_root: Option<&[u8; 32]>,
) -> Result<[u8; 32], CurveError> {
    let encoded = EncodedPoint::from_bytes(pubkey).map_err(|_| CurveError::InvalidPoint)?;
    let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
        .ok_or(CurveError::InvalidPoint)?;

    // lift_x: the internal key is the point with this x and even y.
    let mut internal = ProjectivePoint::from(affine);
    if bool::from(affine.y_is_odd()) {
        internal = -internal;
    }
    let x_bytes: [u8; 32] = affine.x().into();

    let mut preimage = [0u8; 64];
    preimage[..32].copy_from_slice(&x_bytes);
    let preimage_len = match merkle_root {
        Some(root) => {
            preimage[32..].copy_from_slice(root);
            64
        }
        None => 32,
    };
    let tweak_bytes = tagged_sha256("TapTweak", &preimage[..preimage_len]);

    let tweak = Option::<Scalar>::from(Scalar::from_repr(tweak_bytes.into()))
        .ok_or(CurveError::InvalidScalar)?;
    if bool::from(tweak.is_zero()) {
        return Err(CurveError::InvalidScalar);
    }

    let output = ProjectivePoint::GENERATOR * tweak + internal;
    if bool::from(output.is_identity()) {
        return Err(CurveError::InvalidPoint);
    }
    let output_x: [u8; 32] = output.to_affine().x().into();
    Ok(output_x)
}

//! Persisted data model of the device.
//!
//! All records are serialized with postcard by the store crate; the types
//! here only describe shape and invariants. A mnemonic or seed never appears
//! in any of these types; only Shamir shares of it do.

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Number of wallet slots on the device.
pub const MAX_WALLETS: usize = 4;
/// Number of smartcards in one family set.
pub const MAX_CARDS: usize = 4;
/// Wallet names are at most 16 bytes of UTF-8.
pub const WALLET_NAME_MAX: usize = 16;
/// Total Shamir shares per wallet: four card shares plus the device share.
pub const TOTAL_SHARES: u8 = 5;
/// Any two shares reconstruct the secret.
pub const SHARE_THRESHOLD: u8 = 2;
/// The device-resident share always uses this x-coordinate.
pub const DEVICE_SHARE_X: u8 = 5;
/// Upper bound for arbitrary-data wallet payloads.
pub const ARBITRARY_DATA_MAX: usize = 512;

/// Double-SHA-256 of the space-joined mnemonic; the device-wide wallet handle.
pub type WalletId = [u8; 32];
/// Four-byte identifier tying the four cards of a set to this device.
pub type FamilyId = [u8; 4];

/// User-selectable wallet properties, fixed at creation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalletFlags {
    /// Shares are AES-wrapped under a PIN-derived key.
    pub pin_set: bool,
    /// A BIP-39 passphrase is mixed into seed derivation.
    pub passphrase_on: bool,
    /// The secret is caller-supplied data rather than generated entropy.
    pub arbitrary_data: bool,
}

/// Lifecycle state of a wallet record.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalletState {
    /// Written to cards but the read-back check has not run yet.
    Unverified,
    /// Reconstruction from two shares reproduced the recorded wallet id.
    Valid,
    /// Reconstruction or a share MAC check failed; signing is refused.
    Invalid,
    /// A card reported the wallet locked; a proof-of-work challenge is
    /// pending.
    Locked,
    /// Creation was interrupted after at least one card accepted a share.
    Partial,
    /// Card shares exist but the device share is missing.
    NoDeviceShare,
}

/// Proof-of-work challenge issued by a card for a locked wallet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct PowChallenge {
    /// The digest must compare `<=` to this 32-byte big-endian target.
    pub target: [u8; 32],
    /// Card-issued random number mixed into the search preimage.
    pub random_number: [u8; 32],
    /// Current best/next nonce; persisted so a reboot resumes the search.
    pub nonce: [u8; 32],
    /// Rough unlock-time estimate shown to the user, in seconds.
    pub estimated_time_secs: u32,
    /// Card slot (1..=4) that issued the challenge.
    pub card_number: u8,
}

/// Bit set over the four card slots.
///
/// Bit `n` (0-based) is set iff card `n + 1` holds a share of the wallet and
/// has not since been told to delete it.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CardMask(pub u8);

impl CardMask {
    pub const ALL: CardMask = CardMask(0x0F);

    pub fn contains(&self, card_number: u8) -> bool {
        debug_assert!((1..=MAX_CARDS as u8).contains(&card_number));
        self.0 & (1 << (card_number - 1)) != 0
    }

    pub fn set(&mut self, card_number: u8) {
        self.0 |= 1 << (card_number - 1);
    }

    pub fn clear(&mut self, card_number: u8) {
        self.0 &= !(1 << (card_number - 1));
    }

    pub fn count(&self) -> u8 {
        (self.0 & 0x0F).count_ones() as u8
    }

    pub fn is_empty(&self) -> bool {
        self.0 & 0x0F == 0
    }

    /// One-hot mask for a single card slot, as used by the card applet's
    /// "acceptable cards" field.
    pub fn one_hot(card_number: u8) -> CardMask {
        CardMask(1 << (card_number - 1))
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (1..=MAX_CARDS as u8).filter(move |n| self.contains(*n))
    }
}

/// Persisted wallet metadata. One record per wallet id.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct WalletMeta {
    pub wallet_id: WalletId,
    pub name: String,
    pub flags: WalletFlags,
    pub state: WalletState,
    /// Which cards confirmed holding a share.
    pub cards_with_share: CardMask,
    /// Present only while `state == Locked`.
    pub challenge: Option<PowChallenge>,
}

impl WalletMeta {
    /// Signing flows only ever run against a verified wallet.
    pub fn allows_signing(&self) -> bool {
        self.state == WalletState::Valid
    }
}

/// Nonce and MAC stored alongside a PIN-wrapped share.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionHeader {
    pub iv: [u8; 16],
    pub mac: [u8; 16],
}

/// One Shamir share of a wallet secret.
///
/// `y` is the bytewise polynomial evaluation at `x`; when the wallet has a
/// PIN it is the AES-CBC ciphertext instead and `header` carries the IV and
/// MAC. The buffer is zeroed on drop either way.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    #[zeroize(skip)]
    pub x: u8,
    pub y: Vec<u8>,
    #[zeroize(skip)]
    pub header: Option<EncryptionHeader>,
}

impl Share {
    pub fn is_wrapped(&self) -> bool {
        self.header.is_some()
    }
}

/// Identity of one paired card, persisted per slot.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CardIdentity {
    pub card_key_id: [u8; 4],
    pub family_id: FamilyId,
    pub used: bool,
}

/// Pairing secret shared with one specific card.
///
/// Derived once during pairing via ECDH on nist256p1; session keys are
/// derived from it per exchange and never persisted.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeystoreEntry {
    #[zeroize(skip)]
    pub key_id: [u8; 4],
    pub enc_key: [u8; 32],
    pub mac_key: [u8; 32],
    #[zeroize(skip)]
    pub used: bool,
}

/// Device-wide configuration record (single instance).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceConfig {
    pub display_rotated: bool,
    pub passphrase_enabled: bool,
    pub logging_enabled: bool,
    /// Unset until the first card is paired.
    pub family_id: Option<FamilyId>,
    pub firmware_version: u32,
}

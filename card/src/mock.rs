//! In-memory card applet for tests.
//!
//! Implements the applet side of the protocol faithfully enough to exercise
//! the whole session layer: applet selection, pairing, the encrypted
//! channel, wallet share storage, proof-of-work locking and fault
//! injection.

use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::PublicKey;
use sha2::{Digest, Sha256};

use x1_common::types::{FamilyId, Share, WalletFlags, WalletId};
use x1_sdk::hash::sha256;

use crate::apdu::{self, Instruction, StatusWord, Tag};
use crate::error::{CardError, RetryCause};
use crate::ops::{flags_byte, flags_from_byte};
use crate::pairing::{expand_pairing_keys, PAIRING_SIGNED_LEN};
use crate::session::channel;
use crate::transport::Transport;

const MOCK_APPLET_VERSION: [u8; 3] = [1, 0, 3];
const MOCK_WALLET_CAPACITY: usize = 4;

struct StoredWallet {
    wallet_id: WalletId,
    name: String,
    flags: WalletFlags,
    share: Share,
    locked: bool,
    challenge: Option<([u8; 32], [u8; 32])>,
}

/// One simulated card.
pub struct MockCard {
    pub family_id: FamilyId,
    pub card_number: u8,
    pub key_id: [u8; 4],
    pub recovery_mode: bool,

    secret: SigningKey,
    device_key: Option<VerifyingKey>,

    pairing: Option<([u8; 32], [u8; 32])>,
    session: Option<(crate::session::ChannelKeys, u32)>,

    wallets: Vec<StoredWallet>,

    present: bool,
    /// Errors injected before the next `n` exchanges.
    inject_comm_faults: u32,
}

impl MockCard {
    pub fn new(card_number: u8, family_id: FamilyId, secret: [u8; 32]) -> MockCard {
        let secret = SigningKey::from_bytes((&secret).into()).expect("mock key is valid");
        let mut key_id = [0u8; 4];
        key_id.copy_from_slice(&sha256(&secret.to_bytes())[..4]);
        MockCard {
            family_id,
            card_number,
            key_id,
            recovery_mode: false,
            secret,
            device_key: None,
            pairing: None,
            session: None,
            wallets: Vec::new(),
            present: true,
            inject_comm_faults: 0,
        }
    }

    /// SEC1 public key of the card, the device's pairing trust anchor.
    pub fn public_key(&self) -> Vec<u8> {
        self.secret
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Provisions the device identity key the card accepts for pairing.
    pub fn provision_device_key(&mut self, device_key_sec1: &[u8]) {
        self.device_key = Some(
            VerifyingKey::from_sec1_bytes(device_key_sec1).expect("valid device key"),
        );
    }

    pub fn set_present(&mut self, present: bool) {
        self.present = present;
    }

    /// The next `count` exchanges fail with a transient comm fault.
    pub fn inject_comm_faults(&mut self, count: u32) {
        self.inject_comm_faults = count;
    }

    /// Marks a wallet locked with a proof-of-work challenge.
    pub fn lock_wallet(&mut self, wallet_id: &WalletId, target: [u8; 32], random: [u8; 32]) {
        if let Some(wallet) = self.wallets.iter_mut().find(|w| &w.wallet_id == wallet_id) {
            wallet.locked = true;
            wallet.challenge = Some((target, random));
        }
    }

    pub fn wallet_count(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_paired(&self) -> bool {
        self.pairing.is_some()
    }

    fn respond(&mut self, apdu_bytes: &[u8]) -> (Vec<u8>, StatusWord) {
        if apdu_bytes.len() < 5 {
            return (Vec::new(), StatusWord::WRONG_DATA);
        }
        let ins = apdu_bytes[1];
        let p1 = apdu_bytes[2];
        let p2 = apdu_bytes[3];
        let lc = apdu_bytes[4] as usize;
        let data = match apdu_bytes.get(5..5 + lc) {
            Some(d) => d,
            None => return (Vec::new(), StatusWord::WRONG_DATA),
        };

        match ins {
            x if x == Instruction::Select as u8 => self.on_select(),
            x if x == Instruction::Pair as u8 => self.on_pair(data),
            x if x == Instruction::EstablishSession as u8 => self.on_establish_session(data),
            x if x == Instruction::Unpair as u8 => {
                self.pairing = None;
                self.session = None;
                (Vec::new(), StatusWord::NO_ERROR)
            }
            _ => self.on_secure(ins, p1, p2, data),
        }
    }

    fn on_select(&mut self) -> (Vec<u8>, StatusWord) {
        self.session = None;
        let mut out = Vec::new();
        apdu::push_tlv(&mut out, Tag::Version, &MOCK_APPLET_VERSION);
        apdu::push_tlv(&mut out, Tag::FamilyId, &self.family_id);
        apdu::push_tlv(&mut out, Tag::CardNumber, &[1 << (self.card_number - 1)]);
        apdu::push_tlv(&mut out, Tag::CardKeyId, &self.key_id);
        apdu::push_tlv(&mut out, Tag::RecoveryMode, &[self.recovery_mode as u8]);
        (out, StatusWord::NO_ERROR)
    }

    fn on_pair(&mut self, data: &[u8]) -> (Vec<u8>, StatusWord) {
        let Some(device_key) = &self.device_key else {
            return (Vec::new(), StatusWord::SECURITY_CONDITIONS_NOT_SATISFIED);
        };
        if data.len() < PAIRING_SIGNED_LEN + 8 {
            return (Vec::new(), StatusWord::WRONG_DATA);
        }
        let signed = &data[..PAIRING_SIGNED_LEN];
        let Ok(signature) = Signature::from_der(&data[PAIRING_SIGNED_LEN..]) else {
            return (Vec::new(), StatusWord::WRONG_DATA);
        };
        let digest = Sha256::digest(signed);
        if device_key.verify_prehash(&digest, &signature).is_err() {
            return (Vec::new(), StatusWord::SECURITY_CONDITIONS_NOT_SATISFIED);
        }
        let device_nonce: [u8; 32] = signed[4..36].try_into().unwrap();

        // Card-side response payload, signed with the card key.
        let card_nonce = sha256(&[self.key_id.as_slice(), &device_nonce].concat());
        let mut payload = Vec::new();
        payload.extend_from_slice(&self.key_id);
        payload.extend_from_slice(&card_nonce);
        payload.extend_from_slice(&[0u8; 8]);
        let digest = Sha256::digest(&payload);
        let signature: Signature = self.secret.sign_prehash(&digest).expect("mock signing");
        payload.extend_from_slice(signature.to_der().as_bytes());

        // ECDH against the device identity key.
        let device_public: PublicKey = (*device_key).into();
        let shared = p256::ecdh::diffie_hellman(
            self.secret.as_nonzero_scalar(),
            device_public.as_affine(),
        );
        let (enc, mac) =
            expand_pairing_keys(shared.raw_secret_bytes().as_slice(), &card_nonce, &device_nonce);
        self.pairing = Some((*enc, *mac));

        (payload, StatusWord::NO_ERROR)
    }

    fn on_establish_session(&mut self, data: &[u8]) -> (Vec<u8>, StatusWord) {
        let Some((pair_enc, pair_mac)) = &self.pairing else {
            return (Vec::new(), StatusWord::NOT_PAIRED);
        };
        let Some(nonce) = apdu::find_tlv(data, Tag::SessionNonce).filter(|v| v.len() == 32)
        else {
            return (Vec::new(), StatusWord::WRONG_DATA);
        };
        let nonce: [u8; 32] = nonce.try_into().unwrap();
        self.session = Some((channel::derive(pair_enc, pair_mac, &nonce), 0));
        (Vec::new(), StatusWord::NO_ERROR)
    }

    fn on_secure(&mut self, ins: u8, p1: u8, p2: u8, data: &[u8]) -> (Vec<u8>, StatusWord) {
        let Some((keys, counter)) = self.session.take() else {
            return (Vec::new(), StatusWord::SECURITY_CONDITIONS_NOT_SATISFIED);
        };
        let header = [ins, p1, p2];
        let plain = match channel::open_request(&keys, counter, &header, data) {
            Ok(plain) => plain,
            Err(_) => {
                // Channel failure invalidates the session on the card too.
                return (Vec::new(), StatusWord::SECURITY_CONDITIONS_NOT_SATISFIED);
            }
        };

        let (out, status) = self.dispatch_secure(ins, p1, &plain);
        let sealed = if out.is_empty() {
            Vec::new()
        } else {
            channel::seal(&keys, counter, channel::TO_DEVICE, &[], &out)
        };
        self.session = Some((keys, counter + 1));
        (sealed, status)
    }

    fn dispatch_secure(&mut self, ins: u8, p1: u8, data: &[u8]) -> (Vec<u8>, StatusWord) {
        match ins {
            x if x == Instruction::AddWallet as u8 => self.on_add_wallet(data),
            x if x == Instruction::RetrieveWallet as u8 => self.on_retrieve_wallet(data),
            x if x == Instruction::DeleteWallet as u8 => self.on_delete_wallet(data),
            x if x == Instruction::ListWallets as u8 => self.on_list_wallets(),
            x if x == Instruction::SignEcdsa as u8 => self.on_sign(data),
            x if x == Instruction::ProofOfWork as u8 => self.on_pow(p1, data),
            _ => (Vec::new(), StatusWord::INVALID_INS),
        }
    }

    fn on_add_wallet(&mut self, data: &[u8]) -> (Vec<u8>, StatusWord) {
        let (Some(name), Some(id), Some(info), Some(x), Some(y)) = (
            apdu::find_tlv(data, Tag::Name),
            apdu::find_tlv(data, Tag::WalletId),
            apdu::find_tlv(data, Tag::WalletInfo),
            apdu::find_tlv(data, Tag::ShareX),
            apdu::find_tlv(data, Tag::WalletShare),
        ) else {
            return (Vec::new(), StatusWord::WRONG_DATA);
        };
        if id.len() != 32 || x.len() != 1 || info.len() != 1 {
            return (Vec::new(), StatusWord::WRONG_DATA);
        }
        let wallet_id: WalletId = id.try_into().unwrap();
        if self.wallets.iter().any(|w| w.wallet_id == wallet_id) {
            return (Vec::new(), StatusWord::CONDITIONS_NOT_SATISFIED);
        }
        if self.wallets.len() >= MOCK_WALLET_CAPACITY {
            return (Vec::new(), StatusWord::FILE_FULL);
        }

        let header = match (
            apdu::find_tlv(data, Tag::ShareIv),
            apdu::find_tlv(data, Tag::ShareMac),
        ) {
            (Some(iv), Some(mac)) if iv.len() == 16 && mac.len() == 16 => {
                Some(x1_common::types::EncryptionHeader {
                    iv: iv.try_into().unwrap(),
                    mac: mac.try_into().unwrap(),
                })
            }
            _ => None,
        };

        self.wallets.push(StoredWallet {
            wallet_id,
            name: String::from_utf8_lossy(name).into_owned(),
            flags: flags_from_byte(info[0]),
            share: Share {
                x: x[0],
                y: y.to_vec(),
                header,
            },
            locked: false,
            challenge: None,
        });
        (Vec::new(), StatusWord::NO_ERROR)
    }

    fn on_retrieve_wallet(&mut self, data: &[u8]) -> (Vec<u8>, StatusWord) {
        let Some(id) = apdu::find_tlv(data, Tag::WalletId).filter(|v| v.len() == 32) else {
            return (Vec::new(), StatusWord::WRONG_DATA);
        };
        let wallet_id: WalletId = id.try_into().unwrap();
        let Some(wallet) = self.wallets.iter().find(|w| w.wallet_id == wallet_id) else {
            return (Vec::new(), StatusWord::RECORD_NOT_FOUND);
        };
        if wallet.locked {
            return (Vec::new(), StatusWord::POW_WALLET_LOCKED);
        }

        let mut out = Vec::new();
        apdu::push_tlv(&mut out, Tag::Name, wallet.name.as_bytes());
        apdu::push_tlv(&mut out, Tag::WalletInfo, &[flags_byte(&wallet.flags)]);
        apdu::push_tlv(&mut out, Tag::ShareX, &[wallet.share.x]);
        apdu::push_tlv(&mut out, Tag::WalletShare, &wallet.share.y);
        if let Some(header) = &wallet.share.header {
            apdu::push_tlv(&mut out, Tag::ShareIv, &header.iv);
            apdu::push_tlv(&mut out, Tag::ShareMac, &header.mac);
        }
        (out, StatusWord::NO_ERROR)
    }

    fn on_delete_wallet(&mut self, data: &[u8]) -> (Vec<u8>, StatusWord) {
        let Some(id) = apdu::find_tlv(data, Tag::WalletId).filter(|v| v.len() == 32) else {
            return (Vec::new(), StatusWord::WRONG_DATA);
        };
        let wallet_id: WalletId = id.try_into().unwrap();
        let before = self.wallets.len();
        self.wallets.retain(|w| w.wallet_id != wallet_id);
        if self.wallets.len() == before {
            (Vec::new(), StatusWord::RECORD_NOT_FOUND)
        } else {
            (Vec::new(), StatusWord::NO_ERROR)
        }
    }

    fn on_list_wallets(&mut self) -> (Vec<u8>, StatusWord) {
        let mut out = Vec::new();
        for wallet in &self.wallets {
            apdu::push_tlv(&mut out, Tag::WalletId, &wallet.wallet_id);
        }
        (out, StatusWord::NO_ERROR)
    }

    fn on_sign(&mut self, data: &[u8]) -> (Vec<u8>, StatusWord) {
        let Some(digest) = apdu::find_tlv(data, Tag::SignedData).filter(|v| v.len() == 32)
        else {
            return (Vec::new(), StatusWord::WRONG_DATA);
        };
        let signature: Signature = match self.secret.sign_prehash(digest) {
            Ok(sig) => sig,
            Err(_) => return (Vec::new(), StatusWord::CONDITIONS_NOT_SATISFIED),
        };
        let mut out = Vec::new();
        apdu::push_tlv(&mut out, Tag::SignedData, signature.to_der().as_bytes());
        (out, StatusWord::NO_ERROR)
    }

    fn on_pow(&mut self, p1: u8, data: &[u8]) -> (Vec<u8>, StatusWord) {
        let Some(name) = apdu::find_tlv(data, Tag::Name) else {
            return (Vec::new(), StatusWord::WRONG_DATA);
        };
        let name = String::from_utf8_lossy(name).into_owned();
        let Some(wallet) = self.wallets.iter_mut().find(|w| w.name == name) else {
            return (Vec::new(), StatusWord::RECORD_NOT_FOUND);
        };
        let Some((target, random)) = wallet.challenge else {
            return (Vec::new(), StatusWord::CONDITIONS_NOT_SATISFIED);
        };

        match p1 {
            apdu::P1_POW_GET_CHALLENGE => {
                let mut out = Vec::new();
                apdu::push_tlv(&mut out, Tag::PowTarget, &target);
                apdu::push_tlv(&mut out, Tag::PowRandomNumber, &random);
                (out, StatusWord::NO_ERROR)
            }
            apdu::P1_POW_VERIFY_CHALLENGE => {
                let Some(nonce) = apdu::find_tlv(data, Tag::PowNonce).filter(|v| v.len() == 32)
                else {
                    return (Vec::new(), StatusWord::WRONG_DATA);
                };
                let mut preimage = Vec::new();
                preimage.extend_from_slice(name.as_bytes());
                preimage.extend_from_slice(&random);
                preimage.extend_from_slice(nonce);
                let digest = sha256(&preimage);
                if digest.as_slice() <= target.as_slice() {
                    wallet.locked = false;
                    wallet.challenge = None;
                    (Vec::new(), StatusWord::NO_ERROR)
                } else {
                    // Exponential difficulty bump: halve the target.
                    let mut harder = target;
                    shift_right_one_bit(&mut harder);
                    wallet.challenge = Some((harder, random));
                    (Vec::new(), StatusWord::POW_CHALLENGE_FAILED)
                }
            }
            _ => (Vec::new(), StatusWord::INVALID_INS),
        }
    }
}

fn shift_right_one_bit(bytes: &mut [u8; 32]) {
    let mut carry = 0u8;
    for byte in bytes.iter_mut() {
        let next_carry = *byte & 1;
        *byte = (*byte >> 1) | (carry << 7);
        carry = next_carry;
    }
}

impl Transport for MockCard {
    fn wait_for_card(&mut self, _timeout_ms: u32) -> Result<(), CardError> {
        if !self.present {
            return Err(CardError::Timeout);
        }
        Ok(())
    }

    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError> {
        if !self.present {
            return Err(CardError::Retriable(RetryCause::CardRemoved));
        }
        if self.inject_comm_faults > 0 {
            self.inject_comm_faults -= 1;
            return Err(CardError::Retriable(RetryCause::CommFault));
        }
        let (data, status) = self.respond(apdu);
        let mut raw = data;
        raw.extend_from_slice(&status.0.to_be_bytes());
        Ok(raw)
    }

    fn deselect(&mut self) {
        self.session = None;
    }
}

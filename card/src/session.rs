//! Card session state machine and the encrypted channel.

use log::{debug, warn};
use x1_common::error::CardFault;
use x1_common::types::{CardMask, FamilyId, KeystoreEntry};
use zeroize::Zeroizing;

use crate::apdu::{self, Apdu, Instruction, Response, StatusWord, Tag};
use crate::error::{CardError, RetryCause, RETRY_ATTEMPTS};
use crate::pairing::DeviceIdentity;
use crate::transport::Transport;

/// Applet major version this firmware speaks.
const SUPPORTED_APPLET_MAJOR: u8 = 1;

/// Default card-detection timeout.
pub const DEFAULT_TAP_TIMEOUT_MS: u32 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connected,
    Selected,
    Paired,
    SessionOpen,
}

/// Identity advertised by the tapped card during applet selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCard {
    pub family_id: FamilyId,
    /// 1..=4, decoded from the one-hot acceptable-cards byte.
    pub card_number: u8,
    pub key_id: [u8; 4],
    pub applet_version: [u8; 3],
    pub recovery_mode: bool,
}

pub(crate) struct ChannelKeys {
    pub enc: Zeroizing<[u8; 16]>,
    pub mac: Zeroizing<[u8; 32]>,
}

/// Holds the NFC transport exclusively for one card conversation.
pub struct CardSession<'t, T: Transport> {
    transport: &'t mut T,
    state: SessionState,
    selected: Option<SelectedCard>,
    keys: Option<ChannelKeys>,
    counter: u32,
}

impl<'t, T: Transport> CardSession<'t, T> {
    pub fn new(transport: &'t mut T) -> CardSession<'t, T> {
        CardSession {
            transport,
            state: SessionState::Idle,
            selected: None,
            keys: None,
            counter: 0,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn selected(&self) -> Option<&SelectedCard> {
        self.selected.as_ref()
    }

    /// Waits for a tap, selects the applet and validates the card against
    /// the expected family set and the acceptable-cards mask.
    pub fn connect(
        &mut self,
        expected_family: Option<&FamilyId>,
        acceptable: CardMask,
        timeout_ms: u32,
    ) -> Result<&SelectedCard, CardError> {
        self.reset();
        self.transport.wait_for_card(timeout_ms)?;
        self.state = SessionState::Connected;

        let response = self.plain_exchange(Apdu::new(Instruction::Select))?;
        require_ok(response.status)?;
        let card = parse_select_response(&response.data)?;

        if card.applet_version[0] != SUPPORTED_APPLET_MAJOR {
            return Err(CardError::Fault(CardFault::IncompatibleApplet));
        }
        if let Some(expected) = expected_family {
            if &card.family_id != expected {
                return Err(CardError::Fault(CardFault::WrongFamily));
            }
        }
        if !acceptable.contains(card.card_number) {
            debug!(
                "card {} tapped, acceptable mask {:04b}",
                card.card_number, acceptable.0
            );
            return Err(CardError::Retriable(RetryCause::AlignWithAntenna));
        }
        if card.recovery_mode {
            warn!("card {} reports recovery mode", card.card_number);
        }

        self.state = SessionState::Selected;
        self.selected = Some(card);
        Ok(self.selected.as_ref().unwrap())
    }

    /// Runs the one-time pairing exchange. The caller persists the returned
    /// keystore entry.
    pub fn pair(
        &mut self,
        identity: &DeviceIdentity,
        device_nonce: &[u8; 32],
    ) -> Result<KeystoreEntry, CardError> {
        if self.state != SessionState::Selected {
            return Err(CardError::BadState);
        }
        let request = identity.build_pairing_request(device_nonce)?;
        let response = self.plain_exchange(Apdu::new(Instruction::Pair).with_data(request))?;
        require_ok(response.status)?;
        let entry = identity.complete_pairing(device_nonce, &response.data)?;
        self.state = SessionState::Paired;
        Ok(entry)
    }

    /// Establishes per-tap session keys from a persisted pairing.
    ///
    /// The session key is `HMAC(pair_key, nonce)`; it lives until the card
    /// is deselected.
    pub fn open_session(
        &mut self,
        pairing: &KeystoreEntry,
        session_nonce: &[u8; 32],
    ) -> Result<(), CardError> {
        let card = match (&self.state, &self.selected) {
            (SessionState::Selected | SessionState::Paired, Some(card)) => card,
            _ => return Err(CardError::BadState),
        };
        if card.key_id != pairing.key_id {
            return Err(CardError::Fault(CardFault::SecurityConditionsNotMet));
        }

        let mut data = Vec::new();
        apdu::push_tlv(&mut data, Tag::SessionNonce, session_nonce);
        let response =
            self.plain_exchange(Apdu::new(Instruction::EstablishSession).with_data(data))?;
        require_ok(response.status)?;

        self.keys = Some(channel::derive(
            &pairing.enc_key,
            &pairing.mac_key,
            session_nonce,
        ));
        self.counter = 0;
        self.state = SessionState::SessionOpen;
        Ok(())
    }

    /// Sends one APDU over the encrypted channel and returns the decrypted
    /// response. A MAC failure in either direction drops back to IDLE.
    pub fn secure_exchange(&mut self, request: Apdu) -> Result<Response, CardError> {
        if self.state != SessionState::SessionOpen {
            return Err(CardError::BadState);
        }
        let keys = self.keys.as_ref().expect("keys exist in SessionOpen");
        let counter = self.counter;

        let header = [request.ins as u8, request.p1, request.p2];
        let sealed = channel::seal(keys, counter, channel::TO_CARD, &header, &request.data);
        let wire = Apdu {
            data: sealed,
            ..request
        };

        let raw = match self.transport.exchange(&wire.serialize()) {
            Ok(raw) => raw,
            Err(e) => {
                if !e.is_retriable() {
                    self.reset();
                }
                return Err(e);
            }
        };
        let response = Response::parse(&raw)?;

        let plain = if response.data.is_empty() {
            Vec::new()
        } else {
            let keys = self.keys.as_ref().expect("keys exist in SessionOpen");
            match channel::open(keys, counter, channel::TO_DEVICE, &response.data) {
                Ok(plain) => plain,
                Err(e) => {
                    warn!("card response failed channel authentication");
                    self.reset();
                    return Err(e);
                }
            }
        };

        self.counter += 1;
        Ok(Response {
            data: plain,
            status: response.status,
        })
    }

    /// Returns the card to IDLE. Abort paths must call this.
    pub fn deselect(&mut self) {
        self.transport.deselect();
        self.reset();
    }

    fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.selected = None;
        self.keys = None;
        self.counter = 0;
    }

    fn plain_exchange(&mut self, request: Apdu) -> Result<Response, CardError> {
        let raw = self.transport.exchange(&request.serialize())?;
        Response::parse(&raw)
    }
}

fn require_ok(status: StatusWord) -> Result<(), CardError> {
    match CardError::from_status(status) {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

fn parse_select_response(data: &[u8]) -> Result<SelectedCard, CardError> {
    let version = apdu::find_tlv(data, Tag::Version).ok_or(CardError::MalformedResponse)?;
    let family = apdu::find_tlv(data, Tag::FamilyId).ok_or(CardError::MalformedResponse)?;
    let number = apdu::find_tlv(data, Tag::CardNumber).ok_or(CardError::MalformedResponse)?;
    let key_id = apdu::find_tlv(data, Tag::CardKeyId).ok_or(CardError::MalformedResponse)?;
    let recovery = apdu::find_tlv(data, Tag::RecoveryMode)
        .map(|v| v.iter().any(|&b| b != 0))
        .unwrap_or(false);

    if version.len() != 3 || family.len() != 4 || number.len() != 1 || key_id.len() != 4 {
        return Err(CardError::MalformedResponse);
    }
    let card_number = match number[0] {
        0b0001 => 1,
        0b0010 => 2,
        0b0100 => 3,
        0b1000 => 4,
        _ => return Err(CardError::MalformedResponse),
    };

    Ok(SelectedCard {
        family_id: family.try_into().unwrap(),
        card_number,
        key_id: key_id.try_into().unwrap(),
        applet_version: version.try_into().unwrap(),
        recovery_mode: recovery,
    })
}

/// Retries an operation on transient faults, up to the bounded budget.
pub fn with_retry<R>(mut op: impl FnMut() -> Result<R, CardError>) -> Result<R, CardError> {
    let mut last = CardError::Retriable(RetryCause::CommFault);
    for attempt in 1..=RETRY_ATTEMPTS {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() => {
                warn!("card operation attempt {}/{} failed: {}", attempt, RETRY_ATTEMPTS, e);
                last = e;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last)
}

/// Symmetric channel crypto, shared with the mock applet.
pub(crate) mod channel {
    use subtle::ConstantTimeEq;
    use x1_sdk::cipher::{aes128_cbc_decrypt, aes128_cbc_encrypt, pad_iso9797_m2, unpad_iso9797_m2};
    use x1_sdk::hash::hmac_sha256;
    use zeroize::Zeroizing;

    use super::ChannelKeys;
    use crate::error::CardError;

    pub const TO_CARD: u8 = 0x00;
    pub const TO_DEVICE: u8 = 0x01;

    const MAC_LEN: usize = 16;
    const IV_LEN: usize = 16;

    /// Per-tap keys: `HMAC(pair_key, nonce)` for each of enc and mac.
    pub fn derive(pair_enc: &[u8; 32], pair_mac: &[u8; 32], nonce: &[u8; 32]) -> ChannelKeys {
        let enc_full = hmac_sha256(pair_enc, nonce);
        let mut enc = Zeroizing::new([0u8; 16]);
        enc.copy_from_slice(&enc_full[..16]);
        ChannelKeys {
            enc,
            mac: Zeroizing::new(hmac_sha256(pair_mac, nonce)),
        }
    }

    fn derive_iv(keys: &ChannelKeys, direction: u8, counter: u32) -> [u8; 16] {
        let mut label = [0u8; 5];
        label[0] = direction;
        label[1..].copy_from_slice(&counter.to_be_bytes());
        let digest = hmac_sha256(keys.mac.as_ref(), &label);
        digest[..IV_LEN].try_into().unwrap()
    }

    fn compute_mac(
        keys: &ChannelKeys,
        direction: u8,
        counter: u32,
        header: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
    ) -> [u8; MAC_LEN] {
        let mut preimage = Vec::with_capacity(5 + header.len() + iv.len() + ciphertext.len());
        preimage.push(direction);
        preimage.extend_from_slice(&counter.to_be_bytes());
        preimage.extend_from_slice(header);
        preimage.extend_from_slice(iv);
        preimage.extend_from_slice(ciphertext);
        let digest = hmac_sha256(keys.mac.as_ref(), &preimage);
        digest[..MAC_LEN].try_into().unwrap()
    }

    /// `iv || ciphertext || mac16` with method-2 padding.
    pub fn seal(
        keys: &ChannelKeys,
        counter: u32,
        direction: u8,
        header: &[u8],
        payload: &[u8],
    ) -> Vec<u8> {
        let iv = derive_iv(keys, direction, counter);
        let mut padded = payload.to_vec();
        pad_iso9797_m2(&mut padded);
        let ciphertext = aes128_cbc_encrypt(&*keys.enc, &iv, &padded)
            .expect("padded payload is block aligned");
        let mac = compute_mac(keys, direction, counter, header, &iv, &ciphertext);

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len() + MAC_LEN);
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out.extend_from_slice(&mac);
        out
    }

    /// Verifies and decrypts `iv || ciphertext || mac16`. For responses the
    /// header is implicit (empty).
    pub fn open(
        keys: &ChannelKeys,
        counter: u32,
        direction: u8,
        wire: &[u8],
    ) -> Result<Vec<u8>, CardError> {
        if wire.len() < IV_LEN + MAC_LEN || (wire.len() - IV_LEN - MAC_LEN) % 16 != 0 {
            return Err(CardError::MalformedResponse);
        }
        let (iv, rest) = wire.split_at(IV_LEN);
        let (ciphertext, mac) = rest.split_at(rest.len() - MAC_LEN);

        let expected = compute_mac(keys, direction, counter, &[], iv, ciphertext);
        if expected.ct_eq(mac).unwrap_u8() == 0 {
            return Err(CardError::MacMismatch);
        }

        let iv: [u8; 16] = iv.try_into().unwrap();
        let mut plain = aes128_cbc_decrypt(&*keys.enc, &iv, ciphertext)
            .map_err(|_| CardError::MalformedResponse)?;
        unpad_iso9797_m2(&mut plain).map_err(|_| CardError::MacMismatch)?;
        Ok(plain)
    }

    /// Request variant of [`open`], checking the APDU header binding.
    pub fn open_request(
        keys: &ChannelKeys,
        counter: u32,
        header: &[u8],
        wire: &[u8],
    ) -> Result<Vec<u8>, CardError> {
        if wire.len() < IV_LEN + MAC_LEN || (wire.len() - IV_LEN - MAC_LEN) % 16 != 0 {
            return Err(CardError::MalformedResponse);
        }
        let (iv, rest) = wire.split_at(IV_LEN);
        let (ciphertext, mac) = rest.split_at(rest.len() - MAC_LEN);

        let expected = compute_mac(keys, TO_CARD, counter, header, iv, ciphertext);
        if expected[..].ct_eq(mac).unwrap_u8() == 0 {
            return Err(CardError::MacMismatch);
        }

        let iv: [u8; 16] = iv.try_into().unwrap();
        let mut plain = aes128_cbc_decrypt(&*keys.enc, &iv, ciphertext)
            .map_err(|_| CardError::MalformedResponse)?;
        unpad_iso9797_m2(&mut plain).map_err(|_| CardError::MacMismatch)?;
        Ok(plain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_seal_open_roundtrip() {
        let keys = channel::derive(&[1u8; 32], &[2u8; 32], &[3u8; 32]);
        let sealed = channel::seal(&keys, 7, channel::TO_DEVICE, &[], b"share bytes");
        let opened = channel::open(&keys, 7, channel::TO_DEVICE, &sealed).unwrap();
        assert_eq!(opened, b"share bytes");
    }

    #[test]
    fn test_channel_rejects_tampering() {
        let keys = channel::derive(&[1u8; 32], &[2u8; 32], &[3u8; 32]);
        let mut sealed = channel::seal(&keys, 0, channel::TO_DEVICE, &[], b"payload");
        sealed[20] ^= 0x01;
        assert_eq!(
            channel::open(&keys, 0, channel::TO_DEVICE, &sealed),
            Err(CardError::MacMismatch)
        );
    }

    #[test]
    fn test_channel_counter_binding() {
        let keys = channel::derive(&[1u8; 32], &[2u8; 32], &[3u8; 32]);
        let sealed = channel::seal(&keys, 1, channel::TO_DEVICE, &[], b"payload");
        assert!(channel::open(&keys, 2, channel::TO_DEVICE, &sealed).is_err());
    }

    #[test]
    fn test_session_nonce_changes_keys() {
        let a = channel::derive(&[1u8; 32], &[2u8; 32], &[3u8; 32]);
        let b = channel::derive(&[1u8; 32], &[2u8; 32], &[4u8; 32]);
        assert_ne!(a.enc.as_ref(), b.enc.as_ref());
    }
}

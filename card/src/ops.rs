//! Typed wallet operations over an open session.

use x1_common::types::{EncryptionHeader, Share, WalletFlags, WalletId};

use crate::apdu::{
    self, Apdu, Instruction, Tag, P1_POW_GET_CHALLENGE, P1_POW_VERIFY_CHALLENGE,
};
use crate::error::CardError;
use crate::session::CardSession;
use crate::transport::Transport;

pub fn flags_byte(flags: &WalletFlags) -> u8 {
    (flags.pin_set as u8) | (flags.passphrase_on as u8) << 1 | (flags.arbitrary_data as u8) << 2
}

pub fn flags_from_byte(byte: u8) -> WalletFlags {
    WalletFlags {
        pin_set: byte & 0x01 != 0,
        passphrase_on: byte & 0x02 != 0,
        arbitrary_data: byte & 0x04 != 0,
    }
}

impl<T: Transport> CardSession<'_, T> {
    /// Writes one share of a wallet onto the card.
    pub fn add_wallet(
        &mut self,
        name: &str,
        wallet_id: &WalletId,
        flags: &WalletFlags,
        share: &Share,
    ) -> Result<(), CardError> {
        let mut data = Vec::new();
        apdu::push_tlv(&mut data, Tag::Name, name.as_bytes());
        apdu::push_tlv(&mut data, Tag::WalletId, wallet_id);
        apdu::push_tlv(&mut data, Tag::WalletInfo, &[flags_byte(flags)]);
        apdu::push_tlv(&mut data, Tag::ShareX, &[share.x]);
        apdu::push_tlv(&mut data, Tag::WalletShare, &share.y);
        if let Some(header) = &share.header {
            apdu::push_tlv(&mut data, Tag::ShareIv, &header.iv);
            apdu::push_tlv(&mut data, Tag::ShareMac, &header.mac);
        }

        let response = self.secure_exchange(Apdu::new(Instruction::AddWallet).with_data(data))?;
        match CardError::from_status(response.status) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Reads a wallet's share back. A locked wallet surfaces
    /// [`CardError::WalletLocked`] and starts the proof-of-work sub-flow.
    pub fn retrieve_wallet(&mut self, wallet_id: &WalletId) -> Result<Share, CardError> {
        let mut data = Vec::new();
        apdu::push_tlv(&mut data, Tag::WalletId, wallet_id);
        let response =
            self.secure_exchange(Apdu::new(Instruction::RetrieveWallet).with_data(data))?;
        if let Some(e) = CardError::from_status(response.status) {
            return Err(e);
        }

        let x = apdu::find_tlv(&response.data, Tag::ShareX)
            .filter(|v| v.len() == 1)
            .ok_or(CardError::MalformedResponse)?[0];
        let y = apdu::find_tlv(&response.data, Tag::WalletShare)
            .ok_or(CardError::MalformedResponse)?
            .to_vec();
        let iv = apdu::find_tlv(&response.data, Tag::ShareIv);
        let mac = apdu::find_tlv(&response.data, Tag::ShareMac);
        let header = match (iv, mac) {
            (Some(iv), Some(mac)) if iv.len() == 16 && mac.len() == 16 => Some(EncryptionHeader {
                iv: iv.try_into().unwrap(),
                mac: mac.try_into().unwrap(),
            }),
            (None, None) => None,
            _ => return Err(CardError::MalformedResponse),
        };

        Ok(Share { x, y, header })
    }

    /// Deletes a wallet's share. `record_not_found` counts as success: the
    /// card already lacks the share the device wanted gone.
    pub fn delete_wallet(&mut self, wallet_id: &WalletId) -> Result<(), CardError> {
        let mut data = Vec::new();
        apdu::push_tlv(&mut data, Tag::WalletId, wallet_id);
        let response =
            self.secure_exchange(Apdu::new(Instruction::DeleteWallet).with_data(data))?;
        match CardError::from_status(response.status) {
            None | Some(CardError::NotFound) => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Lists the wallet ids present on the card.
    pub fn list_wallets(&mut self) -> Result<Vec<WalletId>, CardError> {
        let response = self.secure_exchange(Apdu::new(Instruction::ListWallets))?;
        if let Some(e) = CardError::from_status(response.status) {
            return Err(e);
        }
        apdu::find_all_tlv(&response.data, Tag::WalletId)
            .into_iter()
            .map(|v| {
                v.try_into()
                    .map_err(|_| CardError::MalformedResponse)
            })
            .collect()
    }

    /// Asks the card's applet key to sign a 32-byte digest; returns DER.
    pub fn sign_ecdsa(&mut self, digest: &[u8; 32]) -> Result<Vec<u8>, CardError> {
        let mut data = Vec::new();
        apdu::push_tlv(&mut data, Tag::SignedData, digest);
        let response = self.secure_exchange(Apdu::new(Instruction::SignEcdsa).with_data(data))?;
        if let Some(e) = CardError::from_status(response.status) {
            return Err(e);
        }
        apdu::find_tlv(&response.data, Tag::SignedData)
            .map(|v| v.to_vec())
            .ok_or(CardError::MalformedResponse)
    }

    /// Fetches `{target, random_number}` for a locked wallet.
    pub fn pow_get_challenge(
        &mut self,
        wallet_name: &str,
    ) -> Result<([u8; 32], [u8; 32]), CardError> {
        let mut data = Vec::new();
        apdu::push_tlv(&mut data, Tag::Name, wallet_name.as_bytes());
        let response = self.secure_exchange(
            Apdu::new(Instruction::ProofOfWork)
                .with_p1(P1_POW_GET_CHALLENGE)
                .with_data(data),
        )?;
        if let Some(e) = CardError::from_status(response.status) {
            return Err(e);
        }
        let target = apdu::find_tlv(&response.data, Tag::PowTarget)
            .filter(|v| v.len() == 32)
            .ok_or(CardError::MalformedResponse)?;
        let random = apdu::find_tlv(&response.data, Tag::PowRandomNumber)
            .filter(|v| v.len() == 32)
            .ok_or(CardError::MalformedResponse)?;
        Ok((target.try_into().unwrap(), random.try_into().unwrap()))
    }

    /// Submits a found nonce; [`CardError::ChallengeFailed`] means the card
    /// issued a fresh, harder challenge.
    pub fn pow_verify_challenge(
        &mut self,
        wallet_name: &str,
        nonce: &[u8; 32],
    ) -> Result<(), CardError> {
        let mut data = Vec::new();
        apdu::push_tlv(&mut data, Tag::Name, wallet_name.as_bytes());
        apdu::push_tlv(&mut data, Tag::PowNonce, nonce);
        let response = self.secure_exchange(
            Apdu::new(Instruction::ProofOfWork)
                .with_p1(P1_POW_VERIFY_CHALLENGE)
                .with_data(data),
        )?;
        match CardError::from_status(response.status) {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_byte_roundtrip() {
        let flags = WalletFlags {
            pin_set: true,
            passphrase_on: false,
            arbitrary_data: true,
        };
        assert_eq!(flags_byte(&flags), 0b101);
        assert_eq!(flags_from_byte(0b101), flags);
    }
}

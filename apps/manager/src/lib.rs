//! Manager app: device information and card authentication.

use log::info;
use x1_card::session::{with_retry, CardSession, DEFAULT_TAP_TIMEOUT_MS};
use x1_card::transport::Transport;
use x1_common::types::CardMask;
use x1_common::Error;
use x1_proto::{
    auth_card_request, auth_card_response, AuthCardRequest, AuthCardResponse, AuthCardSignature,
    GetDeviceInfoResponse,
};
use x1_sdk::hash::sha256;
use x1_sdk::rand::Drbg;
use x1_sdk::ux::{Decision, UserConsent};
use x1_store::{FlashMedium, Store};

/// `get_device_info`: configuration snapshot for the host.
pub fn get_device_info<M: FlashMedium>(store: &Store<M>) -> GetDeviceInfoResponse {
    let config = store.device_config();
    let paired = (1..=x1_common::types::MAX_CARDS as u8)
        .filter(|n| store.keystore_entry(*n).is_some())
        .count() as u32;
    GetDeviceInfoResponse {
        firmware_version: config.firmware_version,
        family_id: config.family_id.map(|f| f.to_vec()).unwrap_or_default(),
        paired_card_count: paired,
        passphrase_enabled: config.passphrase_enabled,
        logging_enabled: config.logging_enabled,
        wallet_count: store.wallets().len() as u32,
    }
}

/// Holds the `auth_card` flow between the initiate and challenge queries.
pub struct AuthCardFlow {
    card_number: u8,
}

impl AuthCardFlow {
    /// Validates the initiate sub-request.
    pub fn initiate(request: &AuthCardRequest) -> Result<AuthCardFlow, Error> {
        let Some(auth_card_request::Request::Initiate(init)) = &request.request else {
            return Err(Error::InvalidRequest);
        };
        let card_number = init.card_index as u8;
        if !(1..=x1_common::types::MAX_CARDS as u8).contains(&card_number) {
            return Err(Error::InvalidRequest);
        }
        Ok(AuthCardFlow { card_number })
    }

    /// Asks the tapped card to sign the host's challenge with its applet
    /// key and returns serial + DER signature.
    pub fn challenge<M: FlashMedium, T: Transport>(
        &self,
        store: &Store<M>,
        transport: &mut T,
        rng: &mut Drbg,
        consent: &mut dyn UserConsent,
        challenge: &[u8],
    ) -> Result<AuthCardResponse, Error> {
        if challenge.is_empty() || challenge.len() > 64 {
            return Err(Error::InvalidData);
        }
        match consent.confirm(&format!("Authenticate card {}?", self.card_number)) {
            Decision::Approved => {}
            Decision::Rejected => return Err(Error::UserRejection),
            Decision::TimedOut => return Err(Error::Timeout),
        }

        let pairing = store
            .keystore_entry(self.card_number)
            .ok_or(Error::CardSecurityFault(
                x1_common::error::CardFault::SecurityConditionsNotMet,
            ))?;
        let family = store.device_config().family_id;
        let digest = sha256(challenge);
        let card_number = self.card_number;

        let (key_id, signature) = with_retry(|| {
            let mut nonce = [0u8; 32];
            rng.fill(&mut nonce);
            let mut session = CardSession::new(&mut *transport);
            let result = (|| {
                let card = session.connect(
                    family.as_ref(),
                    CardMask::one_hot(card_number),
                    DEFAULT_TAP_TIMEOUT_MS,
                )?;
                let key_id = card.key_id;
                session.open_session(&pairing, &nonce)?;
                let signature = session.sign_ecdsa(&digest)?;
                Ok((key_id, signature))
            })();
            session.deselect();
            result
        })
        .map_err(Error::from)?;

        info!("card {} authenticated for host challenge", self.card_number);
        Ok(AuthCardResponse {
            response: Some(auth_card_response::Response::Signature(AuthCardSignature {
                card_key_id: key_id.to_vec(),
                signature,
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use x1_card::mock::MockCard;
    use x1_card::pairing::DeviceIdentity;
    use x1_proto::AuthCardInitiateRequest;
    use x1_sdk::rand::testing::FixedEntropy;
    use x1_sdk::ux::testing::AutoApprove;
    use x1_store::MockFlash;

    const FAMILY: [u8; 4] = [9, 9, 9, 9];

    fn paired_setup() -> (Store<MockFlash>, MockCard, Drbg) {
        let mut card = MockCard::new(2, FAMILY, [0x21u8; 32]);
        let identity = DeviceIdentity::new(
            [0, 0, 0, 1],
            [0; 8],
            &[0x42u8; 32],
            &card.public_key(),
        )
        .unwrap();
        card.provision_device_key(&identity.public_key());

        let mut store = Store::open(MockFlash::new()).unwrap();
        let rng = Drbg::seeded(&mut [&mut FixedEntropy(1)]);

        let entry = {
            let mut session = CardSession::new(&mut card);
            session
                .connect(None, CardMask::one_hot(2), 1000)
                .unwrap();
            session.pair(&identity, &[0x44u8; 32]).unwrap()
        };
        store.put_keystore_entry(2, &entry).unwrap();
        let mut config = store.device_config();
        config.family_id = Some(FAMILY);
        config.firmware_version = 0x0001_0203;
        store.put_device_config(&config).unwrap();
        store.commit().unwrap();
        (store, card, rng)
    }

    #[test]
    fn test_device_info_reports_pairing_state() {
        let (store, _card, _rng) = paired_setup();
        let info = get_device_info(&store);
        assert_eq!(info.paired_card_count, 1);
        assert_eq!(info.family_id, FAMILY.to_vec());
        assert_eq!(info.firmware_version, 0x0001_0203);
        assert_eq!(info.wallet_count, 0);
    }

    #[test]
    fn test_auth_card_roundtrip() {
        let (store, mut card, mut rng) = paired_setup();
        let flow = AuthCardFlow::initiate(&AuthCardRequest {
            request: Some(auth_card_request::Request::Initiate(
                AuthCardInitiateRequest { card_index: 2 },
            )),
        })
        .unwrap();

        let mut consent = AutoApprove::default();
        let response = flow
            .challenge(&store, &mut card, &mut rng, &mut consent, b"host-challenge")
            .unwrap();
        let Some(auth_card_response::Response::Signature(sig)) = response.response else {
            panic!("expected signature");
        };
        assert_eq!(sig.card_key_id, card.key_id.to_vec());
        assert_eq!(sig.signature[0], 0x30); // DER
    }

    #[test]
    fn test_auth_card_rejects_bad_slot() {
        let result = AuthCardFlow::initiate(&AuthCardRequest {
            request: Some(auth_card_request::Request::Initiate(
                AuthCardInitiateRequest { card_index: 9 },
            )),
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_auth_card_requires_pairing() {
        let (_, mut card, mut rng) = paired_setup();
        let empty_store = Store::open(MockFlash::new()).unwrap();
        let flow = AuthCardFlow::initiate(&AuthCardRequest {
            request: Some(auth_card_request::Request::Initiate(
                AuthCardInitiateRequest { card_index: 2 },
            )),
        })
        .unwrap();
        let mut consent = AutoApprove::default();
        assert!(flow
            .challenge(&empty_store, &mut card, &mut rng, &mut consent, b"x")
            .is_err());
    }
}

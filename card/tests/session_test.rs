//! End-to-end session tests against the mock applet.

use x1_card::apdu::StatusWord;
use x1_card::error::{CardError, RetryCause};
use x1_card::mock::MockCard;
use x1_card::pairing::DeviceIdentity;
use x1_card::session::{with_retry, CardSession, SessionState};
use x1_common::error::CardFault;
use x1_common::types::{CardMask, Share};

const FAMILY: [u8; 4] = [0xF0, 0x0D, 0xBA, 0xBE];

fn device_for(card: &MockCard) -> DeviceIdentity {
    DeviceIdentity::new(
        [0xDE, 0xAD, 0xBE, 0xEF],
        [0x80, 0, 0, 2, 0x80, 0, 0, 7],
        &[0x42u8; 32],
        &card.public_key(),
    )
    .unwrap()
}

fn paired_card() -> (MockCard, DeviceIdentity, x1_common::types::KeystoreEntry) {
    let mut card = MockCard::new(1, FAMILY, [0x33u8; 32]);
    let identity = device_for(&card);
    card.provision_device_key(&identity.public_key());

    let entry = {
        let mut session = CardSession::new(&mut card);
        session
            .connect(Some(&FAMILY), CardMask::one_hot(1), 1000)
            .unwrap();
        session.pair(&identity, &[0x55u8; 32]).unwrap()
    };
    (card, identity, entry)
}

#[test]
fn pair_then_wallet_roundtrip() {
    let (mut card, _identity, entry) = paired_card();
    assert!(card.is_paired());

    let mut session = CardSession::new(&mut card);
    session
        .connect(Some(&FAMILY), CardMask::one_hot(1), 1000)
        .unwrap();
    session.open_session(&entry, &[0x77u8; 32]).unwrap();
    assert_eq!(session.state(), SessionState::SessionOpen);

    let share = Share {
        x: 1,
        y: vec![0xAB; 32],
        header: None,
    };
    session
        .add_wallet("personal", &[0x11u8; 32], &Default::default(), &share)
        .unwrap();

    let read_back = session.retrieve_wallet(&[0x11u8; 32]).unwrap();
    assert_eq!(read_back, share);

    let listed = session.list_wallets().unwrap();
    assert_eq!(listed, vec![[0x11u8; 32]]);

    session.delete_wallet(&[0x11u8; 32]).unwrap();
    // deleting again is record-not-found, which counts as success
    session.delete_wallet(&[0x11u8; 32]).unwrap();
    session.deselect();
    assert_eq!(card.wallet_count(), 0);
}

#[test]
fn wrong_family_is_fatal() {
    let mut card = MockCard::new(1, [9, 9, 9, 9], [0x33u8; 32]);
    let mut session = CardSession::new(&mut card);
    assert_eq!(
        session
            .connect(Some(&FAMILY), CardMask::one_hot(1), 1000)
            .unwrap_err(),
        CardError::Fault(CardFault::WrongFamily)
    );
}

#[test]
fn wrong_card_slot_is_retriable() {
    let mut card = MockCard::new(3, FAMILY, [0x33u8; 32]);
    let mut session = CardSession::new(&mut card);
    let err = session
        .connect(Some(&FAMILY), CardMask::one_hot(1), 1000)
        .unwrap_err();
    assert!(err.is_retriable());
}

#[test]
fn unpaired_session_is_refused() {
    let mut card = MockCard::new(1, FAMILY, [0x33u8; 32]);
    let entry = x1_common::types::KeystoreEntry {
        key_id: card.key_id,
        enc_key: [0u8; 32],
        mac_key: [0u8; 32],
        used: true,
    };
    let mut session = CardSession::new(&mut card);
    session
        .connect(Some(&FAMILY), CardMask::one_hot(1), 1000)
        .unwrap();
    assert!(session.open_session(&entry, &[0u8; 32]).is_err());
}

#[test]
fn retry_recovers_from_transient_faults() {
    let (mut card, _identity, entry) = paired_card();
    card.inject_comm_faults(2);

    let result = with_retry(|| {
        let mut session = CardSession::new(&mut card);
        session.connect(Some(&FAMILY), CardMask::one_hot(1), 1000)?;
        session.open_session(&entry, &[0x70u8; 32])?;
        session.list_wallets()
    });
    assert_eq!(result.unwrap(), Vec::<[u8; 32]>::new());
}

#[test]
fn retry_budget_is_bounded() {
    let (mut card, _identity, entry) = paired_card();
    card.inject_comm_faults(100);

    let result = with_retry(|| {
        let mut session = CardSession::new(&mut card);
        session.connect(Some(&FAMILY), CardMask::one_hot(1), 1000)?;
        session.open_session(&entry, &[0x70u8; 32])?;
        session.list_wallets()
    });
    assert_eq!(result.unwrap_err(), CardError::Retriable(RetryCause::CommFault));
}

#[test]
fn locked_wallet_surfaces_wallet_locked() {
    let (mut card, _identity, entry) = paired_card();

    {
        let mut session = CardSession::new(&mut card);
        session
            .connect(Some(&FAMILY), CardMask::one_hot(1), 1000)
            .unwrap();
        session.open_session(&entry, &[0x71u8; 32]).unwrap();
        session
            .add_wallet(
                "locked",
                &[0x22u8; 32],
                &Default::default(),
                &Share {
                    x: 1,
                    y: vec![1u8; 32],
                    header: None,
                },
            )
            .unwrap();
        session.deselect();
    }

    card.lock_wallet(&[0x22u8; 32], [0xFF; 32], [0x01; 32]);

    let mut session = CardSession::new(&mut card);
    session
        .connect(Some(&FAMILY), CardMask::one_hot(1), 1000)
        .unwrap();
    session.open_session(&entry, &[0x72u8; 32]).unwrap();
    assert_eq!(
        session.retrieve_wallet(&[0x22u8; 32]).unwrap_err(),
        CardError::WalletLocked
    );

    // all-ones target accepts any nonce
    let (target, random) = session.pow_get_challenge("locked").unwrap();
    assert_eq!(target, [0xFF; 32]);
    assert_eq!(random, [0x01; 32]);
    session.pow_verify_challenge("locked", &[0u8; 32]).unwrap();
    assert!(session.retrieve_wallet(&[0x22u8; 32]).is_ok());
}

#[test]
fn card_signs_auth_challenge() {
    let (mut card, _identity, entry) = paired_card();
    let mut session = CardSession::new(&mut card);
    session
        .connect(Some(&FAMILY), CardMask::one_hot(1), 1000)
        .unwrap();
    session.open_session(&entry, &[0x73u8; 32]).unwrap();

    let digest = [0x5Au8; 32];
    let der = session.sign_ecdsa(&digest).unwrap();
    assert_eq!(der[0], 0x30);
    assert!(StatusWord::NO_ERROR.is_success());
}

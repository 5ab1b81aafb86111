//! Lifecycle flows against a four-card mock bench.

use std::collections::VecDeque;

use x1_card::error::CardError;
use x1_card::mock::MockCard;
use x1_card::pairing::DeviceIdentity;
use x1_card::transport::Transport;
use x1_common::types::{WalletState, DEVICE_SHARE_X};
use x1_common::Error;
use x1_sdk::rand::testing::FixedEntropy;
use x1_sdk::rand::Drbg;
use x1_sdk::ux::testing::{AutoApprove, RejectAt};
use x1_store::{MockFlash, Store};
use x1_vault::lifecycle::{
    self, create_wallet, delete_wallet, pair_card, reconstruct_secret, restore_wallet,
    unlock_wallet, VaultEnv, WalletParams,
};
use x1_vault::{pin_key, reconstruct, split, unwrap_share, wrap_share};

const FAMILY: [u8; 4] = [0xCA, 0xFE, 0xF0, 0x0D];

/// Routes the single NFC transport to whichever card the scripted user
/// taps next; stays on the last card once the script runs out.
struct CardDeck {
    cards: Vec<MockCard>,
    taps: VecDeque<u8>,
    current: usize,
}

impl CardDeck {
    fn new(cards: Vec<MockCard>) -> CardDeck {
        CardDeck {
            cards,
            taps: VecDeque::new(),
            current: 0,
        }
    }

    fn script(&mut self, taps: &[u8]) {
        self.taps = taps.iter().copied().collect();
    }

    fn card(&mut self, number: u8) -> &mut MockCard {
        &mut self.cards[(number - 1) as usize]
    }
}

impl Transport for CardDeck {
    fn wait_for_card(&mut self, timeout_ms: u32) -> Result<(), CardError> {
        if let Some(next) = self.taps.pop_front() {
            self.current = (next - 1) as usize;
        }
        self.cards[self.current].wait_for_card(timeout_ms)
    }

    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError> {
        self.cards[self.current].exchange(apdu)
    }

    fn deselect(&mut self) {
        self.cards[self.current].deselect();
    }
}

struct Bench {
    deck: CardDeck,
    store: Store<MockFlash>,
    rng: Drbg,
    consent: AutoApprove,
}

impl Bench {
    fn new() -> Bench {
        let identity = DeviceIdentity::new(
            [1, 2, 3, 4],
            [0x80, 0, 0, 2, 0x80, 0, 0, 9],
            &[0x42u8; 32],
            // placeholder anchor; replaced per card below
            &MockCard::new(1, FAMILY, [0x33u8; 32]).public_key(),
        )
        .unwrap();

        let mut cards = Vec::new();
        for n in 1..=4u8 {
            let mut card = MockCard::new(n, FAMILY, [0x30 + n; 32]);
            card.provision_device_key(&identity.public_key());
            cards.push(card);
        }

        let mut bench = Bench {
            deck: CardDeck::new(cards),
            store: Store::open(MockFlash::new()).unwrap(),
            rng: Drbg::seeded(&mut [&mut FixedEntropy(11)]),
            consent: AutoApprove::default(),
        };

        // Pair all four cards; each card is its own trust anchor.
        for n in 1..=4u8 {
            let anchor = bench.deck.card(n).public_key();
            let identity = DeviceIdentity::new(
                [1, 2, 3, 4],
                [0x80, 0, 0, 2, 0x80, 0, 0, 9],
                &[0x42u8; 32],
                &anchor,
            )
            .unwrap();
            bench.deck.script(&[n]);
            let mut env = VaultEnv {
                store: &mut bench.store,
                transport: &mut bench.deck,
                consent: &mut bench.consent,
                rng: &mut bench.rng,
            };
            pair_card(&mut env, &identity, n).unwrap();
        }
        bench
    }

    fn env(&mut self) -> VaultEnv<'_, MockFlash, CardDeck> {
        VaultEnv {
            store: &mut self.store,
            transport: &mut self.deck,
            consent: &mut self.consent,
            rng: &mut self.rng,
        }
    }
}

fn params<'a>(name: &'a str, pin: Option<&'a str>) -> WalletParams<'a> {
    WalletParams {
        name,
        pin,
        passphrase_on: false,
    }
}

#[test]
fn create_wallet_reaches_valid_state() {
    let mut bench = Bench::new();
    bench.deck.script(&[1, 2, 3, 4, 1, 2]);

    let id = create_wallet(&mut bench.env(), &params("personal", None), 16).unwrap();

    let meta = bench.store.wallet(&id).unwrap();
    assert_eq!(meta.state, WalletState::Valid);
    assert_eq!(meta.cards_with_share.count(), 4);
    assert!(meta.allows_signing());

    let device_share = bench.store.device_share(&id).unwrap();
    assert_eq!(device_share.x, DEVICE_SHARE_X);
    for n in 1..=4u8 {
        assert_eq!(bench.deck.card(n).wallet_count(), 1);
    }
}

#[test]
fn create_aborts_cleanly_before_first_card_share() {
    let mut bench = Bench::new();
    bench.deck.script(&[1]);
    bench.deck.card(1).inject_comm_faults(100);

    let err = create_wallet(&mut bench.env(), &params("doomed", None), 16).unwrap_err();
    assert_eq!(err, Error::CardCommError);
    assert!(bench.store.wallets().is_empty());
    assert!(!bench.store.pending());
}

#[test]
fn create_leaves_partial_state_after_first_share() {
    let mut bench = Bench::new();
    bench.deck.script(&[1, 2, 3]);
    bench.deck.card(3).inject_comm_faults(100);

    create_wallet(&mut bench.env(), &params("partial", None), 16).unwrap_err();

    let wallets = bench.store.wallets();
    assert_eq!(wallets.len(), 1);
    assert_eq!(wallets[0].state, WalletState::Partial);
    assert!(wallets[0].cards_with_share.contains(1));
    assert!(wallets[0].cards_with_share.contains(2));
    assert!(!wallets[0].cards_with_share.contains(3));
}

#[test]
fn user_rejection_creates_nothing() {
    let mut bench = Bench::new();
    let mut reject = RejectAt::new(0);
    let mut env = VaultEnv {
        store: &mut bench.store,
        transport: &mut bench.deck,
        consent: &mut reject,
        rng: &mut bench.rng,
    };
    assert_eq!(
        create_wallet(&mut env, &params("no", None), 16).unwrap_err(),
        Error::UserRejection
    );
    assert!(bench.store.wallets().is_empty());
}

#[test]
fn reconstruct_secret_roundtrip_with_pin() {
    let mut bench = Bench::new();
    bench.deck.script(&[1, 2, 3, 4, 1, 2]);
    let id = create_wallet(&mut bench.env(), &params("pinned", Some("1379")), 16).unwrap();

    bench.deck.script(&[1]);
    let secret = reconstruct_secret(&mut bench.env(), &id, Some("1379")).unwrap();
    assert_eq!(secret.len(), 32);

    // wrong PIN trips the share MAC and demotes the wallet
    bench.deck.script(&[1]);
    assert_eq!(
        reconstruct_secret(&mut bench.env(), &id, Some("0000")).unwrap_err(),
        Error::ShareMacInvalid
    );
    assert_eq!(bench.store.wallet(&id).unwrap().state, WalletState::Invalid);
}

#[test]
fn restore_checks_collision_before_any_tap() {
    let phrase = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";
    let mut bench = Bench::new();
    bench.deck.script(&[1, 2, 3, 4, 1, 2]);
    let id = restore_wallet(&mut bench.env(), &params("restored", None), phrase).unwrap();
    assert_eq!(id, x1_sdk::mnemonic::wallet_id(phrase).unwrap());

    // all cards unplugged: a second restore must fail before any tap
    for n in 1..=4u8 {
        bench.deck.card(n).set_present(false);
    }
    assert_eq!(
        restore_wallet(&mut bench.env(), &params("again", None), phrase).unwrap_err(),
        Error::WalletAlreadyExists
    );
}

#[test]
fn delete_wallet_clears_cards_then_store() {
    let mut bench = Bench::new();
    bench.deck.script(&[1, 2, 3, 4, 1, 2]);
    let id = create_wallet(&mut bench.env(), &params("shortlived", None), 16).unwrap();

    bench.deck.script(&[1, 2, 3, 4]);
    delete_wallet(&mut bench.env(), &id).unwrap();

    assert!(bench.store.wallet(&id).is_none());
    assert!(bench.store.device_share(&id).is_none());
    for n in 1..=4u8 {
        assert_eq!(bench.deck.card(n).wallet_count(), 0);
    }
}

#[test]
fn locked_wallet_unlocks_via_proof_of_work() {
    let mut bench = Bench::new();
    bench.deck.script(&[1, 2, 3, 4, 1, 2]);
    let id = create_wallet(&mut bench.env(), &params("lockme", None), 16).unwrap();

    // an easy target: any digest below 0x0F... succeeds within a few batches
    let mut target = [0xFFu8; 32];
    target[0] = 0x0F;
    bench.deck.card(1).lock_wallet(&id, target, [0x77u8; 32]);

    bench.deck.script(&[1]);
    assert_eq!(
        reconstruct_secret(&mut bench.env(), &id, None).unwrap_err(),
        Error::WalletLocked
    );
    let meta = bench.store.wallet(&id).unwrap();
    assert_eq!(meta.state, WalletState::Locked);
    assert!(meta.challenge.is_some());

    bench.deck.script(&[1]);
    unlock_wallet(&mut bench.env(), &id).unwrap();
    assert_eq!(bench.store.wallet(&id).unwrap().state, WalletState::Valid);

    bench.deck.script(&[1]);
    assert!(reconstruct_secret(&mut bench.env(), &id, None).is_ok());
}

#[test]
fn reconstruct_seed_refuses_unusable_states() {
    let mut bench = Bench::new();
    bench.deck.script(&[1, 2, 3, 4, 1, 2]);
    let id = create_wallet(&mut bench.env(), &params("w", None), 16).unwrap();

    let mut meta = bench.store.wallet(&id).unwrap();
    meta.state = WalletState::Invalid;
    bench.store.put_wallet(&meta).unwrap();
    bench.store.commit().unwrap();

    assert_eq!(
        lifecycle::reconstruct_seed(&mut bench.env(), &id, None, "").unwrap_err(),
        Error::WalletNotUsable
    );
}

/// Scenario: all-zero entropy with a PIN; wrap, unwrap shares {1,3},
/// reconstruct; a tampered ciphertext fails the MAC.
#[test]
fn split_wrap_reconstruct_scenario() {
    let mut rng = Drbg::seeded(&mut [&mut FixedEntropy(5)]);
    let entropy = [0u8; 32];
    let key = pin_key("112233");

    let raw = split(&entropy, &mut rng).unwrap();
    let mut shares: Vec<x1_common::types::Share> = raw
        .into_iter()
        .enumerate()
        .map(|(i, y)| x1_common::types::Share {
            x: i as u8 + 1,
            y,
            header: None,
        })
        .collect();
    for share in shares.iter_mut() {
        wrap_share(share, &key, &mut rng);
    }

    let mut one = shares[0].clone();
    let mut three = shares[2].clone();
    unwrap_share(&mut one, &key).unwrap();
    unwrap_share(&mut three, &key).unwrap();
    let rebuilt = reconstruct(&[(one.x, one.y.as_slice()), (three.x, three.y.as_slice())]).unwrap();
    assert_eq!(rebuilt.as_slice(), &entropy);

    let mut tampered = shares[2].clone();
    tampered.y[5] ^= 0x01;
    assert_eq!(unwrap_share(&mut tampered, &key), Err(Error::ShareMacInvalid));
}

#[test]
fn arbitrary_data_wallet_roundtrip() {
    let payload: Vec<u8> = (0..200u32).map(|i| (i % 251) as u8).collect();
    let mut bench = Bench::new();
    bench.deck.script(&[1, 2, 3, 4, 1, 2]);

    let id = x1_vault::lifecycle::create_arbitrary_wallet(
        &mut bench.env(),
        &params("notes", Some("4242")),
        &payload,
    )
    .unwrap();
    assert_eq!(id, x1_sdk::hash::sha256d(&payload));

    let meta = bench.store.wallet(&id).unwrap();
    assert!(meta.flags.arbitrary_data);
    assert_eq!(meta.state, WalletState::Valid);

    bench.deck.script(&[1]);
    let secret = x1_vault::lifecycle::reconstruct_secret(&mut bench.env(), &id, Some("4242")).unwrap();
    assert_eq!(secret.as_slice(), payload.as_slice());

    // arbitrary-data wallets never produce a signing seed
    bench.deck.script(&[1]);
    assert_eq!(
        lifecycle::reconstruct_seed(&mut bench.env(), &id, Some("4242"), "").unwrap_err(),
        Error::WalletNotUsable
    );
}

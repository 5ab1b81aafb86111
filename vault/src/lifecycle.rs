//! Wallet lifecycle flows: pair, create, restore, verify, delete,
//! reconstruct and the proof-of-work unlock.
//!
//! Every flow runs against a [`VaultEnv`] context instead of globals: the
//! store, the NFC transport, the consent interface and the DRBG are all
//! borrowed for the duration of the flow. Card conversations are bounded
//! by the session layer's retry budget; progress that must survive a power
//! loss is committed as soon as it exists.

use log::{info, warn};
use x1_card::error::{CardError, RetryCause, RETRY_ATTEMPTS};
use x1_card::pairing::DeviceIdentity;
use x1_card::session::{CardSession, DEFAULT_TAP_TIMEOUT_MS};
use x1_card::transport::Transport;
use x1_common::error::CardFault;
use x1_common::types::{
    CardIdentity, CardMask, PowChallenge, Share, WalletFlags, WalletId, WalletMeta, WalletState,
    DEVICE_SHARE_X, MAX_CARDS,
};
use x1_common::Error;
use x1_sdk::mnemonic;
use x1_sdk::rand::Drbg;
use x1_sdk::ux::{Decision, UserConsent};
use x1_store::{FlashMedium, Store};
use zeroize::Zeroizing;

use crate::pow::{estimate_secs, PowSearch, BATCH_ITERATIONS};
use crate::shamir;
use crate::wrap::{pin_key, unwrap_share, wrap_share};

/// By policy, post-write verification reads these two cards back.
const VERIFY_CARDS: [u8; 2] = [1, 2];

/// Challenge rounds attempted before the unlock flow gives up.
const MAX_POW_ROUNDS: u32 = 4;

/// Search batches per round before the flow yields with a timeout.
const MAX_BATCHES_PER_ROUND: u32 = 1 << 14;

/// Everything a lifecycle flow touches, borrowed for its duration.
pub struct VaultEnv<'a, M: FlashMedium, T: Transport> {
    pub store: &'a mut Store<M>,
    pub transport: &'a mut T,
    pub consent: &'a mut dyn UserConsent,
    pub rng: &'a mut Drbg,
}

/// Parameters of a create/restore flow.
pub struct WalletParams<'p> {
    pub name: &'p str,
    pub pin: Option<&'p str>,
    pub passphrase_on: bool,
}

fn decision_to_result(decision: Decision) -> Result<(), Error> {
    match decision {
        Decision::Approved => Ok(()),
        Decision::Rejected => Err(Error::UserRejection),
        Decision::TimedOut => Err(Error::Timeout),
    }
}

/// Connects to one specific card, opens an encrypted session over the
/// persisted pairing and runs `op`, retrying transient faults.
fn with_card_session<M, T, R>(
    env: &mut VaultEnv<'_, M, T>,
    card_number: u8,
    mut op: impl FnMut(&mut CardSession<'_, T>) -> Result<R, CardError>,
) -> Result<R, CardError>
where
    M: FlashMedium,
    T: Transport,
{
    let family = env.store.device_config().family_id;
    let pairing = env
        .store
        .keystore_entry(card_number)
        .ok_or(CardError::Fault(CardFault::SecurityConditionsNotMet))?;

    let mut last = CardError::Retriable(RetryCause::CommFault);
    for attempt in 1..=RETRY_ATTEMPTS {
        let mut nonce = [0u8; 32];
        env.rng.fill(&mut nonce);

        let mut session = CardSession::new(&mut *env.transport);
        let result = (|| {
            session.connect(
                family.as_ref(),
                CardMask::one_hot(card_number),
                DEFAULT_TAP_TIMEOUT_MS,
            )?;
            session.open_session(&pairing, &nonce)?;
            op(&mut session)
        })();
        session.deselect();

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retriable() => {
                warn!(
                    "card {} attempt {}/{}: {}",
                    card_number, attempt, RETRY_ATTEMPTS, e
                );
                last = e;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last)
}

/// One-time pairing of a card into the device's family set.
pub fn pair_card<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    identity: &DeviceIdentity,
    card_number: u8,
) -> Result<(), Error> {
    let mut config = env.store.device_config();

    let mut last = CardError::Retriable(RetryCause::CommFault);
    for _attempt in 1..=RETRY_ATTEMPTS {
        let mut nonce = [0u8; 32];
        env.rng.fill(&mut nonce);

        let mut session = CardSession::new(&mut *env.transport);
        let result: Result<_, CardError> = (|| {
            let card = session.connect(
                config.family_id.as_ref(),
                CardMask::one_hot(card_number),
                DEFAULT_TAP_TIMEOUT_MS,
            )?;
            let card = card.clone();
            let entry = session.pair(identity, &nonce)?;
            Ok((card, entry))
        })();
        session.deselect();

        match result {
            Ok((card, entry)) => {
                if card.recovery_mode {
                    env.consent
                        .warn("Card is in recovery mode; migrate this card set soon");
                }
                if config.family_id.is_none() {
                    config.family_id = Some(card.family_id);
                    env.store
                        .put_device_config(&config)
                        .map_err(Error::from)?;
                }
                env.store
                    .put_keystore_entry(card_number, &entry)
                    .map_err(Error::from)?;
                env.store
                    .put_card_identity(
                        card_number,
                        &CardIdentity {
                            card_key_id: entry.key_id,
                            family_id: card.family_id,
                            used: true,
                        },
                    )
                    .map_err(Error::from)?;
                env.store.commit().map_err(Error::from)?;
                info!("paired card {} (key id {:02x?})", card_number, entry.key_id);
                return Ok(());
            }
            Err(e) if e.is_retriable() => last = e,
            Err(e) => return Err(e.into()),
        }
    }
    Err(last.into())
}

/// At least two paired cards are required before wallets can exist.
pub fn paired_card_count<M: FlashMedium>(store: &Store<M>) -> u8 {
    (1..=MAX_CARDS as u8)
        .filter(|n| store.keystore_entry(*n).is_some())
        .count() as u8
}

/// Creates a wallet from fresh entropy.
pub fn create_wallet<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    params: &WalletParams<'_>,
    entropy_bytes: usize,
) -> Result<WalletId, Error> {
    let entropy = Zeroizing::new(env.rng.random_bytes(entropy_bytes));
    let phrase =
        mnemonic::phrase_from_entropy(&entropy).map_err(|_| Error::InvalidData)?;
    let wallet_id = mnemonic::wallet_id(&phrase).map_err(|_| Error::InvalidData)?;

    let mut secret = Zeroizing::new(vec![0u8; 32]);
    secret[..entropy.len()].copy_from_slice(&entropy);

    let flags = WalletFlags {
        pin_set: params.pin.is_some(),
        passphrase_on: params.passphrase_on,
        arbitrary_data: false,
    };
    provision_wallet(env, params, flags, wallet_id, &secret)
}

/// Restores a wallet from a user-entered mnemonic. The wallet-id collision
/// check runs before any card is tapped.
pub fn restore_wallet<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    params: &WalletParams<'_>,
    phrase: &str,
) -> Result<WalletId, Error> {
    let entropy = mnemonic::entropy_from_phrase(phrase).map_err(|_| Error::InvalidData)?;
    let wallet_id = mnemonic::wallet_id(phrase).map_err(|_| Error::InvalidData)?;

    let mut secret = Zeroizing::new(vec![0u8; 32]);
    secret[..entropy.len()].copy_from_slice(&entropy);

    let flags = WalletFlags {
        pin_set: params.pin.is_some(),
        passphrase_on: params.passphrase_on,
        arbitrary_data: false,
    };
    provision_wallet(env, params, flags, wallet_id, &secret)
}

/// Creates an arbitrary-data wallet (1..=512 bytes of caller payload).
pub fn create_arbitrary_wallet<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    params: &WalletParams<'_>,
    data: &[u8],
) -> Result<WalletId, Error> {
    if data.is_empty() || data.len() > x1_common::types::ARBITRARY_DATA_MAX {
        return Err(Error::InvalidData);
    }
    let wallet_id = x1_sdk::hash::sha256d(data);
    let flags = WalletFlags {
        pin_set: params.pin.is_some(),
        passphrase_on: false,
        arbitrary_data: true,
    };
    provision_wallet(env, params, flags, wallet_id, data)
}

fn provision_wallet<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    params: &WalletParams<'_>,
    flags: WalletFlags,
    wallet_id: WalletId,
    secret: &[u8],
) -> Result<WalletId, Error> {
    if params.name.is_empty() || params.name.len() > x1_common::types::WALLET_NAME_MAX {
        return Err(Error::InvalidData);
    }
    if env.store.wallet(&wallet_id).is_some() {
        return Err(Error::WalletAlreadyExists);
    }
    if env.store.wallets().iter().any(|w| w.name == params.name) {
        return Err(Error::StoreConflict);
    }
    if paired_card_count(env.store) < MAX_CARDS as u8 {
        return Err(Error::CardSecurityFault(CardFault::SecurityConditionsNotMet));
    }
    decision_to_result(env.consent.confirm(&format!(
        "Create wallet \"{}\" on this device and all four cards?",
        params.name
    )))?;

    // Split, then wrap every share when a PIN protects the wallet.
    let raw_shares = shamir::split(secret, env.rng).map_err(|_| Error::InvalidData)?;
    let mut shares: Vec<Share> = raw_shares
        .into_iter()
        .enumerate()
        .map(|(i, y)| Share {
            x: i as u8 + 1,
            y,
            header: None,
        })
        .collect();
    if let Some(pin) = params.pin {
        let key = pin_key(pin);
        for share in shares.iter_mut() {
            wrap_share(share, &key, env.rng);
        }
    }

    let mut meta = WalletMeta {
        wallet_id,
        name: params.name.into(),
        flags,
        state: WalletState::Unverified,
        cards_with_share: CardMask::default(),
        challenge: None,
    };
    env.store.insert_wallet(&meta).map_err(|e| match e {
        x1_store::StoreError::Conflict => Error::WalletAlreadyExists,
        other => other.into(),
    })?;
    debug_assert_eq!(shares[(DEVICE_SHARE_X - 1) as usize].x, DEVICE_SHARE_X);
    env.store
        .put_device_share(&wallet_id, &shares[(DEVICE_SHARE_X - 1) as usize])
        .map_err(Error::from)?;

    // Four cards in sequence. A failure before the first confirmed share
    // aborts cleanly; afterwards the record stays behind as partial.
    for card_number in 1..=MAX_CARDS as u8 {
        let share = shares[(card_number - 1) as usize].clone();
        let write = with_card_session(env, card_number, |session| {
            session.add_wallet(params.name, &wallet_id, &flags, &share)
        });
        match write {
            Ok(()) => {
                meta.cards_with_share.set(card_number);
                env.store.put_wallet(&meta).map_err(Error::from)?;
                env.store.commit().map_err(Error::from)?;
            }
            Err(e) => {
                if meta.cards_with_share.is_empty() {
                    env.store.revert();
                } else {
                    meta.state = WalletState::Partial;
                    env.store.put_wallet(&meta).map_err(Error::from)?;
                    env.store.commit().map_err(Error::from)?;
                    warn!(
                        "wallet {} left partial after card {} failure",
                        meta.name, card_number
                    );
                }
                return Err(e.into());
            }
        }
    }

    // Read two shares back and prove the split reconstructs.
    let verified = verification_pass(env, &meta, params.pin, secret)?;
    meta.state = if verified {
        WalletState::Valid
    } else {
        WalletState::Invalid
    };
    env.store.put_wallet(&meta).map_err(Error::from)?;
    env.store.commit().map_err(Error::from)?;

    if !verified {
        env.consent
            .warn("Wallet verification failed; delete this wallet and retry");
        return Err(Error::WalletNotUsable);
    }
    info!("wallet {} created and verified", meta.name);
    Ok(wallet_id)
}

/// Reads shares back from the verification pair of cards and checks they
/// reconstruct the held secret.
fn verification_pass<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    meta: &WalletMeta,
    pin: Option<&str>,
    secret: &[u8],
) -> Result<bool, Error> {
    let mut recovered: Vec<Share> = Vec::with_capacity(VERIFY_CARDS.len());
    for card_number in VERIFY_CARDS {
        let share = with_card_session(env, card_number, |session| {
            session.retrieve_wallet(&meta.wallet_id)
        })
        .map_err(Error::from)?;
        recovered.push(share);
    }

    if let Some(pin) = pin {
        let key = pin_key(pin);
        for share in recovered.iter_mut() {
            unwrap_share(share, &key)?;
        }
    }

    let points: Vec<(u8, &[u8])> = recovered.iter().map(|s| (s.x, s.y.as_slice())).collect();
    let rebuilt = match shamir::reconstruct(&points) {
        Ok(secret) => secret,
        Err(_) => return Ok(false),
    };
    Ok(rebuilt.as_slice() == secret)
}

/// Deletes a wallet from every card that carries a share, then drops the
/// device share and metadata under a single commit.
pub fn delete_wallet<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    wallet_id: &WalletId,
) -> Result<(), Error> {
    let mut meta = env.store.wallet(wallet_id).ok_or(Error::WalletNotFound)?;
    decision_to_result(
        env.consent
            .confirm(&format!("Delete wallet \"{}\" everywhere?", meta.name)),
    )?;

    for card_number in meta.cards_with_share.iter().collect::<Vec<u8>>() {
        with_card_session(env, card_number, |session| {
            session.delete_wallet(wallet_id)
        })
        .map_err(Error::from)?;
        meta.cards_with_share.clear(card_number);
        env.store.put_wallet(&meta).map_err(Error::from)?;
        env.store.commit().map_err(Error::from)?;
    }

    env.store.delete_wallet(wallet_id).map_err(Error::from)?;
    env.store.commit().map_err(Error::from)?;
    info!("wallet deleted");
    Ok(())
}

/// Reconstructs a wallet's secret from the device share plus one card
/// share. Returns the raw 32-byte secret buffer (or the arbitrary data).
pub fn reconstruct_secret<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    wallet_id: &WalletId,
    pin: Option<&str>,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let meta = env.store.wallet(wallet_id).ok_or(Error::WalletNotFound)?;
    match meta.state {
        WalletState::Valid | WalletState::Unverified => {}
        WalletState::Locked => return Err(Error::WalletLocked),
        _ => return Err(Error::WalletNotUsable),
    }

    let mut device_share = env
        .store
        .device_share(wallet_id)
        .ok_or(Error::WalletNotUsable)?;
    let card_number = meta
        .cards_with_share
        .iter()
        .next()
        .ok_or(Error::WalletNotUsable)?;

    let mut card_share = match with_card_session(env, card_number, |session| {
        session.retrieve_wallet(wallet_id)
    }) {
        Ok(share) => share,
        Err(CardError::WalletLocked) => {
            enter_locked_state(env, meta, card_number)?;
            return Err(Error::WalletLocked);
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(pin) = pin {
        let key = pin_key(pin);
        if let Err(e) = unwrap_share(&mut device_share, &key)
            .and_then(|_| unwrap_share(&mut card_share, &key))
        {
            demote_wallet(env.store, wallet_id)?;
            return Err(e);
        }
    }

    let points = [
        (device_share.x, device_share.y.as_slice()),
        (card_share.x, card_share.y.as_slice()),
    ];
    let secret = shamir::reconstruct(&points).map_err(|_| Error::InvalidData)?;

    // The rebuilt secret must regenerate the recorded wallet id.
    let id_matches = if meta.flags.arbitrary_data {
        x1_sdk::hash::sha256d(&secret) == *wallet_id
    } else {
        recover_phrase(&secret, wallet_id).is_some()
    };
    if !id_matches {
        demote_wallet(env.store, wallet_id)?;
        return Err(Error::WalletNotUsable);
    }
    Ok(secret)
}

/// Reconstructs the BIP-39 seed for signing flows.
pub fn reconstruct_seed<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    wallet_id: &WalletId,
    pin: Option<&str>,
    passphrase: &str,
) -> Result<Zeroizing<[u8; 64]>, Error> {
    let meta = env.store.wallet(wallet_id).ok_or(Error::WalletNotFound)?;
    if !meta.allows_signing() {
        return Err(match meta.state {
            WalletState::Locked => Error::WalletLocked,
            _ => Error::WalletNotUsable,
        });
    }
    if meta.flags.arbitrary_data {
        return Err(Error::WalletNotUsable);
    }

    let secret = reconstruct_secret(env, wallet_id, pin)?;
    let phrase = recover_phrase(&secret, wallet_id).ok_or(Error::WalletNotUsable)?;
    mnemonic::seed_from_phrase(&phrase, passphrase).map_err(|_| Error::InvalidData)
}

/// Marks a wallet verified (or invalid) by running the reconstruction
/// check against the recorded wallet id.
pub fn verify_wallet<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    wallet_id: &WalletId,
    pin: Option<&str>,
) -> Result<(), Error> {
    let mut meta = env.store.wallet(wallet_id).ok_or(Error::WalletNotFound)?;
    let outcome = reconstruct_secret(env, wallet_id, pin);
    meta.state = match outcome {
        Ok(_) => WalletState::Valid,
        Err(Error::WalletLocked) => return Err(Error::WalletLocked),
        Err(_) => WalletState::Invalid,
    };
    env.store.put_wallet(&meta).map_err(Error::from)?;
    env.store.commit().map_err(Error::from)?;
    match meta.state {
        WalletState::Valid => Ok(()),
        _ => Err(Error::WalletNotUsable),
    }
}

fn demote_wallet<M: FlashMedium>(store: &mut Store<M>, wallet_id: &WalletId) -> Result<(), Error> {
    if let Some(mut meta) = store.wallet(wallet_id) {
        meta.state = WalletState::Invalid;
        store.put_wallet(&meta).map_err(Error::from)?;
        store.commit().map_err(Error::from)?;
    }
    Ok(())
}

/// Records the locked state and fetches the card's challenge.
fn enter_locked_state<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    mut meta: WalletMeta,
    card_number: u8,
) -> Result<(), Error> {
    let name = meta.name.clone();
    let (target, random_number) = with_card_session(env, card_number, |session| {
        session.pow_get_challenge(&name)
    })
    .map_err(Error::from)?;

    let estimate = estimate_secs(&target);
    meta.state = WalletState::Locked;
    meta.challenge = Some(PowChallenge {
        target,
        random_number,
        nonce: [0u8; 32],
        estimated_time_secs: estimate,
        card_number,
    });
    env.store.put_wallet(&meta).map_err(Error::from)?;
    env.store.commit().map_err(Error::from)?;
    warn!("wallet {} locked; unlock estimated at {}s", meta.name, estimate);
    Ok(())
}

/// Proof-of-work unlock flow for a locked wallet.
pub fn unlock_wallet<M: FlashMedium, T: Transport>(
    env: &mut VaultEnv<'_, M, T>,
    wallet_id: &WalletId,
) -> Result<(), Error> {
    let mut meta = env.store.wallet(wallet_id).ok_or(Error::WalletNotFound)?;
    if meta.state != WalletState::Locked {
        return Ok(());
    }
    let mut challenge = match meta.challenge.clone() {
        Some(challenge) => challenge,
        None => {
            let card_number = meta
                .cards_with_share
                .iter()
                .next()
                .ok_or(Error::WalletNotUsable)?;
            enter_locked_state(env, meta.clone(), card_number)?;
            env.store
                .wallet(wallet_id)
                .and_then(|m| m.challenge)
                .ok_or(Error::WalletLocked)?
        }
    };

    for round in 0..MAX_POW_ROUNDS {
        let mut search = PowSearch::new(
            &meta.name,
            &challenge.random_number,
            challenge.target,
            &challenge.nonce,
        );
        let mut found = None;
        for _ in 0..MAX_BATCHES_PER_ROUND {
            if let Some(nonce) = search.run_batch(BATCH_ITERATIONS) {
                found = Some(nonce);
                break;
            }
            // Checkpoint the search so a reboot resumes instead of
            // restarting from zero.
            challenge.nonce = search.nonce();
            meta.challenge = Some(challenge.clone());
            env.store.put_wallet(&meta).map_err(Error::from)?;
        }
        let Some(nonce) = found else {
            env.store.commit().map_err(Error::from)?;
            return Err(Error::Timeout);
        };

        let name = meta.name.clone();
        let submit = with_card_session(env, challenge.card_number, |session| {
            session.pow_verify_challenge(&name, &nonce)
        });
        match submit {
            Ok(()) => {
                meta.state = WalletState::Valid;
                meta.challenge = None;
                env.store.put_wallet(&meta).map_err(Error::from)?;
                env.store.commit().map_err(Error::from)?;
                info!("wallet {} unlocked after round {}", meta.name, round + 1);
                return Ok(());
            }
            Err(CardError::ChallengeFailed) => {
                let name = meta.name.clone();
                let (target, random_number) =
                    with_card_session(env, challenge.card_number, |session| {
                        session.pow_get_challenge(&name)
                    })
                    .map_err(Error::from)?;
                challenge = PowChallenge {
                    target,
                    random_number,
                    nonce: [0u8; 32],
                    estimated_time_secs: estimate_secs(&target),
                    card_number: challenge.card_number,
                };
                meta.challenge = Some(challenge.clone());
                env.store.put_wallet(&meta).map_err(Error::from)?;
                env.store.commit().map_err(Error::from)?;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(Error::WalletLocked)
}

/// Tries the three entropy widths until one regenerates the wallet id.
fn recover_phrase(secret: &[u8], expected: &WalletId) -> Option<Zeroizing<String>> {
    for len in [16usize, 24, 32] {
        if secret.len() < len {
            continue;
        }
        let Ok(phrase) = mnemonic::phrase_from_entropy(&secret[..len]) else {
            continue;
        };
        if mnemonic::wallet_id(&phrase).ok()? == *expected {
            return Some(phrase);
        }
    }
    None
}

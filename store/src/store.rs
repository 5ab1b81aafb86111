//! The record store proper.

use crc::{Crc, CRC_32_ISO_HDLC};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use x1_common::types::{
    CardIdentity, DeviceConfig, KeystoreEntry, Share, WalletId, WalletMeta, MAX_CARDS,
    MAX_WALLETS,
};

use crate::medium::{FlashMedium, MediumError, REGION_SIZE};

const MAGIC: [u8; 4] = *b"X1FS";
const HEADER_LEN: usize = 16;
const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Record namespaces. Capacities follow the flash partition layout.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordKind {
    WalletMeta = 0,
    DeviceShare = 1,
    Keystore = 2,
    CardIdentity = 3,
    DeviceConfig = 4,
}

impl RecordKind {
    fn capacity(&self) -> usize {
        match self {
            RecordKind::WalletMeta => MAX_WALLETS,
            RecordKind::DeviceShare => MAX_WALLETS,
            RecordKind::Keystore => MAX_CARDS,
            RecordKind::CardIdentity => MAX_CARDS,
            RecordKind::DeviceConfig => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    /// The kind's record table is full.
    Full,
    /// `insert` found an existing record under the key.
    Conflict,
    NotFound,
    /// Both regions failed to validate at open.
    Corrupt,
    Medium(MediumError),
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StoreError::Full => write!(f, "Record table is full"),
            StoreError::Conflict => write!(f, "Record already exists"),
            StoreError::NotFound => write!(f, "Record not found"),
            StoreError::Corrupt => write!(f, "Both store regions are corrupt"),
            StoreError::Medium(e) => write!(f, "{}", e),
        }
    }
}

impl From<MediumError> for StoreError {
    fn from(e: MediumError) -> Self {
        StoreError::Medium(e)
    }
}

impl From<StoreError> for x1_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Full => x1_common::Error::StoreFull,
            StoreError::Conflict => x1_common::Error::StoreConflict,
            StoreError::NotFound => x1_common::Error::RecordNotFound,
            _ => x1_common::Error::InvalidData,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
struct Record {
    kind: RecordKind,
    key: Vec<u8>,
    value: Vec<u8>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
struct Image {
    records: Vec<Record>,
}

/// Single-writer record store over a double-buffered flash medium.
pub struct Store<M: FlashMedium> {
    medium: M,
    staged: Image,
    committed: Image,
    generation: u32,
    active_region: usize,
}

impl<M: FlashMedium> Store<M> {
    /// Opens the store, selecting the newest valid region. A blank medium
    /// yields an empty store at generation zero.
    pub fn open(medium: M) -> Result<Store<M>, StoreError> {
        let mut best: Option<(usize, u32, Image)> = None;
        let mut any_region_present = false;

        for region in 0..2 {
            let bytes = medium.read_region(region);
            if bytes.len() >= 4 && bytes[..4] == MAGIC {
                any_region_present = true;
            }
            match parse_region(&bytes) {
                Some((generation, image)) => {
                    let newer = match &best {
                        Some((_, best_gen, _)) => generation > *best_gen,
                        None => true,
                    };
                    if newer {
                        best = Some((region, generation, image));
                    }
                }
                None => debug!("store: region {} not valid", region),
            }
        }

        match best {
            Some((region, generation, image)) => Ok(Store {
                medium,
                staged: image.clone(),
                committed: image,
                generation,
                active_region: region,
            }),
            None if !any_region_present => Ok(Store {
                medium,
                staged: Image::default(),
                committed: Image::default(),
                generation: 0,
                active_region: 1, // first commit programs region 0
            }),
            None => {
                warn!("store: both regions carry the magic but fail validation");
                Err(StoreError::Corrupt)
            }
        }
    }

    /// Raw lookup.
    pub fn get(&self, kind: RecordKind, key: &[u8]) -> Option<&[u8]> {
        self.staged
            .records
            .iter()
            .find(|r| r.kind == kind && r.key == key)
            .map(|r| r.value.as_slice())
    }

    /// Stages a record, replacing any record under the same key.
    pub fn put(&mut self, kind: RecordKind, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        if let Some(existing) = self
            .staged
            .records
            .iter_mut()
            .find(|r| r.kind == kind && r.key == key)
        {
            existing.value = value;
            return Ok(());
        }
        if self.staged.records.iter().filter(|r| r.kind == kind).count() >= kind.capacity() {
            return Err(StoreError::Full);
        }
        self.staged.records.push(Record {
            kind,
            key: key.to_vec(),
            value,
        });
        Ok(())
    }

    /// Stages a record that must not already exist.
    pub fn insert(&mut self, kind: RecordKind, key: &[u8], value: Vec<u8>) -> Result<(), StoreError> {
        if self.get(kind, key).is_some() {
            return Err(StoreError::Conflict);
        }
        self.put(kind, key, value)
    }

    /// Stages removal of a record.
    pub fn delete(&mut self, kind: RecordKind, key: &[u8]) -> Result<(), StoreError> {
        let before = self.staged.records.len();
        self.staged
            .records
            .retain(|r| !(r.kind == kind && r.key == key));
        if self.staged.records.len() == before {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Enumerates staged records of a kind in insertion order.
    pub fn iterate(&self, kind: RecordKind) -> impl Iterator<Item = (&[u8], &[u8])> {
        self.staged
            .records
            .iter()
            .filter(move |r| r.kind == kind)
            .map(|r| (r.key.as_slice(), r.value.as_slice()))
    }

    /// True if staged writes have not reached the medium yet.
    pub fn pending(&self) -> bool {
        self.staged != self.committed
    }

    /// Writes the staged image into the standby region and flips to it.
    pub fn commit(&mut self) -> Result<(), StoreError> {
        if !self.pending() {
            return Ok(());
        }
        let next_generation = self.generation + 1;
        let bytes = encode_region(next_generation, &self.staged)?;
        let target = 1 - self.active_region;
        self.medium.program_region(target, &bytes)?;

        self.generation = next_generation;
        self.active_region = target;
        self.committed = self.staged.clone();
        debug!(
            "store: committed generation {} to region {}",
            next_generation, target
        );
        Ok(())
    }

    /// Drops staged writes, restoring the last committed state.
    pub fn revert(&mut self) {
        self.staged = self.committed.clone();
    }

    // ---- typed accessors -------------------------------------------------

    pub fn wallet(&self, id: &WalletId) -> Option<WalletMeta> {
        self.decode(RecordKind::WalletMeta, id)
    }

    pub fn wallets(&self) -> Vec<WalletMeta> {
        self.iterate(RecordKind::WalletMeta)
            .filter_map(|(_, v)| postcard::from_bytes(v).ok())
            .collect()
    }

    pub fn put_wallet(&mut self, meta: &WalletMeta) -> Result<(), StoreError> {
        self.put_typed(RecordKind::WalletMeta, &meta.wallet_id, meta)
    }

    pub fn insert_wallet(&mut self, meta: &WalletMeta) -> Result<(), StoreError> {
        let value = postcard::to_allocvec(meta).map_err(|_| StoreError::Corrupt)?;
        self.insert(RecordKind::WalletMeta, &meta.wallet_id, value)
    }

    pub fn device_share(&self, id: &WalletId) -> Option<Share> {
        self.decode(RecordKind::DeviceShare, id)
    }

    pub fn put_device_share(&mut self, id: &WalletId, share: &Share) -> Result<(), StoreError> {
        self.put_typed(RecordKind::DeviceShare, id, share)
    }

    /// Removes a wallet's metadata and device share in one staged step; the
    /// caller commits once afterwards.
    pub fn delete_wallet(&mut self, id: &WalletId) -> Result<(), StoreError> {
        self.delete(RecordKind::WalletMeta, id)?;
        // A wallet in no-device-share state has no share record.
        let _ = self.delete(RecordKind::DeviceShare, id);
        Ok(())
    }

    pub fn keystore_entry(&self, slot: u8) -> Option<KeystoreEntry> {
        self.decode(RecordKind::Keystore, &[slot])
    }

    pub fn put_keystore_entry(&mut self, slot: u8, entry: &KeystoreEntry) -> Result<(), StoreError> {
        self.put_typed(RecordKind::Keystore, &[slot], entry)
    }

    pub fn card_identity(&self, slot: u8) -> Option<CardIdentity> {
        self.decode(RecordKind::CardIdentity, &[slot])
    }

    pub fn put_card_identity(&mut self, slot: u8, id: &CardIdentity) -> Result<(), StoreError> {
        self.put_typed(RecordKind::CardIdentity, &[slot], id)
    }

    pub fn device_config(&self) -> DeviceConfig {
        self.decode(RecordKind::DeviceConfig, &[]).unwrap_or_default()
    }

    pub fn put_device_config(&mut self, config: &DeviceConfig) -> Result<(), StoreError> {
        self.put_typed(RecordKind::DeviceConfig, &[], config)
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, kind: RecordKind, key: &[u8]) -> Option<T> {
        self.get(kind, key)
            .and_then(|bytes| postcard::from_bytes(bytes).ok())
    }

    fn put_typed<T: Serialize>(
        &mut self,
        kind: RecordKind,
        key: &[u8],
        value: &T,
    ) -> Result<(), StoreError> {
        let bytes = postcard::to_allocvec(value).map_err(|_| StoreError::Corrupt)?;
        self.put(kind, key, bytes)
    }
}

fn encode_region(generation: u32, image: &Image) -> Result<Vec<u8>, StoreError> {
    let payload = postcard::to_allocvec(image).map_err(|_| StoreError::Corrupt)?;
    if HEADER_LEN + payload.len() > REGION_SIZE {
        return Err(StoreError::Full);
    }
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&generation.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&CRC32.checksum(&payload).to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

fn parse_region(bytes: &[u8]) -> Option<(u32, Image)> {
    if bytes.len() < HEADER_LEN || bytes[..4] != MAGIC {
        return None;
    }
    let generation = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
    let len = u32::from_le_bytes(bytes[8..12].try_into().unwrap()) as usize;
    let crc = u32::from_le_bytes(bytes[12..16].try_into().unwrap());
    let payload = bytes.get(HEADER_LEN..HEADER_LEN + len)?;
    if CRC32.checksum(payload) != crc {
        return None;
    }
    let image = postcard::from_bytes(payload).ok()?;
    Some((generation, image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::medium::mock::MockFlash;
    use x1_common::types::{CardMask, WalletFlags, WalletState};

    fn meta(id: u8, name: &str) -> WalletMeta {
        WalletMeta {
            wallet_id: [id; 32],
            name: name.into(),
            flags: WalletFlags::default(),
            state: WalletState::Unverified,
            cards_with_share: CardMask::default(),
            challenge: None,
        }
    }

    #[test]
    fn test_empty_medium_opens_empty() {
        let store = Store::open(MockFlash::new()).unwrap();
        assert!(store.wallets().is_empty());
        assert!(!store.pending());
    }

    #[test]
    fn test_put_get_commit_reopen() {
        let mut store = Store::open(MockFlash::new()).unwrap();
        store.insert_wallet(&meta(1, "alpha")).unwrap();
        assert!(store.pending());
        store.commit().unwrap();
        assert!(!store.pending());

        let reopened = Store::open(store.medium).unwrap();
        assert_eq!(reopened.wallet(&[1u8; 32]).unwrap().name, "alpha");
    }

    #[test]
    fn test_insert_conflict_and_capacity() {
        let mut store = Store::open(MockFlash::new()).unwrap();
        store.insert_wallet(&meta(1, "a")).unwrap();
        assert_eq!(
            store.insert_wallet(&meta(1, "a2")).unwrap_err(),
            StoreError::Conflict
        );
        for id in 2..=4 {
            store.insert_wallet(&meta(id, "w")).unwrap();
        }
        assert_eq!(
            store.insert_wallet(&meta(5, "overflow")).unwrap_err(),
            StoreError::Full
        );
    }

    #[test]
    fn test_replace_is_staged_until_commit() {
        let mut store = Store::open(MockFlash::new()).unwrap();
        store.insert_wallet(&meta(1, "before")).unwrap();
        store.commit().unwrap();

        let mut changed = meta(1, "after");
        changed.state = WalletState::Valid;
        store.put_wallet(&changed).unwrap();
        store.revert();
        assert_eq!(store.wallet(&[1u8; 32]).unwrap().name, "before");
    }

    #[test]
    fn test_power_loss_before_commit_keeps_old_state() {
        let mut store = Store::open(MockFlash::new()).unwrap();
        store.insert_wallet(&meta(1, "committed")).unwrap();
        store.commit().unwrap();

        store.put_wallet(&meta(1, "staged-only")).unwrap();
        // power loss: no commit; just reopen from the medium
        let reopened = Store::open(store.medium).unwrap();
        assert_eq!(reopened.wallet(&[1u8; 32]).unwrap().name, "committed");
    }

    #[test]
    fn test_power_loss_during_commit_falls_back() {
        let mut store = Store::open(MockFlash::new()).unwrap();
        store.insert_wallet(&meta(1, "gen1")).unwrap();
        store.commit().unwrap();

        store.put_wallet(&meta(1, "gen2")).unwrap();
        store.medium.fail_next_program_after(7);
        assert_eq!(
            store.commit().unwrap_err(),
            StoreError::Medium(MediumError::PowerLoss)
        );

        let reopened = Store::open(store.medium).unwrap();
        assert_eq!(reopened.wallet(&[1u8; 32]).unwrap().name, "gen1");
    }

    #[test]
    fn test_power_loss_after_commit_keeps_new_state() {
        let mut store = Store::open(MockFlash::new()).unwrap();
        store.insert_wallet(&meta(1, "gen1")).unwrap();
        store.commit().unwrap();
        store.put_wallet(&meta(1, "gen2")).unwrap();
        store.commit().unwrap();

        let reopened = Store::open(store.medium).unwrap();
        assert_eq!(reopened.wallet(&[1u8; 32]).unwrap().name, "gen2");
    }

    #[test]
    fn test_delete_wallet_removes_meta_and_share() {
        let mut store = Store::open(MockFlash::new()).unwrap();
        store.insert_wallet(&meta(1, "w")).unwrap();
        store
            .put_device_share(
                &[1u8; 32],
                &Share {
                    x: 5,
                    y: vec![9u8; 32],
                    header: None,
                },
            )
            .unwrap();
        store.commit().unwrap();

        store.delete_wallet(&[1u8; 32]).unwrap();
        store.commit().unwrap();

        let reopened = Store::open(store.medium).unwrap();
        assert!(reopened.wallet(&[1u8; 32]).is_none());
        assert!(reopened.device_share(&[1u8; 32]).is_none());
    }

    #[test]
    fn test_device_config_single_slot() {
        let mut store = Store::open(MockFlash::new()).unwrap();
        let mut config = store.device_config();
        config.passphrase_enabled = true;
        store.put_device_config(&config).unwrap();
        store.commit().unwrap();
        assert!(Store::open(store.medium).unwrap().device_config().passphrase_enabled);
    }
}

//! Typed, versioned, atomically-committed persistent store.
//!
//! Records live in two mirrored flash regions. Writes are staged in RAM and
//! reach the medium only on [`Store::commit`], which serializes the whole
//! image into the standby region under a higher generation number; boot
//! selects the newest region whose checksum verifies. A power loss between
//! staging and commit therefore discards the pending writes, and a loss
//! during commit falls back to the previous generation.

mod medium;
mod store;

pub use medium::{FlashMedium, MediumError, REGION_SIZE};
pub use store::{RecordKind, Store, StoreError};

#[cfg(any(test, feature = "mock"))]
pub use medium::mock::MockFlash;

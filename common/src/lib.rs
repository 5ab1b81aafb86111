//! Types shared by every crate of the X1 firmware core.
//!
//! This crate holds the persisted data model (wallet records, shares, card
//! identities, device configuration), the BIP-32 path type and the
//! firmware-wide error kinds. It deliberately has no crypto or I/O
//! dependencies so that every other crate can depend on it.

#![no_std]

extern crate alloc;

pub mod error;
pub mod path;
pub mod types;

pub use error::Error;
pub use path::Bip32Path;

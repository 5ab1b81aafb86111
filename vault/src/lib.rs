//! Secret-share engine and wallet share lifecycle.
//!
//! A wallet's secret is split 2-of-5 over GF(2⁸): four card shares and one
//! device share. This crate owns the split/reconstruct math, the PIN-based
//! share wrapping, the proof-of-work unlock search and the create / restore
//! / verify / delete / reconstruct flows that drive the card session and
//! the persistent store together.
//!
//! The secret and mnemonic are owned exclusively by the running flow and
//! zeroed on every exit path; only shares are ever persisted.

pub mod lifecycle;
pub mod pow;
pub mod shamir;
pub mod wrap;

pub use lifecycle::VaultEnv;
pub use shamir::{reconstruct, split, ShamirError};
pub use wrap::{pin_key, unwrap_share, wrap_share};

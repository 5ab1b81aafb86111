//! Device SDK: crypto kit, codec primitives, randomness and the user-consent
//! interface.
//!
//! Everything below the chain signers and flows lives here. The crypto
//! surface is a thin, typed wrapper over the RustCrypto stack (k256, bip32,
//! sha2/sha3/ripemd, aes); the codec module carries the hand-rolled
//! encodings the wire formats need. No module in this crate performs I/O.

pub mod cipher;
pub mod codec;
pub mod curve;
pub mod hash;
pub mod mnemonic;
pub mod rand;
pub mod ux;

pub use codec::CodecError;
pub use curve::CurveError;

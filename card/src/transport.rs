//! Byte-oriented contact-less transport.
//!
//! The real NFC driver sits outside this repository; flows only see this
//! trait. The transport is held exclusively for the duration of a single
//! card exchange.

use crate::error::CardError;

pub trait Transport {
    /// Polls until an ISO14443-A card answers or the timeout elapses.
    fn wait_for_card(&mut self, timeout_ms: u32) -> Result<(), CardError>;

    /// Sends a raw command APDU and returns the raw response including the
    /// trailing status word.
    fn exchange(&mut self, apdu: &[u8]) -> Result<Vec<u8>, CardError>;

    /// Returns the card to its idle state. Callers must deselect on every
    /// abort path.
    fn deselect(&mut self);
}

//! Bitcoin-family signer.
//!
//! Covers address derivation for the four supported purposes, script
//! classification, previous-transaction verification, BIP-143 digests with
//! the per-transaction segwit cache, fee safety and the chunked `sign_txn`
//! flow driven by host sub-requests.

pub mod address;
pub mod app;
pub mod error;
pub mod script;
pub mod sighash;
pub mod txn;

pub use app::{BitcoinApp, SignFlow};
pub use error::BtcError;

/// Per-coin constants; the litecoin/dogecoin/dash apps instantiate the same
/// signer with their own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinParams {
    pub coin_index: u32,
    pub p2pkh_version: u8,
    pub p2sh_version: u8,
    pub bech32_hrp: &'static str,
    /// Upper fee bound in satoshi per kilobyte; fees above
    /// `max_fee_per_kb × vbytes ÷ 1000` need an extra confirmation.
    pub max_fee_per_kb: u64,
    pub unit: &'static str,
}

pub const BITCOIN: CoinParams = CoinParams {
    coin_index: 0,
    p2pkh_version: 0x00,
    p2sh_version: 0x05,
    bech32_hrp: "bc",
    max_fee_per_kb: 10_000_000,
    unit: "BTC",
};

pub const TESTNET: CoinParams = CoinParams {
    coin_index: 1,
    p2pkh_version: 0x6F,
    p2sh_version: 0xC4,
    bech32_hrp: "tb",
    max_fee_per_kb: 10_000_000,
    unit: "tBTC",
};

//! EVM-family signer.
//!
//! Parses legacy, EIP-2930 and EIP-1559 transactions from untrusted RLP,
//! classifies calldata against the whitelisted contract and function
//! tables, hashes EIP-712 typed data, and signs transactions and messages
//! behind user consent with an explicit blind-signing gate for unknown
//! contract calls.

pub mod app;
pub mod contracts;
pub mod error;
pub mod parsing;
pub mod utils;

pub use app::{EvmApp, SignMsgFlow, SignTxnFlow};
pub use error::EvmError;

/// Per-chain constants; each EVM app instance (ETH, Polygon, BSC, ...)
/// carries its own table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainParams {
    pub chain_id: u64,
    pub unit: &'static str,
    pub decimals: u8,
}

pub const ETHEREUM: ChainParams = ChainParams {
    chain_id: 1,
    unit: "ETH",
    decimals: 18,
};

pub const POLYGON: ChainParams = ChainParams {
    chain_id: 137,
    unit: "MATIC",
    decimals: 18,
};

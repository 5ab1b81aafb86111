//! Untrusted-input parsers: RLP, transactions, calldata, typed data.
//!
//! Every decoder validates lengths before access and fails closed on any
//! malformed field; nothing here allocates proportionally to claimed (as
//! opposed to actual) input sizes.

pub mod abi;
pub mod rlp;
pub mod transaction;
pub mod typed_data;

pub use rlp::{RlpError, RlpItem};
pub use transaction::{ParsedTransaction, TransactionType};

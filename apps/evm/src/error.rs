//! EVM-family errors.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvmError {
    InvalidRequest,
    InvalidDerivationPath,

    // RLP / transaction decode
    EmptyTransaction,
    Truncated,
    OutOfRange,
    UnknownTransactionType,
    InvalidFieldCount,
    InvalidField,
    TrailingBytes,
    ChainIdMismatch,

    // Calldata / ABI
    InvalidCalldata,
    TokenValueNotZero,

    // Messages
    InvalidMessage,

    KeyDerivationFailed,
    SigningFailed,
    UserRejected,
    Timeout,
}

impl fmt::Display for EvmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use EvmError::*;
        match self {
            InvalidRequest => write!(f, "Invalid request for the current flow state"),
            InvalidDerivationPath => write!(f, "Invalid derivation path"),
            EmptyTransaction => write!(f, "Transaction data is empty"),
            Truncated => write!(f, "RLP input ended unexpectedly"),
            OutOfRange => write!(f, "RLP length prefix out of range"),
            UnknownTransactionType => write!(f, "Unknown transaction type"),
            InvalidFieldCount => write!(f, "Wrong field count for transaction type"),
            InvalidField => write!(f, "Malformed transaction field"),
            TrailingBytes => write!(f, "Trailing bytes after transaction"),
            ChainIdMismatch => write!(f, "Chain id does not match this app"),
            InvalidCalldata => write!(f, "Malformed contract calldata"),
            TokenValueNotZero => write!(f, "Token transfer must carry zero value"),
            InvalidMessage => write!(f, "Malformed message payload"),
            KeyDerivationFailed => write!(f, "Failed to derive key"),
            SigningFailed => write!(f, "Failed to produce signature"),
            UserRejected => write!(f, "Rejected by the user"),
            Timeout => write!(f, "Timed out waiting for confirmation"),
        }
    }
}

impl EvmError {
    pub fn sub_kind(&self) -> u32 {
        *self as u32
    }
}

impl From<EvmError> for x1_common::Error {
    fn from(e: EvmError) -> Self {
        use EvmError::*;
        match e {
            InvalidRequest => x1_common::Error::InvalidRequest,
            InvalidDerivationPath => x1_common::Error::InvalidDerivationPath,
            Truncated => x1_common::Error::Truncated,
            OutOfRange => x1_common::Error::OutOfRange,
            UserRejected => x1_common::Error::UserRejection,
            Timeout => x1_common::Error::Timeout,
            KeyDerivationFailed | SigningFailed => x1_common::Error::InvalidScalar,
            InvalidMessage => x1_common::Error::InvalidData,
            _ => x1_common::Error::InvalidTransaction,
        }
    }
}

//! Bitcoin-family errors.

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BtcError {
    // Request validation
    InvalidRequest,
    InvalidDerivationPath,

    // Script handling
    UnknownScript,
    UnknownChangeScript,

    // Previous-transaction verification
    TruncatedPrevTxn,
    InvalidSegwitFlag,
    OutputIndexNotFound,
    PrevTxnHashMismatch,
    ValueMismatch,

    // Fee safety
    OutputExceedsInputs,
    OutputsExceedInputs,

    // Signing
    KeyDerivationFailed,
    SigningFailed,

    UserRejected,
    Timeout,
}

impl fmt::Display for BtcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use BtcError::*;
        match self {
            InvalidRequest => write!(f, "Invalid request for the current flow state"),
            InvalidDerivationPath => write!(f, "Invalid derivation path"),
            UnknownScript => write!(f, "Unrecognized script"),
            UnknownChangeScript => write!(f, "Change output script is not recognized"),
            TruncatedPrevTxn => write!(f, "Previous transaction is truncated"),
            InvalidSegwitFlag => write!(f, "Invalid segwit marker/flag"),
            OutputIndexNotFound => write!(f, "Referenced output index not present"),
            PrevTxnHashMismatch => write!(f, "Previous transaction hash mismatch"),
            ValueMismatch => write!(f, "Input value does not match previous output"),
            OutputExceedsInputs => write!(f, "An output spends more than the inputs provide"),
            OutputsExceedInputs => write!(f, "Outputs total more than inputs"),
            KeyDerivationFailed => write!(f, "Failed to derive key"),
            SigningFailed => write!(f, "Failed to produce signature"),
            UserRejected => write!(f, "Rejected by the user"),
            Timeout => write!(f, "Timed out waiting for confirmation"),
        }
    }
}

impl BtcError {
    /// Wire sub-kind carried beside the common error kind.
    pub fn sub_kind(&self) -> u32 {
        *self as u32
    }
}

impl From<BtcError> for x1_common::Error {
    fn from(e: BtcError) -> Self {
        use BtcError::*;
        match e {
            InvalidRequest => x1_common::Error::InvalidRequest,
            InvalidDerivationPath => x1_common::Error::InvalidDerivationPath,
            UnknownScript | UnknownChangeScript => x1_common::Error::UnknownScript,
            UserRejected => x1_common::Error::UserRejection,
            Timeout => x1_common::Error::Timeout,
            KeyDerivationFailed | SigningFailed => x1_common::Error::InvalidScalar,
            _ => x1_common::Error::InvalidTransaction,
        }
    }
}

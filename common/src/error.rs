//! Firmware-wide error kinds.
//!
//! Every flow returns errors by value; the single top-level handler of a
//! flow zeroes transient secrets, reports the error on the pinned host
//! interface and returns control to the main loop. Nothing here carries a
//! payload larger than a status word so the kinds stay cheap to copy.

use core::fmt;

/// Errors surfaced by the card session, beyond bounded-retry comm faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardFault {
    /// The tapped card belongs to a different four-card set.
    WrongFamily,
    /// Applet data health reported corrupt.
    HealthCorrupt,
    /// Applet version is incompatible with this firmware.
    IncompatibleApplet,
    /// Security condition not met (bad MAC, unpaired, blocked instruction).
    SecurityConditionsNotMet,
    /// The card is in recovery mode; a migration is pending.
    RecoveryMode,
    /// Requested wallet does not exist on the card.
    WalletNotFound,
    /// The card's wallet table is full.
    CardFull,
}

impl fmt::Display for CardFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CardFault::WrongFamily => write!(f, "Card belongs to a different family set"),
            CardFault::HealthCorrupt => write!(f, "Card data health is corrupt"),
            CardFault::IncompatibleApplet => write!(f, "Card applet version is incompatible"),
            CardFault::SecurityConditionsNotMet => {
                write!(f, "Card security conditions not satisfied")
            }
            CardFault::RecoveryMode => write!(f, "Card is in recovery mode"),
            CardFault::WalletNotFound => write!(f, "Wallet not found on card"),
            CardFault::CardFull => write!(f, "Card wallet storage is full"),
        }
    }
}

/// Central error type routed up through every flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    // Codecs
    InvalidEncoding,
    Truncated,
    ChecksumMismatch,
    OutOfRange,

    // Crypto kit
    InvalidPoint,
    InvalidScalar,
    HardenedFromPublic,
    InvalidDerivationPath,

    // Chain signers
    InvalidTransaction,
    UnknownScript,

    // Card session
    /// Retriable communication fault; retry budget exhausted when surfaced.
    CardCommError,
    CardSecurityFault(CardFault),
    WalletLocked,

    // Share engine / lifecycle
    ShareMacInvalid,
    WalletAlreadyExists,
    WalletNotFound,
    WalletNotUsable,

    // Store
    StoreFull,
    StoreConflict,
    RecordNotFound,

    // Host protocol / orchestration
    HostProtocolError(u8),
    InvalidRequest,
    InvalidData,
    AppNotSupported,
    UserRejection,
    Timeout,
    Aborted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Error::*;
        match self {
            InvalidEncoding => write!(f, "Invalid encoding"),
            Truncated => write!(f, "Input ended unexpectedly"),
            ChecksumMismatch => write!(f, "Checksum mismatch"),
            OutOfRange => write!(f, "Value out of range"),

            InvalidPoint => write!(f, "Invalid curve point"),
            InvalidScalar => write!(f, "Invalid scalar"),
            HardenedFromPublic => write!(f, "Hardened derivation requires a private key"),
            InvalidDerivationPath => write!(f, "Invalid derivation path"),

            InvalidTransaction => write!(f, "Invalid transaction"),
            UnknownScript => write!(f, "Unrecognized script"),

            CardCommError => write!(f, "Card communication failed"),
            CardSecurityFault(fault) => write!(f, "{}", fault),
            WalletLocked => write!(f, "Wallet is locked"),

            ShareMacInvalid => write!(f, "Share authentication failed"),
            WalletAlreadyExists => write!(f, "A wallet with this id already exists"),
            WalletNotFound => write!(f, "Wallet not found"),
            WalletNotUsable => write!(f, "Wallet is not in a usable state"),

            StoreFull => write!(f, "Persistent store is full"),
            StoreConflict => write!(f, "Conflicting record exists"),
            RecordNotFound => write!(f, "Record not found"),

            HostProtocolError(code) => write!(f, "Host protocol error ({})", code),
            InvalidRequest => write!(f, "Invalid request"),
            InvalidData => write!(f, "Invalid data"),
            AppNotSupported => write!(f, "App not supported"),
            UserRejection => write!(f, "Rejected by the user"),
            Timeout => write!(f, "Timed out waiting for input"),
            Aborted => write!(f, "Aborted"),
        }
    }
}

/// Wire-level error kind of a host response, per the desktop protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseErrorKind {
    InvalidRequest,
    InvalidData,
    UserRejection,
    DeviceCorrupt,
    AppNotSupported,
    UnknownError,
}

impl Error {
    /// Collapses the internal kind into the host-visible response kind.
    pub fn response_kind(&self) -> ResponseErrorKind {
        use Error::*;
        match self {
            InvalidRequest | AppNotSupported | HostProtocolError(_) => {
                ResponseErrorKind::InvalidRequest
            }
            InvalidEncoding | Truncated | ChecksumMismatch | OutOfRange | InvalidTransaction
            | UnknownScript | InvalidDerivationPath | InvalidData | InvalidPoint
            | InvalidScalar | HardenedFromPublic => ResponseErrorKind::InvalidData,
            UserRejection | Timeout | Aborted => ResponseErrorKind::UserRejection,
            ShareMacInvalid | StoreFull | StoreConflict | RecordNotFound
            | CardSecurityFault(_) => ResponseErrorKind::DeviceCorrupt,
            _ => ResponseErrorKind::UnknownError,
        }
    }
}

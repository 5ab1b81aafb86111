//! Card-session errors and the retry policy.

use x1_common::error::CardFault;

use crate::apdu::StatusWord;

/// Bounded retry budget for transient faults.
pub const RETRY_ATTEMPTS: u32 = 5;

/// Transient conditions worth retrying with a user prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    CardRemoved,
    AlignWithAntenna,
    CommFault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardError {
    /// Transient; retried up to [`RETRY_ATTEMPTS`] times before surfacing.
    Retriable(RetryCause),
    /// Fatal applet condition, mapped from the status word.
    Fault(CardFault),
    /// The wallet is locked; the proof-of-work sub-flow takes over.
    WalletLocked,
    /// Proof-of-work nonce rejected; fetch a fresh challenge.
    ChallengeFailed,
    /// Wallet/record not found on the card.
    NotFound,
    /// MAC verification of an encrypted response failed.
    MacMismatch,
    /// Response shorter than a status word or TLV malformed.
    MalformedResponse,
    /// Session used in the wrong state.
    BadState,
    /// Pairing signature or key validation failed.
    PairingFailed,
    /// Unmapped status word.
    Status(StatusWord),
    /// No user/card input before the timeout; flow aborted.
    Timeout,
}

impl CardError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, CardError::Retriable(_))
    }

    /// Maps an applet status word onto the session error taxonomy.
    pub fn from_status(status: StatusWord) -> Option<CardError> {
        if status.is_success() {
            return None;
        }
        Some(match status {
            StatusWord::POW_WALLET_LOCKED => CardError::WalletLocked,
            StatusWord::POW_CHALLENGE_FAILED => CardError::ChallengeFailed,
            StatusWord::RECORD_NOT_FOUND | StatusWord::FILE_NOT_FOUND => CardError::NotFound,
            StatusWord::FILE_INVALID => CardError::Fault(CardFault::HealthCorrupt),
            StatusWord::FILE_FULL => CardError::Fault(CardFault::CardFull),
            StatusWord::INCOMPATIBLE_APPLET => CardError::Fault(CardFault::IncompatibleApplet),
            StatusWord::SECURITY_CONDITIONS_NOT_SATISFIED
            | StatusWord::NOT_PAIRED
            | StatusWord::INS_BLOCKED => CardError::Fault(CardFault::SecurityConditionsNotMet),
            other => CardError::Status(other),
        })
    }
}

impl core::fmt::Display for CardError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CardError::Retriable(RetryCause::CardRemoved) => write!(f, "Card removed too fast"),
            CardError::Retriable(RetryCause::AlignWithAntenna) => {
                write!(f, "Hold the card against the device")
            }
            CardError::Retriable(RetryCause::CommFault) => write!(f, "Card communication fault"),
            CardError::Fault(fault) => write!(f, "{}", fault),
            CardError::WalletLocked => write!(f, "Wallet is locked on this card"),
            CardError::ChallengeFailed => write!(f, "Proof-of-work challenge failed"),
            CardError::NotFound => write!(f, "Not found on card"),
            CardError::MacMismatch => write!(f, "Card response failed authentication"),
            CardError::MalformedResponse => write!(f, "Malformed card response"),
            CardError::BadState => write!(f, "Card session used in the wrong state"),
            CardError::PairingFailed => write!(f, "Card pairing verification failed"),
            CardError::Status(sw) => write!(f, "Card error {}", sw),
            CardError::Timeout => write!(f, "Timed out waiting for card"),
        }
    }
}

impl From<CardError> for x1_common::Error {
    fn from(e: CardError) -> Self {
        match e {
            CardError::Retriable(_) | CardError::MalformedResponse | CardError::Status(_) => {
                x1_common::Error::CardCommError
            }
            CardError::Fault(fault) => x1_common::Error::CardSecurityFault(fault),
            CardError::WalletLocked | CardError::ChallengeFailed => x1_common::Error::WalletLocked,
            CardError::NotFound => x1_common::Error::WalletNotFound,
            CardError::MacMismatch | CardError::PairingFailed => {
                x1_common::Error::CardSecurityFault(CardFault::SecurityConditionsNotMet)
            }
            CardError::BadState => x1_common::Error::InvalidRequest,
            CardError::Timeout => x1_common::Error::Timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(CardError::from_status(StatusWord::NO_ERROR), None);
        assert_eq!(
            CardError::from_status(StatusWord::WARNING_STATE_UNCHANGED),
            None
        );
        assert_eq!(
            CardError::from_status(StatusWord::POW_WALLET_LOCKED),
            Some(CardError::WalletLocked)
        );
        assert_eq!(
            CardError::from_status(StatusWord::RECORD_NOT_FOUND),
            Some(CardError::NotFound)
        );
        assert_eq!(
            CardError::from_status(StatusWord::FILE_FULL),
            Some(CardError::Fault(CardFault::CardFull))
        );
    }
}

//! BIP-32 derivation path handling.
//!
//! The path is stored as raw `u32` steps with the hardened bit
//! (`0x8000_0000`) set where applicable, which is also how paths travel in
//! host queries.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;
use serde::{Deserialize, Serialize};

/// Hardened-index marker.
pub const HARDENED: u32 = 0x8000_0000;

/// Maximum supported derivation depth.
pub const MAX_PATH_DEPTH: usize = 10;

/// Purposes accepted by the Bitcoin-family signer.
pub const PURPOSE_LEGACY: u32 = 44 | HARDENED;
pub const PURPOSE_NESTED_SEGWIT: u32 = 49 | HARDENED;
pub const PURPOSE_SEGWIT: u32 = 84 | HARDENED;
pub const PURPOSE_TAPROOT: u32 = 86 | HARDENED;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Bip32Path(pub Vec<u32>);

impl Bip32Path {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_slice(path: &[u32]) -> Self {
        Self(path.to_vec())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.0
    }

    /// Validates a Bitcoin-family account (depth 3) or address (depth 5)
    /// path: purpose in {44', 49', 84', 86'}, first three levels hardened,
    /// change restricted to 0/1 and address levels non-hardened.
    pub fn is_valid_bitcoin_path(&self) -> bool {
        let p = &self.0;
        if p.len() != 3 && p.len() != 5 {
            return false;
        }
        if !matches!(
            p[0],
            PURPOSE_LEGACY | PURPOSE_NESTED_SEGWIT | PURPOSE_SEGWIT | PURPOSE_TAPROOT
        ) {
            return false;
        }
        if p[1] & HARDENED == 0 || p[2] & HARDENED == 0 {
            return false;
        }
        if p.len() == 5 {
            if p[3] != 0 && p[3] != 1 {
                return false;
            }
            if p[4] & HARDENED != 0 {
                return false;
            }
        }
        true
    }

    /// Validates an EVM path: `m/44'/60'/account'/change/index`, depth 3..=5.
    pub fn is_valid_evm_path(&self) -> bool {
        let p = &self.0;
        if p.len() < 3 || p.len() > 5 {
            return false;
        }
        if p[0] != PURPOSE_LEGACY || p[1] != (60 | HARDENED) {
            return false;
        }
        if p[2] & HARDENED == 0 {
            return false;
        }
        p[3..].iter().all(|step| step & HARDENED == 0)
    }

    /// Purpose level with the hardened bit cleared, if present.
    pub fn purpose(&self) -> Option<u32> {
        self.0.first().map(|p| p & !HARDENED)
    }

    /// Extends an account-level path with change/index steps.
    pub fn child(&self, steps: &[u32]) -> Bip32Path {
        let mut inner = self.0.clone();
        inner.extend_from_slice(steps);
        Bip32Path(inner)
    }

    /// Parses `m/84'/0'/0'/0/0` style notation. Used by tests and log output
    /// only; host queries carry raw indices.
    pub fn parse(s: &str) -> Option<Bip32Path> {
        let mut out = Vec::new();
        let mut parts = s.split('/');
        if parts.next() != Some("m") {
            return None;
        }
        for part in parts {
            let (digits, hardened) = match part.strip_suffix('\'').or(part.strip_suffix('h')) {
                Some(d) => (d, HARDENED),
                None => (part, 0),
            };
            let index: u32 = digits.parse().ok()?;
            if index >= HARDENED {
                return None;
            }
            out.push(index | hardened);
        }
        if out.len() > MAX_PATH_DEPTH {
            return None;
        }
        Some(Bip32Path(out))
    }
}

impl fmt::Display for Bip32Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m")?;
        for step in &self.0 {
            if step & HARDENED != 0 {
                write!(f, "/{}'", step & !HARDENED)?;
            } else {
                write!(f, "/{}", step)?;
            }
        }
        Ok(())
    }
}

impl From<&[u32]> for Bip32Path {
    fn from(path: &[u32]) -> Self {
        Self::from_slice(path)
    }
}

/// Formats a path for display screens.
pub fn path_string(path: &Bip32Path) -> String {
    use alloc::string::ToString;
    path.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = Bip32Path::parse("m/84'/0'/0'/0/0").unwrap();
        assert_eq!(
            path.as_slice(),
            &[84 | HARDENED, HARDENED, HARDENED, 0, 0]
        );
        assert_eq!(path_string(&path), "m/84'/0'/0'/0/0");
    }

    #[test]
    fn test_bitcoin_path_validation() {
        assert!(Bip32Path::parse("m/44'/0'/0'/0/5").unwrap().is_valid_bitcoin_path());
        assert!(Bip32Path::parse("m/86'/0'/0'").unwrap().is_valid_bitcoin_path());
        // change level out of range
        assert!(!Bip32Path::parse("m/84'/0'/0'/2/0").unwrap().is_valid_bitcoin_path());
        // missing hardening on account
        assert!(!Bip32Path::parse("m/84'/0'/0/0/0").unwrap().is_valid_bitcoin_path());
        // unsupported purpose
        assert!(!Bip32Path::parse("m/45'/0'/0'/0/0").unwrap().is_valid_bitcoin_path());
        // wrong depth
        assert!(!Bip32Path::parse("m/84'/0'/0'/0").unwrap().is_valid_bitcoin_path());
    }

    #[test]
    fn test_evm_path_validation() {
        assert!(Bip32Path::parse("m/44'/60'/0'/0/0").unwrap().is_valid_evm_path());
        assert!(!Bip32Path::parse("m/44'/0'/0'/0/0").unwrap().is_valid_evm_path());
        assert!(!Bip32Path::parse("m/44'/60'/0'/0'/0").unwrap().is_valid_evm_path());
    }
}

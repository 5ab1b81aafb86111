//! Proof-of-work unlock search.
//!
//! A locked wallet's card issues `{target, random_number}`; the device must
//! find a nonce with `SHA-256(wallet_name || random_number || nonce) <= target`
//! before further PIN attempts are accepted. The search runs in bounded
//! batches so the cooperative scheduler can service events between them.

use x1_sdk::hash::sha256;

/// Nonces tried per scheduler slice.
pub const BATCH_ITERATIONS: u32 = 4096;

pub struct PowSearch {
    preimage: Vec<u8>,
    /// Offset of the nonce bytes inside `preimage`.
    nonce_offset: usize,
    target: [u8; 32],
}

impl PowSearch {
    /// Starts (or resumes, given a persisted nonce) a search.
    pub fn new(
        wallet_name: &str,
        random_number: &[u8; 32],
        target: [u8; 32],
        resume_nonce: &[u8; 32],
    ) -> PowSearch {
        let mut preimage = Vec::with_capacity(wallet_name.len() + 64);
        preimage.extend_from_slice(wallet_name.as_bytes());
        preimage.extend_from_slice(random_number);
        let nonce_offset = preimage.len();
        preimage.extend_from_slice(resume_nonce);
        PowSearch {
            preimage,
            nonce_offset,
            target,
        }
    }

    /// Current nonce; persist this between batches to survive a reboot.
    pub fn nonce(&self) -> [u8; 32] {
        self.preimage[self.nonce_offset..].try_into().unwrap()
    }

    /// Tries up to `iterations` nonces; `Some(nonce)` once the digest meets
    /// the target.
    pub fn run_batch(&mut self, iterations: u32) -> Option<[u8; 32]> {
        for _ in 0..iterations {
            if sha256(&self.preimage) <= self.target {
                return Some(self.nonce());
            }
            self.increment_nonce();
        }
        None
    }

    fn increment_nonce(&mut self) {
        for byte in self.preimage[self.nonce_offset..].iter_mut() {
            let (next, carry) = byte.overflowing_add(1);
            *byte = next;
            if !carry {
                break;
            }
        }
    }
}

/// Rough unlock-time estimate in seconds, from the target's leading zero
/// bits and a nominal hash rate of the device.
pub fn estimate_secs(target: &[u8; 32]) -> u32 {
    const HASHES_PER_SEC: u64 = 20_000;
    let mut zero_bits = 0u32;
    for byte in target {
        if *byte == 0 {
            zero_bits += 8;
        } else {
            zero_bits += byte.leading_zeros();
            break;
        }
    }
    let expected_hashes = 1u64.checked_shl(zero_bits).unwrap_or(u64::MAX);
    (expected_hashes / HASHES_PER_SEC).min(u32::MAX as u64) as u32
}

//! Randomness: hardware entropy mixing and the firmware DRBG.
//!
//! Entropy draws mix at least one hardware source into a ChaCha20-based
//! DRBG that is reseeded on boot. Draws are non-blocking; under the
//! cooperative scheduler no synchronization is needed.

use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha512};

/// A source of raw entropy (TRNG peripheral, ADC noise, MCU unique id).
pub trait EntropySource {
    fn gather(&mut self, dest: &mut [u8]);
}

/// Operating-system entropy, used on the native/simulator build.
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn gather(&mut self, dest: &mut [u8]) {
        rand_core::OsRng.fill_bytes(dest);
    }
}

/// ChaCha20 DRBG seeded from one or more entropy sources.
pub struct Drbg {
    rng: ChaCha20Rng,
}

impl Drbg {
    /// Seeds the generator by hashing 32 bytes from every source together.
    /// At least one source must be a hardware RNG.
    pub fn seeded(sources: &mut [&mut dyn EntropySource]) -> Drbg {
        let mut hasher = Sha512::new();
        for source in sources.iter_mut() {
            let mut chunk = [0u8; 32];
            source.gather(&mut chunk);
            hasher.update(chunk);
        }
        let digest = hasher.finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest[..32]);
        Drbg {
            rng: ChaCha20Rng::from_seed(seed),
        }
    }

    /// Mixes fresh entropy into the generator state.
    pub fn reseed(&mut self, source: &mut dyn EntropySource) {
        let mut fresh = [0u8; 32];
        source.gather(&mut fresh);
        let mut state = [0u8; 32];
        self.rng.fill_bytes(&mut state);

        let mut hasher = Sha512::new();
        hasher.update(state);
        hasher.update(fresh);
        let digest = hasher.finalize();
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&digest[..32]);
        self.rng = ChaCha20Rng::from_seed(seed);
    }

    pub fn fill(&mut self, dest: &mut [u8]) {
        self.rng.fill_bytes(dest);
    }

    /// Generates cryptographically secure random bytes.
    pub fn random_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut bytes = vec![0u8; len];
        self.fill(&mut bytes);
        bytes
    }
}

#[cfg(any(test, feature = "mock"))]
pub mod testing {
    use super::EntropySource;

    /// Counter-based source for reproducible tests.
    pub struct FixedEntropy(pub u8);

    impl EntropySource for FixedEntropy {
        fn gather(&mut self, dest: &mut [u8]) {
            for (i, byte) in dest.iter_mut().enumerate() {
                *byte = self.0.wrapping_add(i as u8);
            }
            self.0 = self.0.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::FixedEntropy;
    use super::*;

    #[test]
    fn test_deterministic_under_fixed_seed() {
        let mut a = Drbg::seeded(&mut [&mut FixedEntropy(0)]);
        let mut b = Drbg::seeded(&mut [&mut FixedEntropy(0)]);
        assert_eq!(a.random_bytes(64), b.random_bytes(64));
    }

    #[test]
    fn test_reseed_diverges() {
        let mut a = Drbg::seeded(&mut [&mut FixedEntropy(0)]);
        let mut b = Drbg::seeded(&mut [&mut FixedEntropy(0)]);
        b.reseed(&mut FixedEntropy(9));
        assert_ne!(a.random_bytes(32), b.random_bytes(32));
    }

    #[test]
    fn test_source_mixing_changes_seed() {
        let mut a = Drbg::seeded(&mut [&mut FixedEntropy(0)]);
        let mut b = Drbg::seeded(&mut [&mut FixedEntropy(0), &mut FixedEntropy(1)]);
        assert_ne!(a.random_bytes(32), b.random_bytes(32));
    }

    #[test]
    fn test_os_entropy_not_all_zero() {
        let bytes = Drbg::seeded(&mut [&mut OsEntropy]).random_bytes(64);
        assert!(bytes.chunks(8).all(|chunk| !chunk.iter().all(|&b| b == 0)));
    }
}

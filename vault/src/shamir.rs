//! 2-of-5 Shamir secret sharing over GF(2⁸), applied bytewise.
//!
//! Split draws one degree-1 polynomial per secret byte with the secret as
//! the constant term and evaluates it at x ∈ {1..5}. Reconstruction is
//! Lagrange interpolation at x = 0 over any subset of two or more shares;
//! field inverses come from a compile-time table.

use x1_common::types::{SHARE_THRESHOLD, TOTAL_SHARES};
use x1_sdk::rand::Drbg;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShamirError {
    /// Fewer than two shares supplied.
    NotEnoughShares,
    /// Duplicate or zero x-coordinate.
    InvalidShareIndex,
    /// Shares of differing length.
    LengthMismatch,
    /// Secret is empty or exceeds the supported size.
    InvalidSecretLength,
}

impl core::fmt::Display for ShamirError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ShamirError::NotEnoughShares => write!(f, "At least two shares are required"),
            ShamirError::InvalidShareIndex => write!(f, "Invalid share x-coordinate"),
            ShamirError::LengthMismatch => write!(f, "Shares have differing lengths"),
            ShamirError::InvalidSecretLength => write!(f, "Unsupported secret length"),
        }
    }
}

/// AES field polynomial x⁸ + x⁴ + x³ + x + 1.
const GF_POLY: u8 = 0x1B;

const fn gf_mul(mut a: u8, mut b: u8) -> u8 {
    let mut product = 0u8;
    let mut i = 0;
    while i < 8 {
        if b & 1 != 0 {
            product ^= a;
        }
        let carry = a & 0x80;
        a <<= 1;
        if carry != 0 {
            a ^= GF_POLY;
        }
        b >>= 1;
        i += 1;
    }
    product
}

const fn gf_pow(base: u8, mut exp: u8) -> u8 {
    let mut result = 1u8;
    let mut acc = base;
    while exp > 0 {
        if exp & 1 != 0 {
            result = gf_mul(result, acc);
        }
        acc = gf_mul(acc, acc);
        exp >>= 1;
    }
    result
}

// inv(x) = x^254; INV[0] stays 0 and is never used.
const GF_INV: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut x = 1usize;
    while x < 256 {
        table[x] = gf_pow(x as u8, 254);
        x += 1;
    }
    table
};

/// Splits `secret` into five shares; index 5 is the device-resident one.
pub fn split(secret: &[u8], rng: &mut Drbg) -> Result<[Vec<u8>; 5], ShamirError> {
    if secret.is_empty() || secret.len() > x1_common::types::ARBITRARY_DATA_MAX {
        return Err(ShamirError::InvalidSecretLength);
    }

    let coefficients = Zeroizing::new(rng.random_bytes(secret.len()));
    let mut shares: [Vec<u8>; 5] = core::array::from_fn(|_| vec![0u8; secret.len()]);

    for x in 1..=TOTAL_SHARES {
        let share = &mut shares[(x - 1) as usize];
        for (j, byte) in secret.iter().enumerate() {
            share[j] = byte ^ gf_mul(coefficients[j], x);
        }
    }
    Ok(shares)
}

/// Reconstructs the secret from any subset of `(x, y)` shares with
/// `len >= 2`, interpolating at x = 0.
pub fn reconstruct(shares: &[(u8, &[u8])]) -> Result<Zeroizing<Vec<u8>>, ShamirError> {
    if shares.len() < SHARE_THRESHOLD as usize {
        return Err(ShamirError::NotEnoughShares);
    }
    let length = shares[0].1.len();
    for (i, (x, y)) in shares.iter().enumerate() {
        if *x == 0 || *x > TOTAL_SHARES {
            return Err(ShamirError::InvalidShareIndex);
        }
        if y.len() != length {
            return Err(ShamirError::LengthMismatch);
        }
        if shares[i + 1..].iter().any(|(other, _)| other == x) {
            return Err(ShamirError::InvalidShareIndex);
        }
    }

    // Lagrange basis at zero: Π_{k≠i} x_k / (x_k ⊕ x_i).
    let mut secret = Zeroizing::new(vec![0u8; length]);
    for (i, (x_i, y_i)) in shares.iter().enumerate() {
        let mut basis = 1u8;
        for (k, (x_k, _)) in shares.iter().enumerate() {
            if k != i {
                basis = gf_mul(basis, gf_mul(*x_k, GF_INV[(x_k ^ x_i) as usize]));
            }
        }
        for (j, byte) in y_i.iter().enumerate() {
            secret[j] ^= gf_mul(*byte, basis);
        }
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use x1_sdk::rand::testing::FixedEntropy;

    fn rng() -> Drbg {
        Drbg::seeded(&mut [&mut FixedEntropy(7)])
    }

    #[test]
    fn test_field_inverses() {
        for x in 1..=255u8 {
            assert_eq!(gf_mul(x, GF_INV[x as usize]), 1, "inverse of {}", x);
        }
    }

    #[test]
    fn test_every_pair_reconstructs() {
        let secret: Vec<u8> = (0..32).map(|i| i as u8 ^ 0x5A).collect();
        let shares = split(&secret, &mut rng()).unwrap();

        for a in 1..=5u8 {
            for b in (a + 1)..=5u8 {
                let subset = [
                    (a, shares[(a - 1) as usize].as_slice()),
                    (b, shares[(b - 1) as usize].as_slice()),
                ];
                assert_eq!(reconstruct(&subset).unwrap().as_slice(), secret.as_slice());
            }
        }
    }

    #[test]
    fn test_larger_subsets_agree() {
        let secret = [0xA5u8; 32];
        let shares = split(&secret, &mut rng()).unwrap();
        let all: Vec<(u8, &[u8])> = (1..=5u8)
            .map(|x| (x, shares[(x - 1) as usize].as_slice()))
            .collect();
        assert_eq!(reconstruct(&all).unwrap().as_slice(), &secret);
        assert_eq!(reconstruct(&all[1..4]).unwrap().as_slice(), &secret);
    }

    #[test]
    fn test_single_share_fails() {
        let shares = split(&[1u8; 32], &mut rng()).unwrap();
        assert_eq!(
            reconstruct(&[(1, shares[0].as_slice())]).unwrap_err(),
            ShamirError::NotEnoughShares
        );
    }

    #[test]
    fn test_rejects_bad_indices() {
        let shares = split(&[1u8; 32], &mut rng()).unwrap();
        assert_eq!(
            reconstruct(&[(0, shares[0].as_slice()), (2, shares[1].as_slice())]).unwrap_err(),
            ShamirError::InvalidShareIndex
        );
        assert_eq!(
            reconstruct(&[(2, shares[1].as_slice()), (2, shares[1].as_slice())]).unwrap_err(),
            ShamirError::InvalidShareIndex
        );
    }

    #[test]
    fn test_variable_secret_lengths() {
        for len in [1usize, 16, 24, 33, 512] {
            let secret: Vec<u8> = (0..len).map(|i| (i * 7) as u8).collect();
            let shares = split(&secret, &mut rng()).unwrap();
            let subset = [(2u8, shares[1].as_slice()), (5u8, shares[4].as_slice())];
            assert_eq!(reconstruct(&subset).unwrap().as_slice(), secret.as_slice());
        }
        assert_eq!(
            split(&[], &mut rng()).unwrap_err(),
            ShamirError::InvalidSecretLength
        );
        assert_eq!(
            split(&[0u8; 513], &mut rng()).unwrap_err(),
            ShamirError::InvalidSecretLength
        );
    }
}

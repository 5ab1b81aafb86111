//! CRC-16/XMODEM, as used by the host packet framing.

use crc::{Crc, CRC_16_XMODEM};

const XMODEM: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// CRC over a single buffer.
pub fn checksum(data: &[u8]) -> u16 {
    XMODEM.checksum(data)
}

/// CRC over several buffers in sequence, without concatenating them.
pub fn checksum_parts(parts: &[&[u8]]) -> u16 {
    let mut digest = XMODEM.digest();
    for part in parts {
        digest.update(part);
    }
    digest.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xmodem_check_value() {
        // standard check input for CRC-16/XMODEM
        assert_eq!(checksum(b"123456789"), 0x31C3);
    }

    #[test]
    fn test_parts_equivalence() {
        let whole = checksum(b"hello world");
        let split = checksum_parts(&[b"hello", b" ", b"world"]);
        assert_eq!(whole, split);
    }

    #[test]
    fn test_single_bit_sensitivity() {
        let base = checksum(&[0x12, 0x34, 0x56]);
        assert_ne!(base, checksum(&[0x12, 0x35, 0x56]));
    }
}

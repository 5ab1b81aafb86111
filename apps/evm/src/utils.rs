//! Amount and fee formatting.

/// Maximum fee in wei: both operands are capped at 8 bytes on the wire, so
/// the product needs a 128-bit widening multiply.
pub fn fee_wei(gas_price: u64, gas_limit: u64) -> u128 {
    gas_price as u128 * gas_limit as u128
}

/// Formats a wei/token amount with the chain's decimals, trimming
/// insignificant zeros.
pub fn format_units(amount: u128, decimals: u8, unit: &str) -> String {
    let divisor = 10u128.pow(decimals as u32);
    let whole = amount / divisor;
    let frac = amount % divisor;
    if frac == 0 {
        return format!("{} {}", whole, unit);
    }
    let mut frac_str = format!("{:0width$}", frac, width = decimals as usize);
    while frac_str.ends_with('0') {
        frac_str.pop();
    }
    format!("{}.{} {}", whole, frac_str, unit)
}

/// Display form of a 32-byte big-endian amount.
pub fn format_value32(value: &[u8; 32], decimals: u8, unit: &str) -> String {
    if value[..16].iter().any(|&b| b != 0) {
        return format!("0x{} {}", hex::encode(value), unit);
    }
    let mut amount = 0u128;
    for b in &value[16..] {
        amount = (amount << 8) | *b as u128;
    }
    format_units(amount, decimals, unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fee_widening_multiply() {
        // both operands at the 8-byte cap must not overflow
        let fee = fee_wei(u64::MAX, u64::MAX);
        assert_eq!(fee, u64::MAX as u128 * u64::MAX as u128);
    }

    #[test]
    fn test_format_units() {
        assert_eq!(format_units(1_000_000_000_000_000_000, 18, "ETH"), "1 ETH");
        assert_eq!(format_units(100_000_000_000_000, 18, "ETH"), "0.0001 ETH");
        assert_eq!(format_units(1_500_000, 6, "USDC"), "1.5 USDC");
        assert_eq!(format_units(0, 18, "ETH"), "0 ETH");
        assert_eq!(format_units(10_000_000, 18, "ETH"), "0.00000000001 ETH");
    }

    #[test]
    fn test_format_value32_large_falls_back_to_hex() {
        let value = [0xFFu8; 32];
        assert!(format_value32(&value, 18, "ETH").starts_with("0x"));
    }
}

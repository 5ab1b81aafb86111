//! Conversion between DER-encoded and fixed 64-byte ECDSA signatures.
//!
//! DER layout: `0x30 total-len 0x02 r-len r 0x02 s-len s`, with minimal
//! integer encoding (a leading zero byte only when the high bit would make
//! the value negative).

use super::CodecError;

/// Encodes a raw `(r, s)` pair as DER.
pub fn sig_to_der(r: &[u8; 32], s: &[u8; 32]) -> Vec<u8> {
    fn push_int(out: &mut Vec<u8>, bytes: &[u8; 32]) {
        let start = bytes.iter().position(|&b| b != 0).unwrap_or(31);
        let needs_pad = bytes[start] & 0x80 != 0;
        out.push(0x02);
        out.push((32 - start + needs_pad as usize) as u8);
        if needs_pad {
            out.push(0x00);
        }
        out.extend_from_slice(&bytes[start..]);
    }

    let mut body = Vec::with_capacity(72);
    push_int(&mut body, r);
    push_int(&mut body, s);

    let mut der = Vec::with_capacity(body.len() + 2);
    der.push(0x30);
    der.push(body.len() as u8);
    der.extend_from_slice(&body);
    der
}

/// Parses a DER signature into left-padded 32-byte `r` and `s`.
pub fn der_to_sig(der: &[u8]) -> Result<([u8; 32], [u8; 32]), CodecError> {
    if der.len() < 8 || der[0] != 0x30 {
        return Err(CodecError::InvalidEncoding);
    }
    if der[1] as usize != der.len() - 2 {
        return Err(CodecError::InvalidEncoding);
    }

    let (r, rest) = read_int(&der[2..])?;
    let (s, rest) = read_int(rest)?;
    if !rest.is_empty() {
        return Err(CodecError::InvalidEncoding);
    }
    Ok((r, s))
}

fn read_int(data: &[u8]) -> Result<([u8; 32], &[u8]), CodecError> {
    if data.len() < 2 || data[0] != 0x02 {
        return Err(CodecError::InvalidEncoding);
    }
    let len = data[1] as usize;
    let bytes = data.get(2..2 + len).ok_or(CodecError::Truncated)?;

    // Strip at most one leading zero pad byte.
    let bytes = match bytes {
        [0x00, rest @ ..] if !rest.is_empty() => rest,
        other => other,
    };
    if bytes.len() > 32 || bytes.is_empty() {
        return Err(CodecError::OutOfRange);
    }

    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(bytes);
    Ok((out, &data[2 + len..]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_roundtrip_plain() {
        let r = hex!("60e29bd41b7144d220552fd7d0b59d8345fbf7e25c7b48dbdd4d52398bd9c142");
        let s = hex!("1b23f1c19bc0aff6a09cd043b321811c3e4e5b9a7eec85a3e30ed964a8d47f89");
        let der = sig_to_der(&r, &s);
        assert_eq!(der_to_sig(&der).unwrap(), (r, s));
    }

    #[test]
    fn test_roundtrip_high_bit_padding() {
        // both halves have the top bit set, forcing a pad byte each
        let r = hex!("ff00000000000000000000000000000000000000000000000000000000000001");
        let s = hex!("8000000000000000000000000000000000000000000000000000000000000002");
        let der = sig_to_der(&r, &s);
        assert_eq!(der[1] as usize, der.len() - 2);
        assert_eq!(der_to_sig(&der).unwrap(), (r, s));
    }

    #[test]
    fn test_short_r_is_left_padded() {
        let r = hex!("0000000000000000000000000000000000000000000000000000000000000005");
        let s = hex!("0000000000000000000000000000000000000000000000000000000000000007");
        let der = sig_to_der(&r, &s);
        // 0x30 0x06 0x02 0x01 0x05 0x02 0x01 0x07
        assert_eq!(der, hex!("3006020105020107"));
        assert_eq!(der_to_sig(&der).unwrap(), (r, s));
    }

    #[test]
    fn test_rejects_trailing_garbage() {
        let mut der = sig_to_der(&[1u8; 32], &[2u8; 32]);
        der.push(0x00);
        assert!(der_to_sig(&der).is_err());
    }

    #[test]
    fn test_rejects_wrong_tag() {
        assert_eq!(
            der_to_sig(&hex!("3106020105020107")),
            Err(CodecError::InvalidEncoding)
        );
    }
}

//! Small byte-level reading helpers for binary payloads.
//!
//! All readers are bounds-checked and return `None` past the end, so plugin
//! decode paths can bail out of truncated payloads with `?` instead of
//! panicking.

/// Big-endian u16 at `at`.
pub fn be_u16(buf: &[u8], at: usize) -> Option<u16> {
    let bytes = buf.get(at..at + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Big-endian u32 at `at`.
pub fn be_u32(buf: &[u8], at: usize) -> Option<u32> {
    let bytes = buf.get(at..at + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Big-endian unsigned integer of 1..=8 bytes at `at`.
pub fn be_uint(buf: &[u8], at: usize, len: usize) -> Option<u64> {
    let bytes = buf.get(at..at + len)?;
    let mut value = 0u64;
    for &b in bytes {
        value = (value << 8) | b as u64;
    }
    Some(value)
}

/// Little-endian u16 at `at`.
pub fn le_u16(buf: &[u8], at: usize) -> Option<u16> {
    let bytes = buf.get(at..at + 2)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Decode packed BCD bytes to their digit string ("\x03\x59" -> "0359").
/// Nibbles above 9 are emitted as lowercase hex, matching how BCD-padded
/// identifiers (trailing 0xf nibbles) appear on the wire.
pub fn bcd_to_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(char::from_digit((b >> 4) as u32, 16).unwrap_or('?'));
        out.push(char::from_digit((b & 0x0f) as u32, 16).unwrap_or('?'));
    }
    out
}

/// Read one BCD-coded pair of digits as a number (0x23 -> 23).
pub fn bcd_byte(b: u8) -> u32 {
    ((b >> 4) as u32) * 10 + (b & 0x0f) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_be_readers() {
        let buf = [0x12, 0x34, 0x56, 0x78];
        assert_eq!(be_u16(&buf, 0), Some(0x1234));
        assert_eq!(be_u16(&buf, 2), Some(0x5678));
        assert_eq!(be_u16(&buf, 3), None);
        assert_eq!(be_u32(&buf, 0), Some(0x12345678));
        assert_eq!(be_uint(&buf, 1, 3), Some(0x345678));
        assert_eq!(le_u16(&buf, 0), Some(0x3412));
    }

    #[test]
    fn test_bcd() {
        assert_eq!(bcd_to_string(&[0x35, 0x95, 0x86]), "359586");
        assert_eq!(bcd_to_string(&[0x01, 0x23, 0x4f]), "01234f");
        assert_eq!(bcd_byte(0x59), 59);
    }
}

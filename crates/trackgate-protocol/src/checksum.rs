//! Checksums and check digits used by the wire protocols.

/// CRC16/CCITT-FALSE: polynomial 0x1021, initial value 0xFFFF.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

/// CRC16/X.25: reflected polynomial 0x8408, initial value 0xFFFF, output
/// complemented.
pub fn crc16_x25(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ 0x8408;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

/// Plain XOR of all bytes.
pub fn xor_sum(data: &[u8]) -> u8 {
    data.iter().fold(0, |acc, &b| acc ^ b)
}

/// Luhn check digit for a string of decimal digits, e.g. completing a
/// 14-digit IMEI body to the full 15-digit form. Non-digit input yields
/// `None`.
pub fn luhn_check_digit(digits: &str) -> Option<u8> {
    if digits.is_empty() {
        return None;
    }
    let mut sum = 0u32;
    for (i, c) in digits.chars().rev().enumerate() {
        let mut d = c.to_digit(10)?;
        // Double every other digit, starting with the rightmost (the check
        // digit will occupy the undoubled final position).
        if i % 2 == 0 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    Some(((10 - sum % 10) % 10) as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_ccitt() {
        // Well-known check value for "123456789"
        assert_eq!(crc16_ccitt(b"123456789"), 0x29B1);
        assert_eq!(crc16_ccitt(b""), 0xFFFF);
    }

    #[test]
    fn test_crc16_x25() {
        assert_eq!(crc16_x25(b"123456789"), 0x906E);
    }

    #[test]
    fn test_xor_sum() {
        assert_eq!(xor_sum(&[0x01, 0x02, 0x04]), 0x07);
        assert_eq!(xor_sum(&[0xAA, 0xAA]), 0x00);
        assert_eq!(xor_sum(&[]), 0x00);
    }

    #[test]
    fn test_luhn_check_digit() {
        // 49015420323751 -> full IMEI 490154203237518
        assert_eq!(luhn_check_digit("49015420323751"), Some(8));
        // 35958601582980 -> 359586015829802
        assert_eq!(luhn_check_digit("35958601582980"), Some(2));
        assert_eq!(luhn_check_digit(""), None);
        assert_eq!(luhn_check_digit("12a4"), None);
    }
}

//! Byte level helpers shared by the card and AT transports

mod imsi;

pub use imsi::{Imsi, MAX_IMSI_DIGITS};

use crate::{Error, Result};

/// Upper case hex rendering of `bytes`
pub fn to_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode_upper(bytes)
}

/// Decode a hex string, ignoring case and surrounding whitespace
pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    Ok(hex::decode(s.trim())?)
}

/// Build a big-endian short from two bytes
pub const fn make_short(high: u8, low: u8) -> u16 {
    u16::from_be_bytes([high, low])
}

/// Build a big-endian int from four bytes
pub const fn make_int(b0: u8, b1: u8, b2: u8, b3: u8) -> u32 {
    u32::from_be_bytes([b0, b1, b2, b3])
}

/// Read a big-endian short at `offset`
pub fn get_short(bytes: &[u8], offset: usize) -> Result<u16> {
    match bytes.get(offset..offset.saturating_add(2)) {
        Some(&[high, low]) => Ok(make_short(high, low)),
        _ => Err(Error::out_of_bounds(offset, 2, bytes.len())),
    }
}

/// Write a big-endian short at `offset`, returning the offset after it
pub fn set_short(bytes: &mut [u8], offset: usize, value: u16) -> Result<usize> {
    let limit = bytes.len();
    let dst = bytes
        .get_mut(offset..offset.saturating_add(2))
        .ok_or(Error::out_of_bounds(offset, 2, limit))?;
    dst.copy_from_slice(&value.to_be_bytes());
    Ok(offset + 2)
}

/// Interpret up to four bytes as a big-endian unsigned value
///
/// Longer slices use their first four bytes.
pub fn be_value(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

/// Swap the two characters of every pair in a hex string
///
/// A trailing odd character is kept as is.
pub fn swap_nibbles(hex: &str) -> String {
    let chars: Vec<char> = hex.chars().collect();
    let mut out = String::with_capacity(chars.len());
    for pair in chars.chunks(2) {
        match pair {
            [a, b] => {
                out.push(*b);
                out.push(*a);
            }
            [a] => out.push(*a),
            _ => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        assert_eq!(to_hex([0x3F, 0x00, 0xab]), "3F00AB");
        assert_eq!(from_hex(" 3f00AB ").unwrap(), vec![0x3F, 0x00, 0xAB]);
        assert!(from_hex("3F0").is_err());
        assert!(from_hex("ZZ").is_err());
    }

    #[test]
    fn test_shorts() {
        let mut buf = [0u8; 4];
        assert_eq!(set_short(&mut buf, 1, 0x6F07).unwrap(), 3);
        assert_eq!(buf, [0x00, 0x6F, 0x07, 0x00]);
        assert_eq!(get_short(&buf, 1).unwrap(), 0x6F07);
        assert!(get_short(&buf, 3).is_err());
        assert!(set_short(&mut buf, 3, 1).is_err());
        assert_eq!(make_int(0x00, 0x01, 0x02, 0x03), 0x0001_0203);
    }

    #[test]
    fn test_be_value() {
        assert_eq!(be_value(&[]), 0);
        assert_eq!(be_value(&[0x1A]), 0x1A);
        assert_eq!(be_value(&[0x01, 0x00]), 0x0100);
        assert_eq!(be_value(&[0x01, 0x02, 0x03, 0x04, 0x05]), 0x0102_0304);
    }

    #[test]
    fn test_swap_nibbles() {
        assert_eq!(swap_nibbles("0910"), "9001");
        assert_eq!(swap_nibbles("123"), "213");
        assert_eq!(swap_nibbles(""), "");
    }
}

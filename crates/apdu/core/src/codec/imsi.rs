//! IMSI representation and the EF_IMSI BCD encoding

use std::str::FromStr;

use derive_more::{Deref, Display};

use super::{from_hex, swap_nibbles, to_hex};
use crate::{Error, Result};

/// Maximum number of digits in an IMSI
pub const MAX_IMSI_DIGITS: usize = 15;

/// Length of the encoded form after the length byte, in hex characters
const ENCODED_DIGITS_LEN: usize = 16;

/// International Mobile Subscriber Identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Deref)]
pub struct Imsi(String);

impl Imsi {
    /// Create an IMSI from its decimal digits
    pub fn new(digits: impl Into<String>) -> Result<Self> {
        let digits = digits.into();
        if digits.is_empty()
            || digits.len() > MAX_IMSI_DIGITS
            || !digits.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(Error::InvalidImsi(digits));
        }
        Ok(Self(digits))
    }

    /// The decimal digits
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Mobile Country Code, the first three digits
    pub fn mcc(&self) -> Option<&str> {
        self.0.get(..3)
    }

    /// Mobile Network Code, digits four to six
    pub fn mnc(&self) -> Option<&str> {
        self.0.get(3..6)
    }

    /// Mobile Subscription Identification Number, everything after the MNC
    pub fn msin(&self) -> Option<&str> {
        self.0.get(6..)
    }

    /// Encode as the hex string stored in EF_IMSI
    ///
    /// The first nibble carries the parity: `9` for an odd number of digits,
    /// `1` for an even one. The result is the byte count followed by the
    /// nibble-swapped digits padded with `F` to eight bytes.
    pub fn encode(&self) -> String {
        let parity = if self.0.len() % 2 == 0 { '1' } else { '9' };
        let mut digits = String::with_capacity(ENCODED_DIGITS_LEN);
        digits.push(parity);
        digits.push_str(&self.0);
        if digits.len() % 2 == 1 {
            digits.push('F');
        }
        let len = digits.len() / 2;

        let mut swapped = swap_nibbles(&digits);
        while swapped.len() < ENCODED_DIGITS_LEN {
            swapped.push('F');
        }
        format!("{len:02}{swapped}")
    }

    /// Encode as the raw EF_IMSI bytes
    pub fn to_ef_imsi(&self) -> Result<Vec<u8>> {
        from_hex(&self.encode())
    }

    /// Decode the hex string stored in EF_IMSI
    pub fn decode(encoded: &str) -> Result<Self> {
        let invalid = || Error::InvalidImsi(encoded.to_string());

        let len_field = encoded.get(..2).ok_or_else(invalid)?;
        let len = usize::from(u8::from_str_radix(len_field, 16).map_err(|_| invalid())?);
        let digits = swap_nibbles(&encoded[2..]).to_ascii_uppercase();

        // The first nibble is the parity, the rest are the identity digits
        let body = digits.get(1..len * 2).ok_or_else(invalid)?;
        Self::new(body.replace('F', "")).map_err(|_| invalid())
    }

    /// Decode the raw EF_IMSI bytes
    pub fn from_ef_imsi(bytes: &[u8]) -> Result<Self> {
        Self::decode(&to_hex(bytes))
    }
}

impl FromStr for Imsi {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.trim())
    }
}

impl AsRef<str> for Imsi {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Imsi> for String {
    fn from(imsi: Imsi) -> Self {
        imsi.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_odd_length() {
        let imsi = Imsi::new("440103123456789").unwrap();
        assert_eq!(imsi.encode(), "084904011332547698");
        assert_eq!(
            imsi.to_ef_imsi().unwrap(),
            vec![0x08, 0x49, 0x04, 0x01, 0x13, 0x32, 0x54, 0x76, 0x98]
        );
    }

    #[test]
    fn test_encode_even_length() {
        let imsi = Imsi::new("12").unwrap();
        assert_eq!(imsi.encode(), "0211F2FFFFFFFFFFFF");
    }

    #[test]
    fn test_round_trip_all_lengths() {
        let source = "123456789012345";
        for len in 1..=MAX_IMSI_DIGITS {
            let imsi = Imsi::new(&source[..len]).unwrap();
            assert_eq!(Imsi::decode(&imsi.encode()).unwrap(), imsi, "length {len}");

            let bytes = imsi.to_ef_imsi().unwrap();
            assert_eq!(bytes.len(), 9);
            assert_eq!(Imsi::from_ef_imsi(&bytes).unwrap(), imsi);
        }
    }

    #[test]
    fn test_decode_card_content() {
        let imsi = Imsi::from_ef_imsi(&[0x08, 0x09, 0x10, 0x10, 0x00, 0x00, 0x00, 0x00, 0x10])
            .unwrap();
        assert_eq!(imsi.as_str(), "001010000000001");
        assert_eq!(imsi.mcc(), Some("001"));
        assert_eq!(imsi.mnc(), Some("010"));
        assert_eq!(imsi.msin(), Some("000000001"));
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(Imsi::new("").is_err());
        assert!(Imsi::new("1234567890123456").is_err());
        assert!(Imsi::new("12a").is_err());
        // Erased EF_IMSI
        assert!(Imsi::from_ef_imsi(&[0xFF; 9]).is_err());
        assert!(Imsi::decode("0").is_err());
        assert!(Imsi::decode("08491").is_err());
    }
}

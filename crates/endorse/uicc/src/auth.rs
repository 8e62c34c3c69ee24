//! Decoding of the AUTHENTICATE (3G context) response

use std::fmt;

use crate::constants::auth_tags;
use crate::{Error, Result};

/// Outcome of running AKA on the card
#[derive(Clone, PartialEq, Eq)]
pub enum AuthenticationResponse {
    /// Tag 0xDB: the card accepted the challenge
    Success {
        /// RES, sent back to the network as XRES
        res: Vec<u8>,
        /// Cipher key
        ck: Vec<u8>,
        /// Integrity key
        ik: Vec<u8>,
        /// GSM cipher key
        kc: Vec<u8>,
    },
    /// Tag 0xDC: sequence number out of range
    SyncFailure {
        /// Resynchronisation token
        auts: Vec<u8>,
    },
    /// Anything that could not be decoded completely
    Unknown,
}

// Keys stay out of logs
impl fmt::Debug for AuthenticationResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { res, ck, ik, kc } => f
                .debug_struct("Success")
                .field("res_len", &res.len())
                .field("ck_len", &ck.len())
                .field("ik_len", &ik.len())
                .field("kc_len", &kc.len())
                .finish(),
            Self::SyncFailure { auts } => f
                .debug_struct("SyncFailure")
                .field("auts", &hex::encode_upper(auts))
                .finish(),
            Self::Unknown => f.write_str("Unknown"),
        }
    }
}

/// Bounds-checked reader over length-prefixed fields
struct Cursor<'a> {
    bytes: &'a [u8],
}

impl<'a> Cursor<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn byte(&mut self) -> Result<u8> {
        let (first, rest) = self
            .bytes
            .split_first()
            .ok_or(Error::ProtocolDecodeFailure("authentication response"))?;
        self.bytes = rest;
        Ok(*first)
    }

    fn field(&mut self) -> Result<Vec<u8>> {
        let len = usize::from(self.byte()?);
        if self.bytes.len() < len {
            return Err(Error::ProtocolDecodeFailure("authentication response"));
        }
        let (value, rest) = self.bytes.split_at(len);
        self.bytes = rest;
        Ok(value.to_vec())
    }
}

impl AuthenticationResponse {
    /// Decode, reporting the first field that overruns the input
    pub fn try_decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        match cursor.byte()? {
            auth_tags::SUCCESS => Ok(Self::Success {
                res: cursor.field()?,
                ck: cursor.field()?,
                ik: cursor.field()?,
                kc: cursor.field()?,
            }),
            auth_tags::SYNC_FAILURE => Ok(Self::SyncFailure {
                auts: cursor.field()?,
            }),
            _ => Ok(Self::Unknown),
        }
    }

    /// Decode, resolving malformed input to [`Self::Unknown`]
    pub fn decode(bytes: &[u8]) -> Self {
        Self::try_decode(bytes).unwrap_or(Self::Unknown)
    }

    /// Whether the card accepted the challenge
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success() {
        let bytes = [0xDB, 0x02, 0xAA, 0xBB, 0x02, 0xCC, 0xDD, 0x02, 0xEE, 0xFF, 0x00];
        assert_eq!(
            AuthenticationResponse::decode(&bytes),
            AuthenticationResponse::Success {
                res: vec![0xAA, 0xBB],
                ck: vec![0xCC, 0xDD],
                ik: vec![0xEE, 0xFF],
                kc: vec![],
            }
        );
    }

    #[test]
    fn test_sync_failure() {
        assert_eq!(
            AuthenticationResponse::decode(&[0xDC, 0x02, 0x11, 0x22]),
            AuthenticationResponse::SyncFailure {
                auts: vec![0x11, 0x22]
            }
        );
    }

    #[test]
    fn test_overrun_is_unknown() {
        assert_eq!(
            AuthenticationResponse::decode(&[0xDB, 0x05, 0x01]),
            AuthenticationResponse::Unknown
        );
        assert!(matches!(
            AuthenticationResponse::try_decode(&[0xDB, 0x05, 0x01]),
            Err(Error::ProtocolDecodeFailure(_))
        ));
    }

    #[test]
    fn test_missing_trailing_field_is_unknown() {
        // no Kc length byte
        let bytes = [0xDB, 0x01, 0xAA, 0x01, 0xCC, 0x01, 0xEE];
        assert_eq!(
            AuthenticationResponse::decode(&bytes),
            AuthenticationResponse::Unknown
        );
    }

    #[test]
    fn test_other_tags_and_empty_input() {
        assert_eq!(AuthenticationResponse::decode(&[]), AuthenticationResponse::Unknown);
        assert_eq!(
            AuthenticationResponse::decode(&[0x98, 0x62]),
            AuthenticationResponse::Unknown
        );
        assert_eq!(
            AuthenticationResponse::decode(&[0xDC]),
            AuthenticationResponse::Unknown
        );
    }

    #[test]
    fn test_debug_hides_keys() {
        let response = AuthenticationResponse::decode(&[0xDB, 0x01, 0xAA, 0x01, 0xCC, 0x01, 0xEE, 0x00]);
        assert!(response.is_success());
        let rendered = format!("{response:?}");
        assert!(!rendered.contains("204"));
        assert!(rendered.contains("ck_len: 1"));
    }
}

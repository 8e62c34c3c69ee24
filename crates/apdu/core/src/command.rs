//! APDU command definitions
//!
//! This module provides the command half of ISO/IEC 7816-4 APDUs. Only short
//! APDUs are supported, which is all a UICC needs for the file system and
//! AUTHENTICATE commands.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// Expected length type for APDU commands
pub type ExpectedLength = u8;

/// The four structural cases of a command APDU
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApduCase {
    /// Header only
    Case1,
    /// Header and Le
    Case2,
    /// Header, Lc and data
    Case3,
    /// Header, Lc, data and Le
    Case4,
}

/// Generic APDU command structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Command class byte
    pub cla: u8,
    /// Instruction byte
    pub ins: u8,
    /// Parameter 1
    pub p1: u8,
    /// Parameter 2
    pub p2: u8,
    /// Upper bound for Lc; the data is clipped to it when encoding
    pub lc_hint: Option<u8>,
    /// Command data, empty for case 1 and 2
    pub data: Bytes,
    /// Expected length (optional)
    pub le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            lc_hint: None,
            data: Bytes::new(),
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self::new(cla, ins, p1, p2).with_le(le)
    }

    /// Create a new command with data payload
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Self {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Create a new command with both data and expected length
    pub fn new_with_data_and_le<T: Into<Bytes>>(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: T,
        le: ExpectedLength,
    ) -> Self {
        Self::new_with_data(cla, ins, p1, p2, data).with_le(le)
    }

    /// Set the data field
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Self {
        self.data = data.into();
        self
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Limit the number of data bytes sent
    pub const fn with_lc_hint(mut self, lc: u8) -> Self {
        self.lc_hint = Some(lc);
        self
    }

    /// Lc as it will be encoded, `None` when the command carries no data
    pub fn lc(&self) -> Option<u8> {
        if self.data.is_empty() {
            return None;
        }
        let limit = usize::from(self.lc_hint.unwrap_or(0xFF));
        // bounded by `limit`, which came from a u8
        Some(self.data.len().min(limit) as u8)
    }

    /// Structural case of this command
    pub fn case(&self) -> ApduCase {
        match (self.lc().is_some(), self.le.is_some()) {
            (false, false) => ApduCase::Case1,
            (false, true) => ApduCase::Case2,
            (true, false) => ApduCase::Case3,
            (true, true) => ApduCase::Case4,
        }
    }

    /// Calculate length of serialized command
    pub fn command_length(&self) -> usize {
        // Header (CLA, INS, P1, P2) is always 4 bytes
        let mut length = 4;
        if let Some(lc) = self.lc() {
            length += 1 + usize::from(lc);
        }
        if self.le.is_some() {
            length += 1;
        }
        length
    }

    /// Convert to raw APDU bytes
    pub fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        // Header: CLA, INS, P1, P2
        buffer.put_u8(self.cla);
        buffer.put_u8(self.ins);
        buffer.put_u8(self.p1);
        buffer.put_u8(self.p2);

        if let Some(lc) = self.lc() {
            buffer.put_u8(lc);
            buffer.put_slice(&self.data[..usize::from(lc)]);
        }

        if let Some(le) = self.le {
            buffer.put_u8(le);
        }

        buffer.freeze()
    }

    /// Upper case hex rendering of the encoded command
    pub fn to_apdu_string(&self) -> String {
        hex::encode_upper(self.to_bytes())
    }

    /// Parse a command from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let [cla, ins, p1, p2, body @ ..] = data else {
            return Err(Error::InvalidCommandLength(data.len()));
        };

        let mut command = Self::new(*cla, *ins, *p1, *p2);

        match body {
            [] => {}
            [le] => command.le = Some(*le),
            [lc, rest @ ..] => {
                let lc = usize::from(*lc);
                match rest.len().checked_sub(lc) {
                    Some(0) => command.data = Bytes::copy_from_slice(rest),
                    Some(1) => {
                        command.data = Bytes::copy_from_slice(&rest[..lc]);
                        command.le = Some(rest[lc]);
                    }
                    _ => return Err(Error::InvalidCommandLength(data.len())),
                }
            }
        }

        Ok(command)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CLA={:02X} INS={:02X} P1={:02X} P2={:02X}",
            self.cla, self.ins, self.p1, self.p2
        )?;
        if let Some(lc) = self.lc() {
            write!(
                f,
                " Lc={:02X} Data={}",
                lc,
                hex::encode_upper(&self.data[..usize::from(lc)])
            )?;
        }
        if let Some(le) = self.le {
            write!(f, " Le={le:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USIM_AID: [u8; 16] = [
        0xA0, 0x00, 0x00, 0x00, 0x87, 0x10, 0x02, 0xFF, 0x44, 0xFF, 0x12, 0x89, 0x00, 0x00, 0x01,
        0x00,
    ];

    #[test]
    fn test_select_aid_is_case_3() {
        let cmd = Command::new_with_data(0x00, 0xA4, 0x04, 0x04, USIM_AID.to_vec());
        let bytes = cmd.to_bytes();

        assert_eq!(cmd.case(), ApduCase::Case3);
        assert_eq!(&bytes[..5], &[0x00, 0xA4, 0x04, 0x04, 0x10]);
        assert_eq!(&bytes[5..], &USIM_AID);
        assert_eq!(bytes.len(), cmd.command_length());
    }

    #[test]
    fn test_cases() {
        assert_eq!(Command::new(0x00, 0xA4, 0x00, 0x04).case(), ApduCase::Case1);
        assert_eq!(
            Command::new_with_le(0x00, 0xB0, 0x00, 0x00, 9).to_bytes().as_ref(),
            &[0x00, 0xB0, 0x00, 0x00, 0x09]
        );
        let cmd = Command::new_with_data_and_le(0x00, 0x88, 0x00, 0x81, vec![0x01, 0x02], 0x00);
        assert_eq!(cmd.case(), ApduCase::Case4);
        assert_eq!(
            cmd.to_bytes().as_ref(),
            &[0x00, 0x88, 0x00, 0x81, 0x02, 0x01, 0x02, 0x00]
        );
    }

    #[test]
    fn test_empty_data_is_not_case_3() {
        let cmd = Command::new_with_data(0x00, 0xA4, 0x00, 0x04, Vec::new());
        assert_eq!(cmd.case(), ApduCase::Case1);
        assert_eq!(cmd.lc(), None);
        assert_eq!(cmd.to_bytes().len(), 4);
    }

    #[test]
    fn test_lc_is_clipped_to_hint() {
        let cmd = Command::new_with_data(0x00, 0xD6, 0x00, 0x00, vec![1, 2, 3, 4]).with_lc_hint(2);
        assert_eq!(cmd.to_bytes().as_ref(), &[0x00, 0xD6, 0x00, 0x00, 0x02, 1, 2]);

        // A hint larger than the data never inflates Lc
        let cmd = Command::new_with_data(0x00, 0xD6, 0x00, 0x00, vec![1, 2]).with_lc_hint(0x40);
        assert_eq!(cmd.lc(), Some(2));

        // Without a hint, data is clipped to 255 bytes
        let cmd = Command::new_with_data(0x00, 0xD6, 0x00, 0x00, vec![0u8; 300]);
        assert_eq!(cmd.lc(), Some(0xFF));
        assert_eq!(cmd.to_bytes().len(), 4 + 1 + 255);
    }

    #[test]
    fn test_command_from_bytes() {
        let cmd = Command::from_bytes(&[0x00, 0xA4, 0x04, 0x00]).unwrap();
        assert!(cmd.data.is_empty());
        assert!(cmd.le.is_none());

        let cmd = Command::from_bytes(&[0x00, 0xB0, 0x00, 0x00, 0xFF]).unwrap();
        assert_eq!(cmd.le, Some(0xFF));

        let cmd = Command::from_bytes(&[0x00, 0xA4, 0x04, 0x00, 0x02, 0x3F, 0x00]).unwrap();
        assert_eq!(cmd.data.as_ref(), &[0x3F, 0x00]);
        assert!(cmd.le.is_none());

        let cmd = Command::from_bytes(&[0x00, 0xA4, 0x04, 0x00, 0x02, 0x3F, 0x00, 0x00]).unwrap();
        assert_eq!(cmd.le, Some(0x00));

        assert!(Command::from_bytes(&[0x00, 0xA4]).is_err());
        assert!(Command::from_bytes(&[0x00, 0xA4, 0x04, 0x00, 0x05, 0x01]).is_err());
    }

    #[test]
    fn test_display() {
        let cmd = Command::new_with_le(0x00, 0xC0, 0x00, 0x00, 0x2C);
        assert_eq!(cmd.to_string(), "CLA=00 INS=C0 P1=00 P2=00 Le=2C");
        assert_eq!(cmd.to_apdu_string(), "00C000002C");
    }
}

//! EF_DIR application template records

use endorse_apdu_core::tlv::TlvBuffer;

use crate::constants::dir_tags;

/// One EF_DIR record (application template, tag 0x61)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    body: Option<TlvBuffer>,
}

impl Dir {
    /// Decode an EF_DIR record
    ///
    /// Records are padded with `FF` after the template, which is ignored.
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        let body = match bytes.as_ref() {
            [dir_tags::APPLICATION_TEMPLATE, len, rest @ ..] => {
                rest.get(..usize::from(*len)).map(TlvBuffer::from_bytes)
            }
            _ => None,
        };
        Self { body }
    }

    /// Whether the record holds no application template
    pub const fn is_empty(&self) -> bool {
        self.body.is_none()
    }

    /// Value of the first TLV carrying `tag`
    pub fn tag_value(&self, tag: u8) -> Option<&[u8]> {
        self.body.as_ref()?.find_value(tag)
    }

    /// Application identifier (tag 0x4F)
    pub fn aid(&self) -> Option<&[u8]> {
        self.tag_value(dir_tags::APPLICATION_IDENTIFIER)
    }

    /// Application label (tag 0x50)
    pub fn label(&self) -> Option<&[u8]> {
        self.tag_value(dir_tags::APPLICATION_LABEL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const USIM_RECORD: &str =
        "61184F10A0000000871002FF49FF0589000001FF50045553494DFFFFFFFFFFFFFFFFFFFFFF";

    #[test]
    fn test_usim_record() {
        let dir = Dir::new(hex::decode(USIM_RECORD).unwrap());
        assert!(!dir.is_empty());
        assert_eq!(
            hex::encode_upper(dir.aid().unwrap()),
            "A0000000871002FF49FF0589000001FF"
        );
        assert_eq!(dir.label(), Some(&b"USIM"[..]));
    }

    #[test]
    fn test_unused_record() {
        let dir = Dir::new([0xFF; 38]);
        assert!(dir.is_empty());
        assert_eq!(dir.aid(), None);
    }

    #[test]
    fn test_truncated_record() {
        let dir = Dir::new([0x61, 0x18, 0x4F, 0x10, 0xA0]);
        assert!(dir.is_empty());
    }

    #[test]
    fn test_record_without_label() {
        let dir = Dir::new([0x61, 0x04, 0x4F, 0x02, 0xA0, 0x00]);
        assert_eq!(dir.aid(), Some(&[0xA0, 0x00][..]));
        assert_eq!(dir.label(), None);
    }
}

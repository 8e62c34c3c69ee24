//! File control parameters returned by SELECT

use endorse_apdu_core::codec::be_value;
use endorse_apdu_core::tlv::TlvBuffer;

use crate::constants::fcp_tags;

/// Kind of file described by an FCP
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum FileType {
    /// Descriptor missing or not recognised
    Unknown,
    /// Application DF
    #[display("ADF")]
    Adf,
    /// Dedicated file
    #[display("DF")]
    Df,
    /// Transparent EF
    #[display("EF (transparent)")]
    EfTransparent,
    /// Linear fixed EF
    #[display("EF (linear fixed)")]
    EfLinear,
    /// Cyclic EF
    #[display("EF (cyclic)")]
    EfCyclic,
    /// BER-TLV EF
    #[display("EF (BER-TLV)")]
    EfBerTlv,
}

/// Life cycle status of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifeCycleStatus {
    /// Tag absent or value not in the table
    Unknown,
    /// No information given
    NoInformation,
    /// Creation state
    Creation,
    /// Operational, activated
    OperationalActivated,
    /// Operational, deactivated
    OperationalDeactivated,
    /// Termination state
    Termination,
}

impl From<u8> for LifeCycleStatus {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::NoInformation,
            0x01 => Self::Creation,
            0x05 | 0x07 => Self::OperationalActivated,
            0x04 | 0x06 => Self::OperationalDeactivated,
            0x0C..=0x0F => Self::Termination,
            _ => Self::Unknown,
        }
    }
}

/// Decoded FCP template (tag 0x62)
///
/// A buffer that does not start with the template tag, or whose declared
/// length runs past the data, is empty and answers `None` for every tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fcp {
    raw: Vec<u8>,
    body: Option<TlvBuffer>,
}

impl Fcp {
    /// Decode an FCP template
    pub fn new(bytes: impl AsRef<[u8]>) -> Self {
        let raw = bytes.as_ref().to_vec();
        let body = template_body(&raw).map(TlvBuffer::from_bytes);
        Self { raw, body }
    }

    /// The bytes this FCP was built from
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }

    /// Whether no template could be decoded
    pub const fn is_empty(&self) -> bool {
        self.body.is_none()
    }

    /// Value of the first TLV carrying `tag`
    pub fn tag_value(&self, tag: u8) -> Option<&[u8]> {
        self.body.as_ref()?.find_value(tag)
    }

    fn int_value(&self, tag: u8) -> Option<u32> {
        self.tag_value(tag)
            .filter(|v| !v.is_empty())
            .map(be_value)
    }

    /// File identifier (tag 0x83)
    pub fn file_id(&self) -> Option<u16> {
        match self.tag_value(fcp_tags::FILE_IDENTIFIER)? {
            [high, low, ..] => Some(u16::from_be_bytes([*high, *low])),
            _ => None,
        }
    }

    /// Short file identifier (tag 0x88)
    pub fn short_file_id(&self) -> Option<u8> {
        self.tag_value(fcp_tags::SHORT_FILE_IDENTIFIER)?
            .first()
            .map(|b| (b >> 3) & 0x1F)
    }

    /// File size (tag 0x80)
    pub fn file_size(&self) -> Option<u32> {
        self.int_value(fcp_tags::FILE_SIZE)
    }

    /// Total file size (tag 0x81)
    pub fn total_file_size(&self) -> Option<u32> {
        self.int_value(fcp_tags::TOTAL_FILE_SIZE)
    }

    fn descriptor(&self) -> Option<&[u8]> {
        self.tag_value(fcp_tags::FILE_DESCRIPTOR)
    }

    /// File type from the file descriptor (tag 0x82)
    pub fn file_type(&self) -> FileType {
        let Some(&descriptor) = self.descriptor().and_then(<[u8]>::first) else {
            return FileType::Unknown;
        };

        match (descriptor & 0x38, descriptor & 0x07) {
            // working or internal EF
            (0x00 | 0x08, 0x01) => FileType::EfTransparent,
            (0x00 | 0x08, 0x02) => FileType::EfLinear,
            (0x00 | 0x08, 0x06) => FileType::EfCyclic,
            (0x38, 0x00) if self.adf_aid().is_some() => FileType::Adf,
            (0x38, 0x00) => FileType::Df,
            (0x38, 0x01) => FileType::EfBerTlv,
            _ => FileType::Unknown,
        }
    }

    /// Record size of a record based EF
    ///
    /// Taken from descriptor bytes 2..4 when present, else the file size.
    pub fn record_size(&self) -> Option<u32> {
        match self.descriptor() {
            Some([_, _, high, low, ..]) => Some(u32::from(u16::from_be_bytes([*high, *low]))),
            _ => self.file_size(),
        }
    }

    /// Number of records (descriptor byte 4), zero when not given
    pub fn num_records(&self) -> u32 {
        self.descriptor()
            .and_then(|d| d.get(4))
            .map_or(0, |n| u32::from(*n))
    }

    /// DF name (tag 0x84), present for an ADF
    pub fn adf_aid(&self) -> Option<&[u8]> {
        self.tag_value(fcp_tags::DF_NAME)
    }

    /// Life cycle status (tag 0x8A)
    pub fn life_cycle_status(&self) -> LifeCycleStatus {
        self.tag_value(fcp_tags::LIFE_CYCLE_STATUS)
            .and_then(<[u8]>::first)
            .map_or(LifeCycleStatus::Unknown, |b| LifeCycleStatus::from(*b))
    }

    /// EF_ARR file identifier from the referenced security attribute
    pub fn arr_fid(&self) -> Option<u16> {
        match self.tag_value(fcp_tags::SECURITY_ATTRIBUTE_REFERENCED)? {
            [high, low, ..] => Some(u16::from_be_bytes([*high, *low])),
            _ => None,
        }
    }

    /// EF_ARR record number from the referenced security attribute
    pub fn arr_record(&self) -> Option<u8> {
        self.tag_value(fcp_tags::SECURITY_ATTRIBUTE_REFERENCED)?
            .get(2)
            .copied()
    }

    /// PIN status template DO (tag 0xC6)
    pub fn pin_status_template(&self) -> Option<&[u8]> {
        self.tag_value(fcp_tags::PIN_STATUS_TEMPLATE)
    }

    /// Proprietary information (tag 0xA5)
    pub fn proprietary_info(&self) -> Option<&[u8]> {
        self.tag_value(fcp_tags::PROPRIETARY_INFO)
    }
}

// 62 LL ... or 62 81 LL ...
fn template_body(raw: &[u8]) -> Option<&[u8]> {
    let (len, start) = match raw {
        [fcp_tags::TEMPLATE, 0x81, len, ..] => (usize::from(*len), 3),
        [fcp_tags::TEMPLATE, len, ..] => (usize::from(*len), 2),
        _ => return None,
    };
    raw.get(start..start + len)
}

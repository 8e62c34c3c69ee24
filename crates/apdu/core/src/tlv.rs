//! Bounded BER-TLV buffer
//!
//! [`TlvBuffer`] is a fixed capacity, append-only list of simple TLVs as
//! found in UICC FCP templates and EF_DIR records. Tags are a single byte.
//! The high bit of a tag marks "comprehension required" in ETSI encodings,
//! so a search for a tag matches it with and without that bit.
//!
//! Lengths use the BER forms: a direct byte below 128, then `81 xx`,
//! `82 xxxx` and `83 xxxxxx`.

use std::cmp::Ordering;

use crate::{Error, Result};

/// Default capacity, the largest value a signed 16 bit length can hold
pub const DEFAULT_CAPACITY: usize = 32767;

/// Largest value the `83` length form can carry
const MAX_ENCODABLE_LENGTH: usize = 0x00FF_FFFF;

/// Number of bytes the BER length field takes for `length`
pub const fn encoded_length_size(length: usize) -> usize {
    match length {
        0..0x80 => 1,
        0x80..0x100 => 2,
        0x100..0x1_0000 => 3,
        _ => 4,
    }
}

/// Append the BER encoding of `length` to `out`
fn encode_length(length: usize, out: &mut Vec<u8>) {
    // Each arm only keeps bytes that fit the selected form
    match encoded_length_size(length) {
        1 => out.push(length as u8),
        2 => out.extend_from_slice(&[0x81, length as u8]),
        3 => out.extend_from_slice(&[0x82, (length >> 8) as u8, length as u8]),
        _ => out.extend_from_slice(&[
            0x83,
            (length >> 16) as u8,
            (length >> 8) as u8,
            length as u8,
        ]),
    }
}

/// Decode the length field starting at `offset`
///
/// Returns the value length and the offset of the first value byte, or
/// `None` when the field itself does not fit below `limit`.
fn decode_length(data: &[u8], offset: usize, limit: usize) -> Option<(usize, usize)> {
    let field = |n: usize| {
        let end = offset.checked_add(1 + n)?;
        (end <= limit).then(|| &data[offset + 1..end])
    };

    match *data.get(offset).filter(|_| offset < limit)? {
        0x81 => field(1).map(|b| (usize::from(b[0]), offset + 2)),
        0x82 => field(2).map(|b| (usize::from(b[0]) << 8 | usize::from(b[1]), offset + 3)),
        0x83 => field(3).map(|b| {
            (
                usize::from(b[0]) << 16 | usize::from(b[1]) << 8 | usize::from(b[2]),
                offset + 4,
            )
        }),
        direct => Some((usize::from(direct), offset + 1)),
    }
}

/// A fixed capacity buffer of TLV entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvBuffer {
    data: Vec<u8>,
    capacity: usize,
}

impl Default for TlvBuffer {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl TlvBuffer {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity.min(DEFAULT_CAPACITY)),
            capacity,
        }
    }

    /// Create a buffer whose capacity is exactly the given bytes
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            capacity: bytes.len(),
        }
    }

    /// Logical length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been appended yet
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Maximum number of bytes the buffer accepts
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// The raw bytes appended so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Zero and reset the buffer
    pub fn clear(&mut self) {
        self.data.fill(0);
        self.data.clear();
    }

    fn reserve(&self, needed: usize) -> Result<()> {
        let available = self.capacity - self.data.len();
        if needed > available {
            return Err(Error::TlvCapacity { needed, available });
        }
        Ok(())
    }

    /// Append raw, already encoded bytes
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Append a TLV whose value is the concatenation of `parts`
    pub fn append_tlv_parts(&mut self, tag: u8, parts: &[&[u8]]) -> Result<()> {
        let length: usize = parts.iter().map(|p| p.len()).sum();
        if length > MAX_ENCODABLE_LENGTH {
            return Err(Error::TlvCapacity {
                needed: length,
                available: MAX_ENCODABLE_LENGTH,
            });
        }
        self.reserve(1 + encoded_length_size(length) + length)?;

        self.data.push(tag);
        encode_length(length, &mut self.data);
        for part in parts {
            self.data.extend_from_slice(part);
        }
        Ok(())
    }

    /// Append a TLV
    pub fn append_tlv(&mut self, tag: u8, value: &[u8]) -> Result<()> {
        self.append_tlv_parts(tag, &[value])
    }

    /// Append a TLV with a single byte value
    pub fn append_tlv_byte(&mut self, tag: u8, value: u8) -> Result<()> {
        self.append_tlv(tag, &[value])
    }

    /// Append a TLV with a big-endian short value
    pub fn append_tlv_short(&mut self, tag: u8, value: u16) -> Result<()> {
        self.append_tlv(tag, &value.to_be_bytes())
    }

    /// Find the `occurrence`-th (1 based) TLV carrying `tag`
    ///
    /// The scan starts at offset 0 and gives up as soon as a length field or
    /// a value would extend past the logical length.
    pub fn find(&self, tag: u8, occurrence: usize) -> Option<TlvMatch<'_>> {
        let limit = self.data.len();
        let mut offset = 0;
        let mut seen = 0;

        while offset < limit {
            let (value_length, value_offset) = decode_length(&self.data, offset + 1, limit)?;
            let next = value_offset.checked_add(value_length)?;
            if next > limit {
                return None;
            }

            let found = self.data[offset];
            if found | 0x80 == tag | 0x80 {
                seen += 1;
                if seen == occurrence {
                    return Some(TlvMatch {
                        tag: found,
                        value: &self.data[value_offset..next],
                    });
                }
            }
            offset = next;
        }

        None
    }

    /// Value of the first TLV carrying `tag`
    pub fn find_value(&self, tag: u8) -> Option<&[u8]> {
        self.find(tag, 1).map(|m| m.value)
    }
}

/// A TLV located by [`TlvBuffer::find`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvMatch<'a> {
    tag: u8,
    value: &'a [u8],
}

impl<'a> TlvMatch<'a> {
    /// Tag byte as stored
    pub const fn tag(&self) -> u8 {
        self.tag
    }

    /// Whether the stored tag has the comprehension required bit set
    pub const fn comprehension_required(&self) -> bool {
        self.tag & 0x80 != 0
    }

    /// Length of the value
    pub const fn value_length(&self) -> usize {
        self.value.len()
    }

    /// The value bytes
    pub const fn value(&self) -> &'a [u8] {
        self.value
    }

    fn value_range(&self, offset: usize, length: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(length)
            .and_then(|end| self.value.get(offset..end))
            .ok_or(Error::out_of_bounds(offset, length, self.value.len()))
    }

    /// Copy `dst.len()` value bytes starting at `offset` into `dst`
    pub fn copy_value(&self, offset: usize, dst: &mut [u8]) -> Result<usize> {
        let src = self.value_range(offset, dst.len())?;
        dst.copy_from_slice(src);
        Ok(dst.len())
    }

    /// Compare the value starting at `offset` with `other`
    pub fn compare_value(&self, offset: usize, other: &[u8]) -> Result<Ordering> {
        Ok(self.value_range(offset, other.len())?.cmp(other))
    }

    /// A single value byte
    pub fn value_byte(&self, offset: usize) -> Result<u8> {
        Ok(self.value_range(offset, 1)?[0])
    }

    /// A big-endian short from the value
    pub fn value_short(&self, offset: usize) -> Result<u16> {
        let b = self.value_range(offset, 2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }
}

//! APDU response definitions
//!
//! A response is the data returned by the card followed by the two status
//! bytes. Parsing is lenient: anything shorter than two bytes is treated as a
//! response without status rather than as an error.

pub mod status;
pub mod utils;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::{Error, Result};
use status::StatusWord;

/// Basic APDU response structure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Response data, without the status word
    data: Bytes,
    /// Status word, absent when the card returned fewer than two bytes
    status: Option<StatusWord>,
}

impl Response {
    /// Create a new response with data and status
    pub fn new(data: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            data: data.into(),
            status: Some(status.into()),
        }
    }

    /// Create a success response
    pub fn success(data: impl Into<Bytes>) -> Self {
        Self::new(data, status::common::SUCCESS)
    }

    /// Parse response from raw bytes (including status word)
    pub fn from_bytes(raw: &[u8]) -> Self {
        let response = match utils::extract_status_and_data(raw) {
            Some((status, data)) => Self {
                data: Bytes::copy_from_slice(data),
                status: Some(status),
            },
            None => Self {
                data: Bytes::new(),
                status: None,
            },
        };

        trace!(
            status = ?response.status.map(|s| s.to_string()),
            data_len = response.data.len(),
            "Parsed APDU response"
        );

        response
    }

    /// Response data, without the status word
    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    /// Take the response data
    pub fn into_data(self) -> Bytes {
        self.data
    }

    /// Status word, if the card returned one
    pub const fn status(&self) -> Option<StatusWord> {
        self.status
    }

    /// SW1, or 0 when no status is available
    pub fn sw1(&self) -> u8 {
        self.status.map_or(0, |s| s.sw1)
    }

    /// SW2, or 0 when no status is available
    pub fn sw2(&self) -> u8 {
        self.status.map_or(0, |s| s.sw2)
    }

    /// Check if the response indicates success
    pub fn is_success(&self) -> bool {
        self.status.is_some_and(|s| s.is_success())
    }

    /// Check if the card has more data waiting (61 XX)
    pub fn is_more_data_available(&self) -> bool {
        self.status.is_some_and(|s| s.is_more_data_available())
    }

    /// Convert to the data on success, or the status error otherwise
    pub fn into_result(self) -> Result<Bytes> {
        match self.status {
            Some(status) if status.is_success() => Ok(self.data),
            Some(status) => Err(Error::Status { status }),
            None => Err(Error::NoStatus),
        }
    }
}

impl From<&[u8]> for Response {
    fn from(raw: &[u8]) -> Self {
        Self::from_bytes(raw)
    }
}

impl From<Bytes> for Response {
    fn from(raw: Bytes) -> Self {
        Self::from_bytes(&raw)
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        let mut buf = BytesMut::with_capacity(response.data.len() + 2);
        buf.put_slice(&response.data);
        if let Some(status) = response.status {
            buf.put_u8(status.sw1);
            buf.put_u8(status.sw2);
        }
        buf.freeze()
    }
}

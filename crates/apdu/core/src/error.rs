//! Core error type for all APDU operations
//!
//! Codec, TLV and transport failures are all reported through [`Error`] so that
//! callers higher up the stack only need to match on one type.

use crate::response::status::StatusWord;
use crate::transport::TransportError;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    //
    // Transport related errors
    //
    /// The underlying transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    //
    // Response related errors
    //
    /// Status error from response
    #[error("Status error {status}: {}", status.description())]
    Status {
        /// Status word that caused the error
        status: StatusWord,
    },

    /// Response carried no status word at all
    #[error("Response carried no status word")]
    NoStatus,

    //
    // Codec related errors
    //
    /// Invalid command length
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// Hex string could not be decoded
    #[error("Invalid hex string: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Digit string is not a valid IMSI
    #[error("Invalid IMSI: {0}")]
    InvalidImsi(String),

    /// Appending would overflow a TLV buffer
    #[error("TLV buffer capacity exceeded: need {needed} bytes, {available} available")]
    TlvCapacity {
        /// Bytes the append required
        needed: usize,
        /// Bytes left before the capacity is reached
        available: usize,
    },

    /// A read walked past the end of the data
    #[error("Read out of bounds: offset {offset} + {length} exceeds {limit}")]
    OutOfBounds {
        /// Offset of the attempted read
        offset: usize,
        /// Length of the attempted read
        length: usize,
        /// Logical length of the data
        limit: usize,
    },

    //
    // General errors
    //
    /// Context error with message and source error
    #[error("{context}: {source}")]
    Context {
        /// Contextual message
        context: String,
        /// Source error
        source: Box<Self>,
    },

    /// Other error with static message
    #[error("{0}")]
    Other(&'static str),
}

impl Error {
    /// Create a new error with context information
    pub fn with_context<S: Into<String>>(self, context: S) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Create a new error with a static message
    pub const fn other(message: &'static str) -> Self {
        Self::Other(message)
    }

    /// Create a new status error
    pub const fn status(sw1: u8, sw2: u8) -> Self {
        Self::Status {
            status: StatusWord::new(sw1, sw2),
        }
    }

    /// Create a new out of bounds error
    pub const fn out_of_bounds(offset: usize, length: usize, limit: usize) -> Self {
        Self::OutOfBounds {
            offset,
            length,
            limit,
        }
    }
}

/// Result type for APDU operations
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for Result with APDU Errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<S: Into<String>>(self, context: S) -> Self {
        self.map_err(|e| e.with_context(context))
    }
}

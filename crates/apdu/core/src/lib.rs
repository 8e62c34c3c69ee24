//! Core types for talking to UICC/USIM cards with APDUs
//!
//! This crate provides the foundational codecs and traits for working with
//! smart card APDU commands and responses according to ISO/IEC 7816-4.
//!
//! ## Overview
//!
//! - [`Command`] and [`Response`] encode and parse short APDUs
//! - [`StatusWord`] classifies SW1/SW2 the way a UICC reports them
//! - [`tlv::TlvBuffer`] reads and writes the BER-TLV structures found in FCP
//!   templates and EF_DIR records
//! - [`codec`] holds hex, big-endian and IMSI BCD helpers
//! - [`CardTransport`] abstracts the link to a card, and [`CardExecutor`]
//!   sends typed commands through it
//!
//! Enable the `mock` feature to get [`transport::MockTransport`] for tests in
//! downstream crates.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

// Main modules
pub mod codec;
pub mod command;
pub mod executor;
pub mod response;
pub mod tlv;
pub mod transport;

// Core error types
mod error;
pub use error::{Error, Result, ResultExt};

// Re-exports for common types
pub use codec::Imsi;
pub use command::{ApduCase, Command};
pub use executor::CardExecutor;
pub use response::Response;
pub use response::status::StatusWord;
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Bytes, BytesMut, CardExecutor, Command, Error, Imsi, Response, Result, ResultExt,
        StatusWord, tlv::TlvBuffer, transport::CardTransport, transport::TransportError,
    };
}

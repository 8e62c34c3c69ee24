//! PC/SC transport implementation for APDU operations
//!
//! This crate provides an implementation of the `CardTransport` trait from
//! `endorse-apdu-core` using the PC/SC API for communication with smart cards.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use endorse_apdu_core::{CardExecutor, Command};
//! use endorse_apdu_transport_pcsc::{PcscConfig, PcscDeviceManager};
//!
//! // Create a PC/SC device manager
//! let manager = PcscDeviceManager::new()?;
//!
//! // List available readers
//! let readers = manager.list_readers()?;
//! let reader = &readers[0];
//! println!("Connecting to reader: {}", reader.name());
//!
//! let transport = manager.open_reader_with_config(reader.name(), PcscConfig::default());
//! let mut executor = CardExecutor::new(transport);
//!
//! // SELECT the master file
//! let select_mf = Command::new_with_data(0x00, 0xA4, 0x00, 0x04, vec![0x3F, 0x00]);
//! let response = executor.transmit(&select_mf)?;
//! println!("Status: {:?}", response.status());
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

// Core modules
mod config;
mod error;
mod manager;
mod reader;
mod transport;

// Public exports
pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use transport::PcscTransport;

// Re-export some pcsc types for convenience
pub use pcsc::{Protocol, Protocols};

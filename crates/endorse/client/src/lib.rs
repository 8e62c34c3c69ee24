//! SORACOM Endorse client
//!
//! Runs 3GPP AKA between a USIM and the SORACOM keys API and keeps the
//! agreed cipher key in an encrypted cache:
//!
//! - [`engine::KeyAgreement`] drives the challenge, AUTHENTICATE, verify
//!   sequence with one resynchronization round
//! - [`service::HttpKeyService`] talks to the keys API
//! - [`cache::EncryptedFileCache`] remembers keys for a limited time
//! - [`signature`] signs requests to services that trust the agreed key
//! - [`EndorseClient`] wires all of it to a [`config::ClientConfig`]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod cache;
pub mod config;
pub mod engine;
pub mod service;
pub mod signature;

mod client;
mod error;

pub use cache::{AuthResult, KeyCache};
pub use client::{EndorseClient, open_cache};
pub use config::{ClientConfig, KeysApiEndpoint};
pub use error::{Error, Result};
pub use signature::DigestAlgorithm;

//! UICC access for SORACOM Endorse
//!
//! This crate knows how to find a USIM and run 3GPP AKA on it:
//!
//! - [`fcp`] and [`dir`] decode file control parameters and EF_DIR records
//! - [`auth::AuthenticationResponse`] decodes the AUTHENTICATE result
//! - [`interface`] holds the transports (PC/SC reader, serial modem,
//!   ModemManager) behind the [`UiccInterface`] trait
//! - [`detect`] races every available transport and keeps the first one
//!   that reports an IMSI
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]

pub mod auth;
pub mod commands;
pub mod constants;
pub mod detect;
pub mod dir;
pub mod fcp;
pub mod interface;

mod error;
pub use error::{Error, Result};

pub use auth::AuthenticationResponse;
pub use detect::{AutoDetectInterface, Probe};
pub use interface::{
    InterfaceKind, Iso7816Interface, MmcliInterface, OpenOptions, SerialConfig, SerialInterface,
    UiccInterface, open_interface,
};

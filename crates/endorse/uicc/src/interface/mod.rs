//! Card transports sharing one capability contract

use std::{fmt, str::FromStr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub mod at;
pub mod iso7816;
pub mod mmcli;
pub mod serial;

pub use at::{AtChannel, AtInterface};
pub use iso7816::Iso7816Interface;
pub use mmcli::{MmcliChannel, MmcliInterface};
pub use serial::{SerialChannel, SerialConfig, SerialInterface};

/// What every UICC transport can do
///
/// Failures are reported as `None` or `false`; the caller decides whether
/// an absent card is fatal.
pub trait UiccInterface: Send + fmt::Debug {
    /// Read the IMSI of the card
    fn read_imsi(&mut self) -> Option<String>;

    /// Run AKA with `rand` and `autn`, returning the raw AUTHENTICATE response
    fn authenticate(&mut self, rand: &[u8], autn: &[u8]) -> Option<Vec<u8>>;

    /// Release the underlying line or card
    fn disconnect(&mut self) -> bool;
}

impl<T: UiccInterface + ?Sized> UiccInterface for Box<T> {
    fn read_imsi(&mut self) -> Option<String> {
        (**self).read_imsi()
    }

    fn authenticate(&mut self, rand: &[u8], autn: &[u8]) -> Option<Vec<u8>> {
        (**self).authenticate(rand, autn)
    }

    fn disconnect(&mut self) -> bool {
        (**self).disconnect()
    }
}

/// Which transport to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
pub enum InterfaceKind {
    /// PC/SC card reader
    #[serde(rename = "iso7816")]
    #[display("iso7816")]
    Iso7816,
    /// Modem on a serial line
    #[serde(rename = "comm")]
    #[display("comm")]
    Comm,
    /// Modem behind ModemManager
    #[serde(rename = "mmcli")]
    #[display("mmcli")]
    Mmcli,
    /// Race every reader and serial port
    #[default]
    #[serde(rename = "autoDetect")]
    #[display("autoDetect")]
    AutoDetect,
}

impl FromStr for InterfaceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "iso7816" => Ok(Self::Iso7816),
            "comm" => Ok(Self::Comm),
            "mmcli" => Ok(Self::Mmcli),
            "autoDetect" => Ok(Self::AutoDetect),
            other => Err(Error::UnknownInterface(other.to_string())),
        }
    }
}

/// Settings needed to open any transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// Serial line settings for `comm`; also the template for auto-detected ports
    pub serial: SerialConfig,
    /// ModemManager modem index for `mmcli`
    pub modem_index: u32,
    /// Upper bound on auto-detection
    pub detect_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            modem_index: 0,
            detect_timeout: crate::detect::DEFAULT_DETECT_TIMEOUT,
        }
    }
}

/// Open the transport selected by `kind`
pub fn open_interface(kind: InterfaceKind, options: &OpenOptions) -> Result<Box<dyn UiccInterface>> {
    tracing::debug!(%kind, "Opening UICC interface");
    Ok(match kind {
        InterfaceKind::Iso7816 => Box::new(Iso7816Interface::open_default()?),
        InterfaceKind::Comm => Box::new(SerialInterface::serial(options.serial.clone())),
        InterfaceKind::Mmcli => Box::new(MmcliInterface::mmcli(options.modem_index)),
        InterfaceKind::AutoDetect => Box::new(crate::detect::AutoDetectInterface::detect(options)?),
    })
}

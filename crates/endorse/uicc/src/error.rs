use std::time::Duration;

use endorse_apdu_transport_pcsc::PcscError;

/// Result type for UICC operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for UICC operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No reader, port or helper process could be reached
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),

    /// An exchange with the card failed or returned a short reply
    #[error(transparent)]
    CardCommunicationFailure(#[from] endorse_apdu_core::Error),

    /// A card structure could not be decoded
    #[error("could not decode {0}")]
    ProtocolDecodeFailure(&'static str),

    /// RAND and AUTN do not fit one AUTHENTICATE command
    #[error("challenge of {0} bytes does not fit an AUTHENTICATE command")]
    ChallengeTooLong(usize),

    /// Unknown interface name
    #[error("unknown UICC interface '{0}'")]
    UnknownInterface(String),

    /// Auto-detection found nothing to probe
    #[error("There are no interface to be detected.")]
    NoCandidates,

    /// No probe reported an IMSI
    #[error("failed to detect UICC interface.")]
    DetectionFailed,

    /// Auto-detection did not finish in time
    #[error("UICC interface detection timed out after {0:?}")]
    DetectionTimedOut(Duration),

    /// Serial port error
    #[error(transparent)]
    Serial(#[from] serialport::Error),

    /// IO error, including failure to spawn a helper process
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// PC/SC error
    #[error(transparent)]
    Pcsc(#[from] PcscError),
}

impl Error {
    /// Create a transport-unavailable error
    pub fn unavailable<S: Into<String>>(reason: S) -> Self {
        Self::TransportUnavailable(reason.into())
    }
}

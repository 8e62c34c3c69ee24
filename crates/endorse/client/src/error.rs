/// Result type for key agreement
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for key agreement, the key service and the key cache
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The card did not report an IMSI
    #[error("IMSI not retrieved, halting key agreement negotiation")]
    ImsiNotRetrieved,

    /// The key service answered with an unexpected status
    #[error("while calling {url}, received http response {status}: {body}")]
    RemoteService {
        /// Requested URL
        url: String,
        /// HTTP status code
        status: u16,
        /// Response body, kept for diagnostics
        body: String,
    },

    /// The key service did not hand out a complete challenge
    #[error("error negotiating key agreement for IMSI {imsi}: missing {missing}")]
    MissingChallenge {
        /// IMSI the challenge was requested for
        imsi: String,
        /// Name of the missing field
        missing: &'static str,
    },

    /// The verify endpoint rejected RES
    #[error("could not verify master key {key_id}: {url} answered {status}")]
    VerificationFailed {
        /// Key being verified
        key_id: String,
        /// Verify URL
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// The card asked for a second resynchronization
    #[error("unable to resynchronize while negotiating key agreement for IMSI {imsi}")]
    SyncExhausted {
        /// IMSI of the card
        imsi: String,
    },

    /// The card gave no usable AUTHENTICATE result
    #[error("authentication failure while negotiating key agreement: {0}")]
    AuthenticationFailed(&'static str),

    /// The key cache file could not be read, written or decrypted
    #[error("key cache unavailable: {0}")]
    CacheUnavailable(String),

    /// No passphrase to protect the key cache with
    #[error("no key cache passphrase; set ENDORSE_KEY_STORE_KEY or disable the key cache")]
    PassphraseMissing,

    /// Requested application key is longer than the digest
    #[error("key length {requested} exceeds the {available} byte {algorithm} digest")]
    KeyLengthTooLong {
        /// Requested key length in bytes
        requested: usize,
        /// Digest size in bytes
        available: usize,
        /// Digest algorithm name
        algorithm: String,
    },

    /// Unknown digest algorithm name
    #[error("unsupported digest algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] Box<figment::Error>),

    /// HTTP transport error
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Base64 field could not be decoded
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    /// UICC transport error
    #[error(transparent)]
    Uicc(#[from] endorse_uicc::Error),

    /// IO error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for Error {
    fn from(e: figment::Error) -> Self {
        Self::Config(Box::new(e))
    }
}

impl Error {
    /// Create a cache-unavailable error
    pub fn cache<S: Into<String>>(reason: S) -> Self {
        Self::CacheUnavailable(reason.into())
    }
}

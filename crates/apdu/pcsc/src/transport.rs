//! PC/SC transport implementation

use std::{ffi::CString, fmt};

use bytes::Bytes;
use endorse_apdu_core::transport::{CardTransport, TransportError};
use pcsc::{Card, Context, Disposition, MAX_BUFFER_SIZE};
use tracing::debug;

use crate::{config::PcscConfig, error::PcscError};

/// Transport implementation using PC/SC
pub struct PcscTransport {
    /// PC/SC context
    context: Context,
    /// Card connection, if established
    card: Option<Card>,
    /// Reader name
    reader_name: String,
    /// Configuration
    config: PcscConfig,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl PcscTransport {
    /// Create a new PC/SC transport for the specified reader
    ///
    /// The card itself is only connected on first use.
    pub(crate) fn new(context: Context, reader_name: &str, config: PcscConfig) -> Self {
        Self {
            context,
            card: None,
            reader_name: reader_name.to_string(),
            config,
        }
    }

    /// Try to connect to the card
    fn connect_card(&mut self) -> Result<(), PcscError> {
        if self.card.is_some() {
            return Ok(());
        }

        let reader_cstr = CString::new(self.reader_name.clone())
            .map_err(|_| PcscError::ReaderNotFound(self.reader_name.clone()))?;

        match self.context.connect(
            &reader_cstr,
            self.config.share_mode.into(),
            self.config.protocols,
        ) {
            Ok(card) => {
                debug!(reader = %self.reader_name, "Connected to card");
                self.card = Some(card);
                Ok(())
            }
            Err(pcsc::Error::NoSmartcard) => Err(PcscError::NoCard(self.reader_name.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Get the ATR of the current card
    pub fn atr(&self) -> Result<Vec<u8>, PcscError> {
        self.card.as_ref().map_or_else(
            || Err(PcscError::NoCard(self.reader_name.clone())),
            |card| {
                card.get_attribute_owned(pcsc::Attribute::AtrString)
                    .map_err(Into::into)
            },
        )
    }

    /// Get the reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    /// Transmit a command to the card
    fn transmit_command(&mut self, command: &[u8], retried: bool) -> Result<Bytes, PcscError> {
        self.connect_card()?;

        let card = self
            .card
            .as_mut()
            .ok_or_else(|| PcscError::NoCard(self.reader_name.clone()))?;

        let mut response_buffer = [0u8; MAX_BUFFER_SIZE];

        match card.transmit(command, &mut response_buffer) {
            Ok(response) => Ok(Bytes::copy_from_slice(response)),
            Err(e) => {
                // If card was reset or removed, clear our reference
                if matches!(e, pcsc::Error::ResetCard | pcsc::Error::RemovedCard) {
                    self.card = None;

                    // A reset card is reconnected once and the command replayed
                    if self.config.auto_reconnect && e == pcsc::Error::ResetCard && !retried {
                        debug!(reader = %self.reader_name, "Card was reset, reconnecting");
                        return self.transmit_command(command, true);
                    }
                    if e == pcsc::Error::RemovedCard {
                        return Err(PcscError::CardRemoved);
                    }
                }

                Err(e.into())
            }
        }
    }
}

impl CardTransport for PcscTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        self.transmit_command(command, false)
            .map_err(TransportError::from)
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        self.connect_card().map_err(Into::into)
    }

    fn is_connected(&self) -> bool {
        self.card.is_some()
    }

    fn disconnect(&mut self) -> bool {
        match self.card.take() {
            Some(card) => match card.disconnect(Disposition::ResetCard) {
                Ok(()) => true,
                Err((_, e)) => {
                    debug!(reader = %self.reader_name, error = %e, "Card disconnect failed");
                    false
                }
            },
            None => false,
        }
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        // Disconnect from the card
        if let Some(card) = self.card.take() {
            let _ = card.disconnect(Disposition::LeaveCard);
        }
    }
}

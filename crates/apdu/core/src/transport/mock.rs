//! Scripted transport used by tests

use std::collections::VecDeque;

use bytes::Bytes;

use super::{CardTransport, TransportError};

/// Transport replaying a fixed list of responses and recording every command
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    /// Responses still to be returned, in order
    pub responses: VecDeque<Bytes>,
    /// Commands that were sent
    pub commands: Vec<Bytes>,
    /// Whether the transport is connected
    pub connected: bool,
    /// Whether `connect` should fail as if no card were inserted
    pub absent: bool,
    /// Number of times `disconnect` dropped a live connection
    pub disconnects: usize,
}

impl MockTransport {
    /// Create a new mock transport with the given responses
    pub fn new<I, B>(responses: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Create a mock transport from hex encoded responses
    pub fn from_hex(responses: &[&str]) -> Result<Self, hex::FromHexError> {
        let decoded = responses
            .iter()
            .map(hex::decode)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(decoded))
    }

    /// Create a mock transport behaving like an empty reader
    pub fn absent() -> Self {
        Self {
            absent: true,
            ..Self::default()
        }
    }

    /// Commands sent so far, hex encoded in upper case
    pub fn sent_hex(&self) -> Vec<String> {
        self.commands.iter().map(hex::encode_upper).collect()
    }
}

impl CardTransport for MockTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::Connection);
        }

        self.commands.push(Bytes::copy_from_slice(command));
        self.responses
            .pop_front()
            .ok_or(TransportError::Transmission)
    }

    fn connect(&mut self) -> Result<(), TransportError> {
        if self.absent {
            return Err(TransportError::NoCard);
        }
        self.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn disconnect(&mut self) -> bool {
        if !self.connected {
            return false;
        }
        self.connected = false;
        self.disconnects += 1;
        true
    }
}

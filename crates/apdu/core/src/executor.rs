//! Command execution on top of a [`CardTransport`]

use tracing::{Level, debug, event, instrument};

use crate::command::{Command, ExpectedLength};
use crate::response::Response;
use crate::transport::CardTransport;
use crate::Result;

/// Class byte used for UICC commands
pub const CLA_UICC: u8 = 0x00;
/// GET RESPONSE instruction
pub const INS_GET_RESPONSE: u8 = 0xC0;

/// Card executor sending typed commands through a transport
#[derive(Debug)]
pub struct CardExecutor<T: CardTransport> {
    /// The transport used for communication
    transport: T,
    /// The last response received
    last_response: Option<Response>,
}

impl<T: CardTransport> CardExecutor<T> {
    /// Create a new card executor with the given transport
    pub const fn new(transport: T) -> Self {
        Self {
            transport,
            last_response: None,
        }
    }

    /// Get a reference to the underlying transport
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Get a mutable reference to the underlying transport
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Take ownership of the transport and return it
    pub fn into_transport(self) -> T {
        self.transport
    }

    /// The last response received, if any
    pub const fn last_response(&self) -> Option<&Response> {
        self.last_response.as_ref()
    }

    /// Transmit a command and parse the reply
    ///
    /// Status words are not interpreted here; a non-success status is still
    /// an `Ok` response. Only transport failures are errors.
    #[instrument(level = "trace", skip_all, fields(command = %command))]
    pub fn transmit(&mut self, command: &Command) -> Result<Response> {
        let raw = self.transport.transmit_raw(&command.to_bytes())?;
        let response = Response::from_bytes(&raw);

        match response.status() {
            Some(status) => event!(
                Level::DEBUG,
                status = %status,
                description = status.description(),
                data_len = response.data().len(),
                "APDU exchanged"
            ),
            None => debug!("APDU exchanged without status word"),
        }

        self.last_response = Some(response.clone());
        Ok(response)
    }

    /// Issue GET RESPONSE for `le` bytes
    pub fn get_response(&mut self, le: ExpectedLength) -> Result<Response> {
        self.transmit(&Command::new_with_le(CLA_UICC, INS_GET_RESPONSE, 0x00, 0x00, le))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;

    #[test]
    fn test_transmit_and_get_response() {
        let mut transport = MockTransport::from_hex(&["6120", "0102039000"]).unwrap();
        transport.connected = true;
        let mut executor = CardExecutor::new(transport);

        let select = Command::new_with_data(CLA_UICC, 0xA4, 0x00, 0x04, vec![0x2F, 0x00]);
        let response = executor.transmit(&select).unwrap();
        assert!(response.is_more_data_available());

        let response = executor.get_response(response.sw2()).unwrap();
        assert_eq!(response.data().as_ref(), &[0x01, 0x02, 0x03]);
        assert_eq!(executor.last_response(), Some(&response));

        assert_eq!(
            executor.transport().sent_hex(),
            vec!["00A40004022F00".to_string(), "00C0000020".to_string()]
        );
    }

    #[test]
    fn test_transport_error_is_propagated() {
        let mut executor = CardExecutor::new(MockTransport::default());
        assert!(executor.transmit(&Command::new(0x00, 0xA4, 0x00, 0x04)).is_err());
    }
}

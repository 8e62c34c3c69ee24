//! USIM access through a smart card reader

use endorse_apdu_core::{CardExecutor, CardTransport, Command, Imsi, Response};
use endorse_apdu_transport_pcsc::{PcscConfig, PcscDeviceManager, PcscTransport};
use tracing::{debug, instrument, warn};

use crate::commands;
use crate::constants::file_id;
use crate::dir::Dir;
use crate::fcp::Fcp;
use crate::interface::UiccInterface;
use crate::{Error, Result};

/// UICC transport speaking APDUs over a [`CardTransport`]
///
/// Every operation connects, runs its command sequence and resets the card.
/// The USIM AID found in EF_DIR is kept for later calls.
#[derive(Debug)]
pub struct Iso7816Interface<T: CardTransport> {
    executor: CardExecutor<T>,
    adf_aid: Option<Vec<u8>>,
}

impl Iso7816Interface<PcscTransport> {
    /// Open the first PC/SC reader
    pub fn open_default() -> Result<Self> {
        let manager = PcscDeviceManager::new()?;
        let transport = manager.open_first_reader(PcscConfig::default())?;
        debug!(reader = transport.reader_name(), "Using PC/SC reader");
        Ok(Self::new(transport))
    }
}

impl<T: CardTransport> Iso7816Interface<T> {
    /// Wrap a transport
    pub const fn new(transport: T) -> Self {
        Self {
            executor: CardExecutor::new(transport),
            adf_aid: None,
        }
    }

    /// The USIM AID, once discovered
    pub fn adf_aid(&self) -> Option<&[u8]> {
        self.adf_aid.as_deref()
    }

    /// The underlying transport
    pub const fn transport(&self) -> &T {
        self.executor.transport()
    }

    fn connect(&mut self) -> Result<()> {
        self.executor
            .transport_mut()
            .connect()
            .map_err(endorse_apdu_core::Error::from)?;
        Ok(())
    }

    fn transmit(&mut self, command: &Command) -> Result<Response> {
        Ok(self.executor.transmit(command)?)
    }

    /// Transmit and require a success status
    fn transmit_ok(&mut self, command: &Command) -> Result<Response> {
        let response = self.transmit(command)?;
        match response.status() {
            Some(status) if status.is_success() => Ok(response),
            Some(status) => Err(endorse_apdu_core::Error::Status { status }.into()),
            None => Err(endorse_apdu_core::Error::NoStatus.into()),
        }
    }

    /// Follow a 61xx status with GET RESPONSE
    fn fetch_pending(&mut self, response: Response) -> Result<Response> {
        match response.status().and_then(|s| s.remaining_bytes()) {
            Some(le) => self.transmit_ok(&commands::get_response(le)),
            None => Ok(response),
        }
    }

    /// Locate the USIM through EF_DIR, caching its AID
    fn find_adf(&mut self) -> Result<Vec<u8>> {
        if let Some(aid) = &self.adf_aid {
            return Ok(aid.clone());
        }

        self.transmit_ok(&commands::select_mf())?;
        let selected = self.transmit_ok(&commands::select_file(file_id::EF_DIR))?;
        let fcp = Fcp::new(self.fetch_pending(selected)?.data());
        let record_size = fcp
            .record_size()
            .ok_or(Error::ProtocolDecodeFailure("EF_DIR file control parameters"))?;

        let record = self.transmit_ok(&commands::read_record(1, record_size))?;
        let aid = Dir::new(record.data())
            .aid()
            .map(<[u8]>::to_vec)
            .ok_or(Error::ProtocolDecodeFailure("EF_DIR record"))?;

        debug!(aid = %hex::encode_upper(&aid), "Found USIM application");
        self.adf_aid = Some(aid.clone());
        Ok(aid)
    }

    fn run_read_imsi(&mut self) -> Result<Imsi> {
        self.connect()?;
        let aid = self.find_adf()?;
        self.transmit_ok(&commands::select_adf(&aid))?;
        self.transmit_ok(&commands::select_file(file_id::EF_IMSI))?;
        let content = self.transmit_ok(&commands::read_imsi())?;
        Ok(Imsi::from_ef_imsi(content.data())?)
    }

    fn run_authenticate(&mut self, rand: &[u8], autn: &[u8]) -> Result<Vec<u8>> {
        self.connect()?;
        let aid = self.find_adf()?;
        let selected = self.transmit_ok(&commands::select_adf(&aid))?;
        self.fetch_pending(selected)?;

        let response = self.transmit(&commands::authenticate(rand, autn)?)?;
        let data = match response.status() {
            Some(status) if status.sw1 == 0x61 || status.sw1 == 0x6E => {
                self.transmit_ok(&commands::get_response(status.sw2))?.into_data()
            }
            // T=1 readers hand the data back directly
            Some(status) if status.is_normal_ending() && !response.data().is_empty() => {
                response.into_data()
            }
            Some(status) => return Err(endorse_apdu_core::Error::Status { status }.into()),
            None => return Err(endorse_apdu_core::Error::NoStatus.into()),
        };
        Ok(data.to_vec())
    }
}

impl<T: CardTransport> UiccInterface for Iso7816Interface<T> {
    #[instrument(level = "debug", skip_all)]
    fn read_imsi(&mut self) -> Option<String> {
        let result = self.run_read_imsi();
        self.disconnect();
        match result {
            Ok(imsi) => Some(imsi.to_string()),
            Err(e) => {
                warn!(error = %e, "Could not read IMSI from card");
                None
            }
        }
    }

    #[instrument(level = "debug", skip_all)]
    fn authenticate(&mut self, rand: &[u8], autn: &[u8]) -> Option<Vec<u8>> {
        let result = self.run_authenticate(rand, autn);
        self.disconnect();
        match result {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(error = %e, "AUTHENTICATE failed");
                None
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        self.executor.transport_mut().disconnect()
    }
}

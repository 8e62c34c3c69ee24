//! Find the card by racing every reader and serial port
//!
//! Each candidate transport gets its own thread calling `read_imsi`. The
//! first probe to report an IMSI wins and the caller is released at once;
//! if no probe finds one, the caller is released when the last probe ends.
//! Probes finishing after the race is decided disconnect their transport
//! and their result is dropped.

use std::{sync::Arc, thread, time::Duration};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use endorse_apdu_transport_pcsc::{PcscConfig, PcscDeviceManager};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::interface::{
    Iso7816Interface, OpenOptions, SerialInterface, UiccInterface, serial::list_ports,
};
use crate::{Error, Result};

/// Default upper bound on a detection race
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_secs(90);

/// A candidate transport
#[derive(Debug)]
pub struct Probe {
    description: String,
    interface: Box<dyn UiccInterface>,
}

impl Probe {
    /// Wrap a transport with a human readable description
    pub fn new(description: impl Into<String>, interface: Box<dyn UiccInterface>) -> Self {
        Self {
            description: description.into(),
            interface,
        }
    }

    /// Description used in logs
    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Every PC/SC reader and every serial port on this machine
pub fn candidates(options: &OpenOptions) -> Vec<Probe> {
    let mut probes = Vec::new();

    match PcscDeviceManager::new().and_then(|manager| {
        let readers = manager.list_readers()?;
        Ok(readers
            .iter()
            .map(|reader| {
                let transport = manager.open_reader_with_config(reader.name(), PcscConfig::default());
                Probe::new(
                    format!("Iso7816 interface [{}]", reader.name()),
                    Box::new(Iso7816Interface::new(transport)),
                )
            })
            .collect::<Vec<_>>())
    }) {
        Ok(readers) => probes.extend(readers),
        Err(e) => debug!(error = %e, "No PC/SC readers to probe"),
    }

    match list_ports() {
        Ok(ports) => probes.extend(ports.into_iter().map(|port| {
            Probe::new(
                format!("COM port [{port}]"),
                Box::new(SerialInterface::serial(options.serial.with_port(port))),
            )
        })),
        Err(e) => debug!(error = %e, "No serial ports to probe"),
    }

    probes
}

/// The probe that found the card
#[derive(Debug)]
struct Detected {
    probe: Probe,
    imsi: String,
}

#[derive(Debug, Default)]
struct RaceState {
    completed: usize,
    decided: bool,
}

/// Shared by all probe threads; the only sender of the race outcome
#[derive(Debug)]
struct Coordinator {
    total: usize,
    state: Mutex<RaceState>,
    outcome: Sender<Option<Detected>>,
}

impl Coordinator {
    fn finish(&self, mut probe: Probe, imsi: Option<String>) {
        let imsi = imsi.filter(|imsi| !imsi.is_empty());
        // transports are released outside the lock
        let (won, exhausted) = {
            let mut state = self.state.lock();
            state.completed += 1;
            let won = imsi.is_some() && !state.decided;
            let exhausted = !won && !state.decided && state.completed == self.total;
            state.decided |= won || exhausted;
            (won, exhausted)
        };

        match imsi {
            Some(imsi) if won => {
                info!(interface = probe.description(), imsi = %imsi, "SIM was detected");
                if let Err(unsent) = self.outcome.send(Some(Detected { probe, imsi })) {
                    // the caller gave up waiting
                    if let Some(mut detected) = unsent.into_inner() {
                        detected.probe.interface.disconnect();
                    }
                }
            }
            _ => {
                probe.interface.disconnect();
                if exhausted {
                    let _ = self.outcome.send(None);
                }
            }
        }
    }
}

/// Run `read_imsi` on every probe concurrently and return the first hit
fn race(probes: Vec<Probe>, timeout: Duration) -> Result<Detected> {
    if probes.is_empty() {
        return Err(Error::NoCandidates);
    }

    let (tx, rx) = bounded(1);
    let coordinator = Arc::new(Coordinator {
        total: probes.len(),
        state: Mutex::new(RaceState::default()),
        outcome: tx,
    });

    for (index, mut probe) in probes.into_iter().enumerate() {
        let coordinator = Arc::clone(&coordinator);
        info!(interface = probe.description(), "Detecting SIM");
        thread::Builder::new()
            .name(format!("uicc-probe-{index}"))
            .spawn(move || {
                let imsi = probe.interface.read_imsi();
                coordinator.finish(probe, imsi);
            })?;
    }
    // only probe threads may keep the channel alive
    drop(coordinator);

    match rx.recv_timeout(timeout) {
        Ok(Some(detected)) => Ok(detected),
        Ok(None) | Err(RecvTimeoutError::Disconnected) => Err(Error::DetectionFailed),
        Err(RecvTimeoutError::Timeout) => {
            warn!(?timeout, "UICC detection timed out");
            Err(Error::DetectionTimedOut(timeout))
        }
    }
}

/// UICC transport chosen by racing all candidates
#[derive(Debug)]
pub struct AutoDetectInterface {
    description: String,
    imsi: String,
    inner: Box<dyn UiccInterface>,
}

impl AutoDetectInterface {
    /// Race every reader and serial port on this machine
    pub fn detect(options: &OpenOptions) -> Result<Self> {
        Self::from_probes(candidates(options), options.detect_timeout)
    }

    /// Race the given probes
    pub fn from_probes(probes: Vec<Probe>, timeout: Duration) -> Result<Self> {
        let Detected { mut probe, imsi } = race(probes, timeout)?;
        probe.interface.disconnect();
        Ok(Self {
            description: probe.description,
            imsi,
            inner: probe.interface,
        })
    }

    /// Description of the winning transport
    pub fn description(&self) -> &str {
        &self.description
    }

    /// IMSI reported during detection
    pub fn detected_imsi(&self) -> &str {
        &self.imsi
    }
}

impl UiccInterface for AutoDetectInterface {
    fn read_imsi(&mut self) -> Option<String> {
        self.inner.read_imsi()
    }

    fn authenticate(&mut self, rand: &[u8], autn: &[u8]) -> Option<Vec<u8>> {
        self.inner.authenticate(rand, autn)
    }

    fn disconnect(&mut self) -> bool {
        self.inner.disconnect()
    }
}

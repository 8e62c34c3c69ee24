//! Modem attached to a serial line

use std::{
    fmt,
    io::{self, Read, Write},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use serde::{Deserialize, Serialize};
use serialport::{DataBits, Parity, SerialPort, StopBits};
use tracing::{debug, trace, warn};

use crate::interface::at::{AtChannel, AtInterface};
use crate::{Error, Result};

/// Upper bound on the wait for one AT reply
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Poll interval of the reader thread
const READ_POLL: Duration = Duration::from_millis(100);

/// Serial line settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name, e.g. `/dev/ttyUSB2` or `COM3`
    pub port_name: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5 to 8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity: 0 none, 1 odd, 2 even
    pub parity: u8,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: 57600,
            data_bits: 8,
            stop_bits: 1,
            parity: 0,
        }
    }
}

impl SerialConfig {
    /// Same settings on another port
    pub fn with_port(&self, port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..self.clone()
        }
    }

    fn data_bits(&self) -> Result<DataBits> {
        match self.data_bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(Error::unavailable(format!("unsupported data bits {other}"))),
        }
    }

    fn stop_bits(&self) -> Result<StopBits> {
        match self.stop_bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(Error::unavailable(format!("unsupported stop bits {other}"))),
        }
    }

    fn parity(&self) -> Result<Parity> {
        match self.parity {
            0 => Ok(Parity::None),
            1 => Ok(Parity::Odd),
            2 => Ok(Parity::Even),
            other => Err(Error::unavailable(format!("unsupported parity {other}"))),
        }
    }
}

/// Names of the serial ports present on this machine
pub fn list_ports() -> Result<Vec<String>> {
    Ok(serialport::available_ports()?
        .into_iter()
        .map(|port| port.port_name)
        .collect())
}

/// Whether an accumulated reply carries a final result code
fn is_complete(reply: &str) -> bool {
    let reply = reply.trim();
    reply.ends_with("OK") || reply.ends_with("ERROR") || reply.contains("+CME ERROR")
}

/// Remove every echo of `command` from `reply`
fn strip_echo(reply: &str, command: &str) -> String {
    let mut reply = reply.trim().to_string();
    while !command.is_empty() && reply.contains(command) {
        reply = reply.replace(command, "");
    }
    reply
}

struct OpenPort {
    port: Box<dyn SerialPort>,
    chunks: Receiver<Vec<u8>>,
    stop: Arc<AtomicBool>,
}

/// [`AtChannel`] over a serial port
///
/// A reader thread forwards everything the modem sends through a channel;
/// `send` writes a command and collects chunks until a final result code
/// arrives or the response timeout passes.
pub struct SerialChannel {
    config: SerialConfig,
    response_timeout: Duration,
    open: Option<OpenPort>,
}

impl fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialChannel")
            .field("config", &self.config)
            .field("response_timeout", &self.response_timeout)
            .field("open", &self.open.is_some())
            .finish()
    }
}

impl SerialChannel {
    /// Channel for the given line settings
    pub const fn new(config: SerialConfig) -> Self {
        Self {
            config,
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            open: None,
        }
    }

    /// Change how long `send` waits for a final result code
    pub const fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Line settings
    pub const fn config(&self) -> &SerialConfig {
        &self.config
    }

    fn spawn_reader(
        mut port: Box<dyn SerialPort>,
        name: String,
    ) -> Result<(Receiver<Vec<u8>>, Arc<AtomicBool>)> {
        let (tx, rx) = unbounded();
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);

        thread::Builder::new()
            .name(format!("serial-reader-{name}"))
            .spawn(move || {
                let mut buf = [0u8; 256];
                while !stop_flag.load(Ordering::Relaxed) {
                    match port.read(&mut buf) {
                        Ok(0) => {}
                        Ok(n) => {
                            trace!(port = %name, bytes = n, "Serial data received");
                            if tx.send(buf[..n].to_vec()).is_err() {
                                break;
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                        Err(e) => {
                            debug!(port = %name, error = %e, "Serial reader stopped");
                            break;
                        }
                    }
                }
            })?;

        Ok((rx, stop))
    }
}

impl AtChannel for SerialChannel {
    fn open(&mut self) -> Result<()> {
        if self.open.is_some() {
            return Ok(());
        }

        let config = &self.config;
        let port = serialport::new(&config.port_name, config.baud_rate)
            .data_bits(config.data_bits()?)
            .stop_bits(config.stop_bits()?)
            .parity(config.parity()?)
            .timeout(READ_POLL)
            .open()?;
        let (chunks, stop) = Self::spawn_reader(port.try_clone()?, config.port_name.clone())?;

        debug!(port = %config.port_name, baud = config.baud_rate, "Serial port opened");
        self.open = Some(OpenPort { port, chunks, stop });
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.is_some()
    }

    fn send(&mut self, command: &str) -> Result<String> {
        if command.is_empty() {
            return Ok(String::new());
        }
        let open = self
            .open
            .as_mut()
            .ok_or_else(|| Error::unavailable(format!("{} is not open", self.config.port_name)))?;

        // stale output from a previous command
        while open.chunks.try_recv().is_ok() {}

        debug!(command, "AT send");
        let mut line = command.to_string();
        if !line.ends_with("\r\n") {
            line.push_str("\r\n");
        }
        open.port.write_all(line.as_bytes())?;
        open.port.flush()?;

        let deadline = Instant::now() + self.response_timeout;
        let mut reply = String::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match open.chunks.recv_timeout(remaining) {
                Ok(chunk) => {
                    reply.push_str(&String::from_utf8_lossy(&chunk));
                    if is_complete(&reply) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!(command, "No final result code before timeout");
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        let reply = strip_echo(&reply, command.trim_end());
        debug!(reply = %reply, "AT reply");
        Ok(reply)
    }

    fn close(&mut self) -> bool {
        match self.open.take() {
            Some(open) => {
                open.stop.store(true, Ordering::Relaxed);
                debug!(port = %self.config.port_name, "Serial port closed");
                true
            }
            None => false,
        }
    }
}

impl Drop for SerialChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// Modem on a serial line
pub type SerialInterface = AtInterface<SerialChannel>;

impl SerialInterface {
    /// Modem on the port described by `config`
    pub const fn serial(config: SerialConfig) -> Self {
        Self::new(SerialChannel::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::UiccInterface;

    #[test]
    fn test_default_settings() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, 57600);
        assert_eq!(config.data_bits().unwrap(), DataBits::Eight);
        assert_eq!(config.stop_bits().unwrap(), StopBits::One);
        assert_eq!(config.parity().unwrap(), Parity::None);
        assert_eq!(config.with_port("COM3").port_name, "COM3");
    }

    #[test]
    fn test_unsupported_settings() {
        let config = SerialConfig {
            data_bits: 9,
            stop_bits: 3,
            parity: 3,
            ..SerialConfig::default()
        };
        assert!(config.data_bits().is_err());
        assert!(config.stop_bits().is_err());
        assert!(config.parity().is_err());
    }

    #[test]
    fn test_reply_completion() {
        assert!(is_complete("\r\n440103123456789\r\n\r\nOK\r\n"));
        assert!(is_complete("ERROR\r\n"));
        assert!(is_complete("+CME ERROR: 10\r\n"));
        assert!(!is_complete("\r\n+CSIM: 4,\"9000\"\r\n"));
    }

    #[test]
    fn test_strip_echo() {
        assert_eq!(
            strip_echo("AT+CIMI\r\r\n440103123456789\r\n\r\nOK\r\n", "AT+CIMI"),
            "\r\r\n440103123456789\r\n\r\nOK"
        );
        assert_eq!(strip_echo(" OK ", ""), "OK");
    }

    #[test]
    fn test_send_requires_open_port() {
        let mut channel = SerialChannel::new(SerialConfig::default().with_port("/dev/null-modem"));
        assert!(!channel.is_open());
        assert!(channel.send("AT").is_err());
        assert!(!channel.close());
    }

    #[test]
    fn test_missing_port_reads_no_imsi() {
        let mut uicc = SerialInterface::serial(SerialConfig::default().with_port("/dev/does-not-exist"));
        assert_eq!(uicc.read_imsi(), None);
        assert!(!uicc.disconnect());
    }
}

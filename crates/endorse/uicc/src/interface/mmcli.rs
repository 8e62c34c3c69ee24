//! Modem reached through the ModemManager command line client

use std::process::Command;

use tracing::debug;

use crate::interface::at::{AtChannel, AtInterface};
use crate::{Error, Result};

/// ModemManager client binary
const MMCLI: &str = "mmcli";

/// Timeout handed to `mmcli`, in seconds
const MMCLI_TIMEOUT_SECS: u32 = 60;

/// Whether ModemManager can exist on this platform
pub const fn is_supported_platform() -> bool {
    !cfg!(any(target_os = "windows", target_os = "macos"))
}

/// Arguments for one AT command
pub fn mmcli_args(modem_index: u32, command: &str) -> Vec<String> {
    vec![
        "-m".to_string(),
        modem_index.to_string(),
        format!("--timeout={MMCLI_TIMEOUT_SECS}"),
        format!("--command={command}"),
    ]
}

/// Turn `mmcli` output into an AT style reply
///
/// Unsolicited `^` lines are dropped, `response: '...'` is unwrapped and
/// the reply ends in `OK` when nothing was written to stderr, else `ERROR`.
pub fn parse_mmcli_output(stdout: &str, stderr: &str) -> String {
    let mut reply = String::new();
    for line in stdout.lines().filter(|line| !line.starts_with('^')) {
        let line = line.strip_prefix("response: '").unwrap_or(line);
        let line = line.strip_suffix('\'').unwrap_or(line);
        reply.push_str(line);
        reply.push_str("\r\n");
    }
    reply.push_str(if stderr.trim().is_empty() { "OK" } else { "ERROR" });
    reply
}

/// [`AtChannel`] running `mmcli -m <index> --command=<AT>` per command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MmcliChannel {
    modem_index: u32,
}

impl MmcliChannel {
    /// Channel for ModemManager modem `modem_index`
    pub const fn new(modem_index: u32) -> Self {
        Self { modem_index }
    }

    /// ModemManager modem index
    pub const fn modem_index(&self) -> u32 {
        self.modem_index
    }
}

impl AtChannel for MmcliChannel {
    fn open(&mut self) -> Result<()> {
        if is_supported_platform() {
            Ok(())
        } else {
            Err(Error::unavailable("mmcli is not available on this platform"))
        }
    }

    fn is_open(&self) -> bool {
        false
    }

    fn send(&mut self, command: &str) -> Result<String> {
        if command.is_empty() {
            return Ok(String::new());
        }
        let args = mmcli_args(self.modem_index, command);
        debug!(?args, "Executing mmcli");

        let output = Command::new(MMCLI).args(&args).output()?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            debug!(stderr = %stderr.trim(), "mmcli reported an error");
        }

        Ok(parse_mmcli_output(&stdout, &stderr))
    }

    fn close(&mut self) -> bool {
        true
    }
}

/// Modem behind ModemManager
pub type MmcliInterface = AtInterface<MmcliChannel>;

impl MmcliInterface {
    /// Modem `modem_index` as numbered by ModemManager
    pub const fn mmcli(modem_index: u32) -> Self {
        Self::new(MmcliChannel::new(modem_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::at::{parse_csim_response, parse_generic_response};

    #[test]
    fn test_args_are_not_shell_quoted() {
        assert_eq!(
            mmcli_args(2, "AT+CSIM=10,\"00C0000035\""),
            vec!["-m", "2", "--timeout=60", "--command=AT+CSIM=10,\"00C0000035\""]
        );
    }

    #[test]
    fn test_parse_imsi_output() {
        let reply = parse_mmcli_output("response: '440103123456789'\n", "");
        assert_eq!(reply, "440103123456789\r\nOK");
        assert_eq!(parse_generic_response(&reply).as_deref(), Some("440103123456789"));
    }

    #[test]
    fn test_parse_csim_output() {
        let reply = parse_mmcli_output("^BOOT:1234\nresponse: '+CSIM: 4,\"6135\"'\n", "");
        assert_eq!(parse_csim_response(&reply).as_deref(), Some("6135"));
    }

    #[test]
    fn test_stderr_means_error() {
        let reply = parse_mmcli_output("", "error: modem not found\n");
        assert_eq!(reply, "ERROR");
        assert_eq!(parse_generic_response(&reply), None);
    }

    #[test]
    fn test_disconnect_always_succeeds() {
        use crate::interface::UiccInterface;

        let mut uicc = MmcliInterface::mmcli(0);
        assert!(uicc.disconnect());
        assert_eq!(uicc.channel().modem_index(), 0);
    }
}

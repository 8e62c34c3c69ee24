//! AT command handling shared by the modem transports
//!
//! The modem answers `AT+CIMI` with the IMSI and forwards raw APDUs to the
//! USIM through `AT+CSIM=<length>,"<hex>"`. How the command reaches the
//! modem is up to the [`AtChannel`].

use std::fmt;

use endorse_apdu_core::codec::{from_hex, to_hex};
use tracing::{debug, warn};

use crate::commands::authenticate_data;
use crate::constants::{AUTH_CONTEXT_3G, CLA, ins};
use crate::interface::UiccInterface;
use crate::{Error, Result};

/// A line to a modem that executes one AT command at a time
pub trait AtChannel: Send + fmt::Debug {
    /// Open the line
    fn open(&mut self) -> Result<()>;

    /// Whether the line is open
    fn is_open(&self) -> bool;

    /// Send `command` and return the raw reply, including the final result code
    fn send(&mut self, command: &str) -> Result<String>;

    /// Close the line
    fn close(&mut self) -> bool;
}

/// Drop unsolicited (`^`) and event (`+`) lines
pub fn clean_response(response: &str, remove_unsolicited: bool, remove_events: bool) -> String {
    response
        .lines()
        .filter(|line| !(remove_unsolicited && line.starts_with('^')))
        .filter(|line| !(remove_events && line.starts_with('+')))
        .collect::<Vec<_>>()
        .join("\r\n")
        .trim()
        .to_string()
}

/// The line of `response` that starts at `pattern`
fn target_line<'a>(response: &'a str, pattern: &str) -> Option<&'a str> {
    let start = response.find(pattern)?;
    let rest = &response[start..];
    Some(rest.split('\r').next().unwrap_or(rest).trim())
}

/// Text of a reply ending in `OK`, without the result code
///
/// Unsolicited and event lines are dropped first. Anything else, such as
/// an `ERROR` reply, yields `None`.
pub fn parse_generic_response(response: &str) -> Option<String> {
    let cleaned = clean_response(response, true, true);
    cleaned
        .strip_suffix("OK")
        .map(|body| body.trim().to_string())
}

/// Quoted hex payload of a `+CSIM: <len>,"<hex>"` reply
///
/// Payloads with anything but ASCII in them are garbled and yield `None`.
pub fn parse_csim_response(response: &str) -> Option<String> {
    let line = target_line(response, "+CSIM:")?;
    let payload = line.strip_prefix("+CSIM:")?.split(',').nth(1)?;
    Some(payload.replace('"', "")).filter(|payload| payload.is_ascii())
}

/// Hex AUTHENTICATE APDU without Le
pub fn authenticate_apdu(rand: &[u8], autn: &[u8]) -> Result<String> {
    let data = authenticate_data(rand, autn)?;
    let lc = u8::try_from(data.len()).map_err(|_| Error::ChallengeTooLong(data.len()))?;
    Ok(format!(
        "{}{}",
        to_hex([CLA, ins::AUTHENTICATE, 0x00, AUTH_CONTEXT_3G, lc]),
        to_hex(&data)
    ))
}

/// `AT+CSIM` command carrying a hex APDU
pub fn csim_command(apdu: &str) -> String {
    format!("AT+CSIM={},\"{apdu}\"", apdu.len())
}

/// `AT+CSIM` GET RESPONSE for `remaining` bytes (hex)
pub fn csim_get_response(remaining: &str) -> String {
    csim_command(&format!("00C00000{remaining}"))
}

/// UICC transport driving a modem with AT commands
#[derive(Debug)]
pub struct AtInterface<C: AtChannel> {
    channel: C,
}

impl<C: AtChannel> AtInterface<C> {
    /// Wrap a channel
    pub const fn new(channel: C) -> Self {
        Self { channel }
    }

    /// The underlying channel
    pub const fn channel(&self) -> &C {
        &self.channel
    }

    /// Open the channel unless it already is, reporting whether it was opened here
    fn ensure_open(&mut self) -> Result<bool> {
        if self.channel.is_open() {
            return Ok(false);
        }
        self.channel.open()?;
        Ok(true)
    }

    /// Run `f` with the channel open, closing it again if it was opened for `f`
    fn with_channel<R>(&mut self, f: impl FnOnce(&mut C) -> Result<R>) -> Result<R> {
        let opened = self.ensure_open()?;
        let result = f(&mut self.channel);
        if opened {
            self.channel.close();
        }
        result
    }

    /// Modem identity as `Manufacturer/Model/Revision/S/N` lines
    pub fn query_device(&mut self) -> Result<String> {
        self.with_channel(|channel| {
            let mut info = String::new();
            for (label, command) in [
                ("Manufacturer", "AT+CGMI"),
                ("Model", "AT+CGMM"),
                ("Revision", "AT+CGMR"),
                ("S/N", "AT+CGSN"),
            ] {
                let reply = channel.send(command)?;
                let value = if reply.is_empty() {
                    "N/A".to_string()
                } else {
                    parse_generic_response(&reply).unwrap_or_default()
                };
                info.push_str(&format!("{label}: {value}\r\n"));
            }
            Ok(info)
        })
    }

    fn run_authenticate(channel: &mut C, rand: &[u8], autn: &[u8]) -> Result<Option<Vec<u8>>> {
        let apdu = authenticate_apdu(rand, autn)?;

        // Ask for Le = 00 first; some modems reject a case 4 APDU
        let mut reply = channel.send(&csim_command(&format!("{apdu}00")))?;
        if reply.to_uppercase().contains("ERROR") {
            debug!("Modem rejected AUTHENTICATE with Le, retrying without");
            reply = channel.send(&csim_command(&apdu))?;
        }

        let Some(mut payload) = parse_csim_response(&reply) else {
            return Ok(None);
        };
        let Some(sw) = payload.get(payload.len().saturating_sub(4)..).filter(|sw| sw.len() == 4)
        else {
            return Ok(None);
        };
        if let Some(remaining) = sw.strip_prefix("61") {
            let reply = channel.send(&csim_get_response(remaining))?;
            payload = parse_csim_response(&reply).unwrap_or_default();
        }

        match payload.strip_suffix("9000") {
            Some(data) => Ok(Some(from_hex(data)?)),
            None => {
                debug!(payload = %payload, "AUTHENTICATE did not end in 9000");
                Ok(None)
            }
        }
    }
}

impl<C: AtChannel> UiccInterface for AtInterface<C> {
    fn read_imsi(&mut self) -> Option<String> {
        match self.with_channel(|channel| channel.send("AT+CIMI")) {
            Ok(reply) => parse_generic_response(&reply).filter(|imsi| !imsi.is_empty()),
            Err(e) => {
                warn!(error = %e, "Could not read IMSI from modem");
                None
            }
        }
    }

    fn authenticate(&mut self, rand: &[u8], autn: &[u8]) -> Option<Vec<u8>> {
        match self.with_channel(|channel| Self::run_authenticate(channel, rand, autn)) {
            Ok(data) => data,
            Err(e) => {
                warn!(error = %e, "AUTHENTICATE through modem failed");
                None
            }
        }
    }

    fn disconnect(&mut self) -> bool {
        self.channel.close()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    /// Channel replaying canned replies
    #[derive(Debug, Default)]
    struct ScriptedChannel {
        replies: VecDeque<String>,
        sent: Vec<String>,
        open: bool,
        opens: usize,
        fail_open: bool,
    }

    impl ScriptedChannel {
        fn new(replies: &[&str]) -> Self {
            Self {
                replies: replies.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }
    }

    impl AtChannel for ScriptedChannel {
        fn open(&mut self) -> Result<()> {
            if self.fail_open {
                return Err(Error::unavailable("port busy"));
            }
            self.open = true;
            self.opens += 1;
            Ok(())
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn send(&mut self, command: &str) -> Result<String> {
            self.sent.push(command.to_string());
            Ok(self.replies.pop_front().unwrap_or_default())
        }

        fn close(&mut self) -> bool {
            std::mem::replace(&mut self.open, false)
        }
    }

    #[test]
    fn test_parse_generic_response() {
        assert_eq!(
            parse_generic_response("\r\n440103123456789\r\n\r\nOK\r\n").as_deref(),
            Some("440103123456789")
        );
        assert_eq!(
            parse_generic_response("^RSSI: 12\r\n+CREG: 1\r\n440103123456789\r\nOK").as_deref(),
            Some("440103123456789")
        );
        assert_eq!(parse_generic_response("+CME ERROR: 10"), None);
        assert_eq!(parse_generic_response("ERROR"), None);
    }

    #[test]
    fn test_parse_csim_response() {
        assert_eq!(
            parse_csim_response("\r\n+CSIM: 4,\"6135\"\r\n\r\nOK").as_deref(),
            Some("6135")
        );
        assert_eq!(parse_csim_response("+CSIM: 4"), None);
        assert_eq!(parse_csim_response("+CSIM: 6,\"\u{FFFD}900\"\r\nOK"), None);
        assert_eq!(parse_csim_response("OK"), None);
    }

    #[test]
    fn test_csim_envelope() {
        let apdu = authenticate_apdu(&[0xAA; 16], &[0xBB; 16]).unwrap();
        assert!(apdu.starts_with("008800812210AAAA"));
        assert_eq!(apdu.len(), 10 + 68);
        assert_eq!(csim_command("00C0000035"), "AT+CSIM=10,\"00C0000035\"");
        assert_eq!(csim_get_response("35"), "AT+CSIM=10,\"00C0000035\"");
    }

    #[test]
    fn test_read_imsi_opens_and_closes() {
        let mut uicc = AtInterface::new(ScriptedChannel::new(&["\r\n440103123456789\r\n\r\nOK\r\n"]));
        assert_eq!(uicc.read_imsi().as_deref(), Some("440103123456789"));
        assert_eq!(uicc.channel().sent, vec!["AT+CIMI"]);
        assert_eq!(uicc.channel().opens, 1);
        assert!(!uicc.channel().is_open());
    }

    #[test]
    fn test_read_imsi_unavailable_line() {
        let mut channel = ScriptedChannel::new(&[]);
        channel.fail_open = true;
        let mut uicc = AtInterface::new(channel);
        assert_eq!(uicc.read_imsi(), None);
        assert!(uicc.channel().sent.is_empty());
    }

    #[test]
    fn test_authenticate_with_get_response() {
        let mut uicc = AtInterface::new(ScriptedChannel::new(&[
            "+CSIM: 4,\"610B\"\r\nOK",
            "+CSIM: 26,\"DB02AABB02CCDD02EEFF009000\"\r\nOK",
        ]));
        let data = uicc.authenticate(&[0x11; 16], &[0x22; 16]).unwrap();
        assert_eq!(hex::encode_upper(data), "DB02AABB02CCDD02EEFF00");

        let sent = &uicc.channel().sent;
        assert!(sent[0].starts_with("AT+CSIM=80,\"0088008122"));
        assert!(sent[0].ends_with("00\""));
        assert_eq!(sent[1], "AT+CSIM=10,\"00C000000B\"");
    }

    #[test]
    fn test_authenticate_retries_without_le() {
        let mut uicc = AtInterface::new(ScriptedChannel::new(&[
            "ERROR",
            "+CSIM: 10,\"DC0111229000\"\r\nOK",
        ]));
        let data = uicc.authenticate(&[0x11; 16], &[0x22; 16]).unwrap();
        assert_eq!(data, vec![0xDC, 0x01, 0x11, 0x22]);
        assert!(uicc.channel().sent[1].starts_with("AT+CSIM=78,"));
    }

    #[test]
    fn test_authenticate_rejected_status() {
        let mut uicc = AtInterface::new(ScriptedChannel::new(&["+CSIM: 4,\"9862\"\r\nOK"]));
        assert_eq!(uicc.authenticate(&[0x11; 16], &[0x22; 16]), None);

        let mut uicc = AtInterface::new(ScriptedChannel::new(&["+CSIM: 2,\"98\"\r\nOK"]));
        assert_eq!(uicc.authenticate(&[0x11; 16], &[0x22; 16]), None);
    }

    #[test]
    fn test_authenticate_garbled_reply() {
        let mut uicc =
            AtInterface::new(ScriptedChannel::new(&["+CSIM: 6,\"\u{FFFD}900\"\r\nOK"]));
        assert_eq!(uicc.authenticate(&[0x11; 16], &[0x22; 16]), None);

        let mut uicc = AtInterface::new(ScriptedChannel::new(&["+CSIM: 6,\"9\u{FFFD}\"\r\nOK"]));
        assert_eq!(uicc.authenticate(&[0x11; 16], &[0x22; 16]), None);
    }

    #[test]
    fn test_authenticate_oversized_challenge() {
        let mut uicc = AtInterface::new(ScriptedChannel::new(&["+CSIM: 4,\"9000\"\r\nOK"]));
        assert_eq!(uicc.authenticate(&[0x11; 256], &[0x22; 16]), None);
        assert!(uicc.channel().sent.is_empty());
        assert!(matches!(
            authenticate_apdu(&[0x11; 200], &[0x22; 60]),
            Err(Error::ChallengeTooLong(262))
        ));
    }

    #[test]
    fn test_query_device() {
        let mut uicc = AtInterface::new(ScriptedChannel::new(&[
            "Quectel\r\nOK",
            "EC25\r\nOK",
            "",
            "866758042154321\r\nOK",
        ]));
        assert_eq!(
            uicc.query_device().unwrap(),
            "Manufacturer: Quectel\r\nModel: EC25\r\nRevision: N/A\r\nS/N: 866758042154321\r\n"
        );
    }
}

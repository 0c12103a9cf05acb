//! Virtual modem simulation
//!
//! Provides a simulated modem that consumes the bytes a driver writes and
//! produces the replies a real device would, including echo and unsolicited
//! notifications.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use sms_pdu::alphabet::to_ucs2;
use sms_pdu::{encode_submit, hex, Deliver, Pdu, PduError, SubmitOptions, Timestamp};
use tracing::debug;

const CTRL_Z: u8 = 0x1A;
const ESC: u8 = 0x1B;

/// Configuration for creating a virtual modem
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualModemConfig {
    /// Reply to `AT+CGSN`
    pub imei: String,
    /// Subscriber number reported by `AT+CNUM`
    pub own_number: Option<String>,
    pub own_name: String,
    pub operator: String,
    pub operator_numeric: String,
    /// RSSI index reported by `AT+CSQ`
    pub signal_quality: u8,
    /// SIM PIN; the SIM starts locked when set
    pub pin: Option<String>,
    /// Echo after power-up and `ATZ`
    pub echo: bool,
    /// Messages the SIM can hold
    pub storage_size: u32,
    /// Network reply to any USSD request
    pub ussd_reply: String,
}

impl Default for VirtualModemConfig {
    fn default() -> Self {
        Self {
            imei: "356938035643809".to_string(),
            own_number: Some("+491701234567".to_string()),
            own_name: "Own".to_string(),
            operator: "Virtual Net".to_string(),
            operator_numeric: "26299".to_string(),
            signal_quality: 23,
            pin: None,
            echo: true,
            storage_size: 30,
            ussd_reply: "Balance: 5.00 EUR".to_string(),
        }
    }
}

/// A message in SIM storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    /// 0 unread, 1 read, 2 unsent, 3 sent
    pub stat: u8,
    pub pdu: String,
}

/// A simulated modem that answers AT commands
#[derive(Debug)]
pub struct VirtualModem {
    config: VirtualModemConfig,
    echo: bool,
    pin_locked: bool,
    storage: BTreeMap<u32, StoredMessage>,
    /// Bytes of the command or payload being typed
    input: Vec<u8>,
    /// Length announced by `AT+CMGS` while waiting for the payload
    awaiting_payload: Option<usize>,
    /// Payloads accepted by `AT+CMGS`
    submitted: Vec<String>,
    next_reference: u8,
    /// Accept this many payloads, then reject the rest
    submit_limit: Option<usize>,
    fail_prefixes: Vec<String>,
    silent_prefixes: Vec<String>,
    pending_output: VecDeque<Vec<u8>>,
}

impl Default for VirtualModem {
    fn default() -> Self {
        Self::from_config(VirtualModemConfig::default())
    }
}

impl VirtualModem {
    /// Create a virtual modem from configuration
    pub fn from_config(config: VirtualModemConfig) -> Self {
        Self {
            echo: config.echo,
            pin_locked: config.pin.is_some(),
            config,
            storage: BTreeMap::new(),
            input: Vec::new(),
            awaiting_payload: None,
            submitted: Vec::new(),
            next_reference: 1,
            submit_limit: None,
            fail_prefixes: Vec::new(),
            silent_prefixes: Vec::new(),
            pending_output: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &VirtualModemConfig {
        &self.config
    }

    pub fn echo(&self) -> bool {
        self.echo
    }

    pub fn is_pin_locked(&self) -> bool {
        self.pin_locked
    }

    pub fn set_signal_quality(&mut self, quality: u8) {
        self.config.signal_quality = quality;
    }

    /// Answer `ERROR` to every command starting with `prefix`
    pub fn fail_on(&mut self, prefix: impl Into<String>) {
        self.fail_prefixes.push(prefix.into().to_ascii_uppercase());
    }

    /// Never answer commands starting with `prefix`
    pub fn ignore(&mut self, prefix: impl Into<String>) {
        self.silent_prefixes.push(prefix.into().to_ascii_uppercase());
    }

    /// Accept `count` more `AT+CMGS` payloads, then reject with `+CMS ERROR: 500`
    pub fn limit_submits(&mut self, count: usize) {
        self.submit_limit = Some(self.submitted.len() + count);
    }

    /// PDUs sent with `AT+CMGS`, in order
    pub fn submitted(&self) -> &[String] {
        &self.submitted
    }

    pub fn storage(&self) -> &BTreeMap<u32, StoredMessage> {
        &self.storage
    }

    /// Put a message in storage without notifying, returning its index
    pub fn store(&mut self, stat: u8, pdu: impl Into<String>) -> Option<u32> {
        if self.storage.len() as u32 >= self.config.storage_size {
            return None;
        }
        let index = (1..=self.config.storage_size).find(|i| !self.storage.contains_key(i))?;
        self.storage.insert(
            index,
            StoredMessage {
                stat,
                pdu: pdu.into(),
            },
        );
        Some(index)
    }

    /// Store an incoming message and announce it with `+CMTI`
    ///
    /// A full SIM announces `^SMMEMFULL` instead and drops the message.
    pub fn receive(&mut self, pdu: impl Into<String>) -> Option<u32> {
        match self.store(0, pdu) {
            Some(index) => {
                self.unsolicited(&format!("+CMTI: \"SM\",{}", index));
                Some(index)
            }
            None => {
                self.unsolicited("^SMMEMFULL: \"SM\"");
                None
            }
        }
    }

    /// Emit an unsolicited line
    pub fn unsolicited(&mut self, line: &str) {
        self.queue_output(format!("\r\n{}\r\n", line));
    }

    /// Get the next pending output chunk
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }

    /// Consume bytes written by the driver
    pub fn feed(&mut self, data: &[u8]) {
        for &byte in data {
            if self.awaiting_payload.is_some() {
                match byte {
                    CTRL_Z => self.finish_submit(),
                    ESC => {
                        self.awaiting_payload = None;
                        self.input.clear();
                        self.queue_output("\r\nOK\r\n".to_string());
                    }
                    b'\r' | b'\n' => {}
                    _ => self.input.push(byte),
                }
            } else {
                match byte {
                    b'\r' => {
                        let line = String::from_utf8_lossy(&self.input).trim().to_string();
                        self.input.clear();
                        if !line.is_empty() {
                            self.handle_command(&line);
                        }
                    }
                    b'\n' => {}
                    _ => self.input.push(byte),
                }
            }
        }
    }

    fn queue_output(&mut self, text: String) {
        self.pending_output.push_back(text.into_bytes());
    }

    fn reply(&mut self, lines: &[String], result: &str) {
        let mut out = String::new();
        for line in lines {
            out.push_str(&format!("\r\n{}\r\n", line));
        }
        out.push_str(&format!("\r\n{}\r\n", result));
        self.queue_output(out);
    }

    fn ok(&mut self) {
        self.reply(&[], "OK");
    }

    fn handle_command(&mut self, line: &str) {
        debug!("Virtual modem received {:?}", line);
        if self.echo {
            self.queue_output(format!("{}\r", line));
        }

        let upper = line.to_ascii_uppercase();
        if self.silent_prefixes.iter().any(|p| upper.starts_with(p)) {
            return;
        }
        if self.fail_prefixes.iter().any(|p| upper.starts_with(p)) {
            return self.reply(&[], "ERROR");
        }
        if !upper.starts_with("AT") {
            return self.reply(&[], "ERROR");
        }
        if self.pin_locked && needs_sim(&upper) {
            return self.reply(&[], "+CME ERROR: 11");
        }

        match upper.as_str() {
            "AT" | "ATH" => self.ok(),
            "ATZ" => {
                self.echo = self.config.echo;
                self.ok();
            }
            "ATE0" => {
                self.echo = false;
                self.ok();
            }
            "ATE1" => {
                self.echo = true;
                self.ok();
            }
            "AT+CPIN?" => {
                let state = if self.pin_locked { "SIM PIN" } else { "READY" };
                self.reply(&[format!("+CPIN: {}", state)], "OK");
            }
            "AT+CSQ" => {
                let line = format!("+CSQ: {},99", self.config.signal_quality);
                self.reply(&[line], "OK");
            }
            "AT+CGSN" => {
                let imei = self.config.imei.clone();
                self.reply(&[imei], "OK");
            }
            "AT+CNUM" => {
                let lines: Vec<String> = self
                    .config
                    .own_number
                    .iter()
                    .map(|number| {
                        let kind = if number.starts_with('+') { 145 } else { 129 };
                        format!("+CNUM: \"{}\",\"{}\",{}", self.config.own_name, number, kind)
                    })
                    .collect();
                self.reply(&lines, "OK");
            }
            "AT+COPS?" => {
                let line = format!("+COPS: 0,0,\"{}\",7", self.config.operator);
                self.reply(&[line], "OK");
            }
            "AT+COPS=?" => {
                let line = format!(
                    "+COPS: (2,\"{}\",\"{}\",\"{}\",7),(3,\"Other\",\"OTH\",\"26201\",2),,(0,1,3,4),(0,1,2)",
                    self.config.operator, self.config.operator, self.config.operator_numeric
                );
                self.reply(&[line], "OK");
            }
            "AT+CPMS?" | "AT+CPMS=\"SM\"" => {
                let used = self.storage.len();
                let total = self.config.storage_size;
                let line = format!(
                    "+CPMS: {u},{t},{u},{t},{u},{t}",
                    u = used,
                    t = total
                );
                self.reply(&[line], "OK");
            }
            _ => self.handle_parameterized(line, &upper),
        }
    }

    fn handle_parameterized(&mut self, line: &str, upper: &str) {
        if let Some(pin) = line.get(8..).filter(|_| upper.starts_with("AT+CPIN=")) {
            let pin = pin.trim_matches('"');
            if self.config.pin.as_deref() == Some(pin) {
                self.pin_locked = false;
                self.ok();
            } else {
                self.reply(&[], "+CME ERROR: 16");
            }
        } else if let Some(arg) = upper.strip_prefix("AT+CMGS=") {
            match arg.trim().parse::<usize>() {
                Ok(len) => {
                    self.awaiting_payload = Some(len);
                    self.queue_output("\r\n> ".to_string());
                }
                Err(_) => self.reply(&[], "ERROR"),
            }
        } else if let Some(arg) = upper.strip_prefix("AT+CMGR=") {
            match arg.trim().parse::<u32>() {
                Ok(index) => self.read_message(index),
                Err(_) => self.reply(&[], "ERROR"),
            }
        } else if let Some(arg) = upper.strip_prefix("AT+CMGL=") {
            match arg.trim().parse::<u8>() {
                Ok(stat) => self.list_messages(stat),
                Err(_) => self.reply(&[], "ERROR"),
            }
        } else if let Some(arg) = upper.strip_prefix("AT+CMGD=") {
            self.delete_messages(arg.trim());
        } else if upper.starts_with("AT+CPBW=") {
            if let Some(number) = line.split('"').nth(1) {
                self.config.own_number = Some(number.to_string());
            }
            if let Some(name) = line.split('"').nth(3) {
                self.config.own_name = name.to_string();
            }
            self.ok();
        } else if let Some(request) = upper.strip_prefix("AT+CUSD=") {
            self.ok();
            // mode 2 cancels the session without a network reply
            if request.contains('"') {
                let text = hex::encode(&to_ucs2(&self.config.ussd_reply));
                self.unsolicited(&format!("+CUSD: 0,\"{}\",72", text));
            }
        } else if upper.contains('=') {
            // settings such as +CMGF, +CNMI, +CLIP, +CMEE, +CPBS
            self.ok();
        } else {
            self.reply(&[], "ERROR");
        }
    }

    fn finish_submit(&mut self) {
        self.awaiting_payload = None;
        let payload = String::from_utf8_lossy(&self.input).trim().to_string();
        self.input.clear();
        if self.echo {
            self.queue_output(payload.clone());
        }

        let over_limit = self
            .submit_limit
            .is_some_and(|limit| self.submitted.len() >= limit);
        if over_limit || Pdu::decode(&payload).is_err() {
            return self.reply(&[], "+CMS ERROR: 500");
        }

        self.submitted.push(payload);
        let reference = self.next_reference;
        self.next_reference = self.next_reference.wrapping_add(1);
        self.reply(&[format!("+CMGS: {}", reference)], "OK");
    }

    fn read_message(&mut self, index: u32) {
        let Some(message) = self.storage.get_mut(&index) else {
            return self.reply(&[], "+CMS ERROR: 321");
        };
        let lines = vec![
            format!("+CMGR: {},,{}", message.stat, tpdu_len(&message.pdu)),
            message.pdu.clone(),
        ];
        if message.stat == 0 {
            message.stat = 1;
        }
        self.reply(&lines, "OK");
    }

    fn list_messages(&mut self, filter: u8) {
        let mut lines = Vec::new();
        for (index, message) in self.storage.iter_mut() {
            if filter != 4 && message.stat != filter {
                continue;
            }
            lines.push(format!(
                "+CMGL: {},{},,{}",
                index,
                message.stat,
                tpdu_len(&message.pdu)
            ));
            lines.push(message.pdu.clone());
            if message.stat == 0 {
                message.stat = 1;
            }
        }
        self.reply(&lines, "OK");
    }

    fn delete_messages(&mut self, arg: &str) {
        let mut fields = arg.split(',').map(str::trim);
        let index = fields.next().and_then(|f| f.parse::<u32>().ok());
        let flag = fields.next().and_then(|f| f.parse::<u8>().ok()).unwrap_or(0);

        match (index, flag) {
            (_, 4) => {
                self.storage.clear();
                self.ok();
            }
            (Some(index), 0) => {
                if self.storage.remove(&index).is_some() {
                    self.ok();
                } else {
                    self.reply(&[], "+CMS ERROR: 321");
                }
            }
            _ => self.reply(&[], "ERROR"),
        }
    }
}

/// Commands refused while the SIM is PIN locked
fn needs_sim(upper: &str) -> bool {
    const ALLOWED: &[&str] = &["ATZ", "ATE", "ATH", "AT+CPIN", "AT+CMEE", "AT+CGSN", "AT+CSQ"];
    upper != "AT" && !ALLOWED.iter().any(|p| upper.starts_with(p))
}

/// Octets after the SMSC block, as reported in `+CMGL` and `+CMGR` headers
fn tpdu_len(pdu: &str) -> usize {
    let smsc = pdu
        .get(..2)
        .and_then(|h| usize::from_str_radix(h, 16).ok())
        .unwrap_or(0);
    (pdu.len() / 2).saturating_sub(smsc + 1)
}

/// Encode `text` from `sender` as the DELIVER PDUs a network would store
///
/// Long texts are split and carry concatenation headers, exactly as the
/// sender's phone would have segmented them.
pub fn deliver_pdus(sender: &str, text: &str, timestamp: Timestamp) -> Result<Vec<String>, PduError> {
    let parts = encode_submit(sender, text, &SubmitOptions::default())?;
    parts
        .iter()
        .map(|part| {
            let Pdu::Submit(submit) = Pdu::decode(&part.hex)? else {
                return Err(PduError::UnknownMessageType(0));
            };
            Deliver {
                smsc: None,
                sender: submit.destination,
                pid: submit.pid,
                dcs: submit.dcs,
                timestamp,
                header: submit.header,
                text: submit.text,
                more_messages: false,
                status_report_indication: false,
                reply_path: false,
            }
            .to_hex()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(modem: &mut VirtualModem) -> String {
        let mut out = Vec::new();
        while let Some(bytes) = modem.take_output() {
            out.extend(bytes);
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    fn timestamp() -> Timestamp {
        Timestamp {
            year: 2024,
            month: 6,
            day: 1,
            hour: 12,
            minute: 30,
            second: 0,
            offset_quarters: 8,
        }
    }

    #[test]
    fn test_echo_and_ok() {
        let mut modem = VirtualModem::default();
        modem.feed(b"AT\r");
        assert_eq!(output(&mut modem), "AT\r\r\nOK\r\n");

        modem.feed(b"ATE0\r");
        assert_eq!(output(&mut modem), "ATE0\r\r\nOK\r\n");
        modem.feed(b"AT\r");
        assert_eq!(output(&mut modem), "\r\nOK\r\n");
    }

    #[test]
    fn test_pin_lock() {
        let mut modem = VirtualModem::from_config(VirtualModemConfig {
            pin: Some("1234".into()),
            echo: false,
            ..Default::default()
        });
        modem.feed(b"AT+CPIN?\r");
        assert!(output(&mut modem).contains("+CPIN: SIM PIN"));
        modem.feed(b"AT+CMGL=4\r");
        assert!(output(&mut modem).contains("+CME ERROR: 11"));

        modem.feed(b"AT+CPIN=0000\r");
        assert!(output(&mut modem).contains("+CME ERROR: 16"));
        modem.feed(b"AT+CPIN=1234\r");
        assert_eq!(output(&mut modem), "\r\nOK\r\n");
        assert!(!modem.is_pin_locked());
    }

    #[test]
    fn test_submit_prompt_and_payload() {
        let mut modem = VirtualModem::default();
        modem.feed(b"AT+CMGS=18\r");
        assert_eq!(output(&mut modem), "AT+CMGS=18\r\r\n> ");

        modem.feed(b"0021000C91947110325476000005C8329BFD06\x1A\r");
        let out = output(&mut modem);
        assert!(out.starts_with("0021000C91947110325476000005C8329BFD06"));
        assert!(out.contains("+CMGS: 1"));
        assert_eq!(modem.submitted().len(), 1);
    }

    #[test]
    fn test_submit_limit() {
        let mut modem = VirtualModem::default();
        modem.limit_submits(0);
        modem.feed(b"AT+CMGS=18\r0021000C91947110325476000005C8329BFD06\x1A");
        assert!(output(&mut modem).contains("+CMS ERROR: 500"));
        assert!(modem.submitted().is_empty());
    }

    #[test]
    fn test_receive_list_and_delete() {
        let mut modem = VirtualModem::default();
        let pdus = deliver_pdus("+4917099", "hi there", timestamp()).unwrap();
        assert_eq!(modem.receive(pdus[0].clone()), Some(1));
        assert_eq!(output(&mut modem), "\r\n+CMTI: \"SM\",1\r\n");

        modem.feed(b"AT+CMGL=4\r");
        let out = output(&mut modem);
        assert!(out.contains("+CMGL: 1,0,,"));
        assert!(out.contains(&pdus[0]));
        assert_eq!(modem.storage()[&1].stat, 1);

        modem.feed(b"AT+CMGD=1\r");
        assert!(output(&mut modem).ends_with("\r\nOK\r\n"));
        modem.feed(b"AT+CMGD=1\r");
        assert!(output(&mut modem).contains("+CMS ERROR: 321"));
    }

    #[test]
    fn test_full_storage_announces_memfull() {
        let mut modem = VirtualModem::from_config(VirtualModemConfig {
            storage_size: 1,
            ..Default::default()
        });
        assert!(modem.store(1, "00").is_some());
        assert_eq!(modem.receive("00"), None);
        assert!(output(&mut modem).contains("^SMMEMFULL"));
    }

    #[test]
    fn test_fail_and_ignore() {
        let mut modem = VirtualModem::default();
        modem.fail_on("AT+CNUM");
        modem.ignore("AT+COPS");
        modem.feed(b"AT+CNUM\r");
        assert!(output(&mut modem).ends_with("\r\nERROR\r\n"));
        modem.feed(b"AT+COPS?\r");
        assert_eq!(output(&mut modem), "AT+COPS?\r");
    }

    #[test]
    fn test_ussd_reply_is_ucs2() {
        let mut modem = VirtualModem::default();
        modem.feed(b"AT+CUSD=1,\"*100#\",15\r");
        let out = output(&mut modem);
        assert!(out.contains("+CUSD: 0,\"00420061006C0061006E00630065"));
    }

    #[test]
    fn test_deliver_pdus_decode() {
        let text = "a".repeat(200);
        let pdus = deliver_pdus("+4917099", &text, timestamp()).unwrap();
        assert_eq!(pdus.len(), 2);
        let decoded: String = pdus
            .iter()
            .map(|p| Pdu::decode(p).unwrap().text().to_string())
            .collect();
        assert_eq!(decoded, text);
    }

    #[test]
    fn test_tpdu_len() {
        assert_eq!(tpdu_len("0021000C91947110325476000005C8329BFD06"), 18);
        assert_eq!(tpdu_len("07917283010010F5040B"), 2);
    }
}

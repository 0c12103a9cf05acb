//! Parsers for AT command replies
//!
//! Each parser takes the response lines of one command (final `OK` already
//! removed) and fails with [`ModemError::ProtocolAssertion`] when the reply
//! does not have the expected shape.

use serde::Serialize;
use sms_pdu::Pdu;
use tracing::warn;

use crate::error::ModemError;

/// `+CSQ` reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Signal {
    /// Raw RSSI index, 0..=31
    pub quality: u8,
    /// Magnitude of the signal level in dBm (`-strength` dBm)
    pub strength: u8,
}

/// `+CPMS` reply for the first storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SimMemory {
    pub used: u32,
    pub total: u32,
}

impl SimMemory {
    pub fn is_full(&self) -> bool {
        self.used >= self.total
    }
}

/// `+CNUM` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OwnNumber {
    pub name: Option<String>,
    pub number: String,
}

/// `+COPS?` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operator {
    pub mode: u8,
    pub format: Option<u8>,
    pub name: Option<String>,
}

/// One entry of the `+COPS=?` network list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableOperator {
    /// 0 unknown, 1 available, 2 current, 3 forbidden
    pub status: u8,
    pub long_name: String,
    pub short_name: String,
    pub numeric: String,
    pub access_technology: Option<u8>,
}

/// Storage status reported with each message in PDU mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SmsStatus {
    Unread,
    Read,
    Unsent,
    Sent,
    Other(u8),
}

impl SmsStatus {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => SmsStatus::Unread,
            1 => SmsStatus::Read,
            2 => SmsStatus::Unsent,
            3 => SmsStatus::Sent,
            other => SmsStatus::Other(other),
        }
    }
}

/// A message read from SIM storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSms {
    pub index: u32,
    pub status: SmsStatus,
    pub pdu: Pdu,
}

/// A listing entry that could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedEntry {
    pub index: Option<u32>,
    pub reason: String,
}

/// Result of `AT+CMGL`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmsListing {
    pub messages: Vec<StoredSms>,
    pub failed: Vec<FailedEntry>,
}

/// Whether a line looks like a hex PDU rather than a header or result code
pub fn is_pdu_line(line: &str) -> bool {
    let line = line.trim();
    line.len() >= 15 && line.bytes().all(|b| b.is_ascii_hexdigit())
}

/// The part of `line` after a case-insensitive `prefix`
pub(crate) fn strip_prefix_ci<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| line[prefix.len()..].trim())
}

/// Split a reply body at commas outside double quotes
///
/// Quotes are removed from the returned fields.
pub(crate) fn split_fields(body: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in body.chars() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(c),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// Contents of the first double-quoted string on the line
pub(crate) fn first_quoted(line: &str) -> Option<&str> {
    let start = line.find('"')? + 1;
    let len = line[start..].find('"')?;
    Some(&line[start..start + len])
}

fn reply_body<'a>(lines: &'a [String], prefix: &str) -> Result<&'a str, ModemError> {
    lines
        .iter()
        .find_map(|line| strip_prefix_ci(line.trim(), prefix))
        .ok_or_else(|| ModemError::ProtocolAssertion(format!("no {} line in reply", prefix)))
}

fn number<T: std::str::FromStr>(field: Option<&String>, what: &str) -> Result<T, ModemError> {
    field
        .and_then(|f| f.trim().parse().ok())
        .ok_or_else(|| ModemError::ProtocolAssertion(format!("invalid {}", what)))
}

/// Parse `+CSQ: <rssi>,<ber>`
pub fn parse_signal(lines: &[String]) -> Result<Signal, ModemError> {
    let fields = split_fields(reply_body(lines, "+CSQ:")?);
    let quality: u8 = number(fields.first(), "signal quality")?;
    if quality > 31 {
        return Err(ModemError::ProtocolAssertion(format!(
            "signal quality not known ({})",
            quality
        )));
    }
    Ok(Signal {
        quality,
        strength: 113 - 2 * quality,
    })
}

/// Parse `+CPMS: <used>,<total>,...`
pub fn parse_sim_memory(lines: &[String]) -> Result<SimMemory, ModemError> {
    let fields = split_fields(reply_body(lines, "+CPMS:")?);
    Ok(SimMemory {
        used: number(fields.first(), "used count")?,
        total: number(fields.get(1), "storage size")?,
    })
}

/// Parse `+CPIN: <code>`, returning whether the SIM is ready
pub fn parse_pin_ready(lines: &[String]) -> Result<bool, ModemError> {
    let body = reply_body(lines, "+CPIN:")?;
    Ok(body.to_ascii_uppercase().contains("READY"))
}

/// Parse the `AT+CGSN` reply, which must be digits only
pub fn parse_serial_number(lines: &[String]) -> Result<String, ModemError> {
    let line = lines
        .iter()
        .map(|l| l.trim())
        .find(|l| !l.is_empty())
        .ok_or_else(|| ModemError::ProtocolAssertion("empty serial number reply".into()))?;
    if line.bytes().all(|b| b.is_ascii_digit()) {
        Ok(line.to_string())
    } else {
        Err(ModemError::ProtocolAssertion(format!(
            "serial number is not numeric: {}",
            line
        )))
    }
}

/// Parse `+CNUM: "<name>","<number>",<type>`
pub fn parse_own_number(lines: &[String]) -> Result<OwnNumber, ModemError> {
    let fields = split_fields(reply_body(lines, "+CNUM:")?);
    let number = fields
        .get(1)
        .filter(|n| !n.is_empty())
        .cloned()
        .ok_or_else(|| ModemError::ProtocolAssertion("no number in +CNUM reply".into()))?;
    let name = fields.first().filter(|n| !n.is_empty()).cloned();
    Ok(OwnNumber { name, number })
}

/// Parse `+COPS: <mode>[,<format>,"<name>"[,<act>]]`
pub fn parse_current_operator(lines: &[String]) -> Result<Operator, ModemError> {
    let fields = split_fields(reply_body(lines, "+COPS:")?);
    Ok(Operator {
        mode: number(fields.first(), "operator mode")?,
        format: fields.get(1).and_then(|f| f.parse().ok()),
        name: fields.get(2).filter(|n| !n.is_empty()).cloned(),
    })
}

/// Parse the `+COPS=?` list of `(status,"long","short","numeric"[,act])` groups
///
/// The trailing groups listing supported modes and formats are skipped.
pub fn parse_available_operators(lines: &[String]) -> Result<Vec<AvailableOperator>, ModemError> {
    let body = reply_body(lines, "+COPS:")?;
    let mut operators = Vec::new();
    let mut rest = body;
    while let Some(open) = rest.find('(') {
        let Some(close) = rest[open..].find(')') else {
            break;
        };
        let group = &rest[open + 1..open + close];
        rest = &rest[open + close + 1..];

        if !group.contains('"') {
            continue;
        }
        let fields = split_fields(group);
        operators.push(AvailableOperator {
            status: number(fields.first(), "operator status")?,
            long_name: fields.get(1).cloned().unwrap_or_default(),
            short_name: fields.get(2).cloned().unwrap_or_default(),
            numeric: fields.get(3).cloned().unwrap_or_default(),
            access_technology: fields.get(4).and_then(|f| f.parse().ok()),
        });
    }
    Ok(operators)
}

/// Parse an `AT+CMGL=4` listing
///
/// Each `+CMGL: <index>,<stat>,[<alpha>],<length>` header is followed by a
/// PDU line. Entries that fail to decode are reported in `failed`.
pub fn parse_listing(lines: &[String]) -> SmsListing {
    let mut listing = SmsListing::default();
    let mut header: Option<(u32, SmsStatus)> = None;

    for line in lines.iter().map(|l| l.trim()) {
        if let Some(body) = strip_prefix_ci(line, "+CMGL:") {
            if let Some((index, _)) = header.take() {
                listing.failed.push(FailedEntry {
                    index: Some(index),
                    reason: "header without PDU".into(),
                });
            }
            let fields = split_fields(body);
            match (
                number::<u32>(fields.first(), "index"),
                number::<u8>(fields.get(1), "status"),
            ) {
                (Ok(index), Ok(stat)) => header = Some((index, SmsStatus::from_code(stat))),
                _ => listing.failed.push(FailedEntry {
                    index: None,
                    reason: format!("malformed header: {}", line),
                }),
            }
        } else if is_pdu_line(line) {
            let Some((index, status)) = header.take() else {
                warn!("PDU line without +CMGL header");
                continue;
            };
            match Pdu::decode(line) {
                Ok(pdu) => listing.messages.push(StoredSms { index, status, pdu }),
                Err(e) => {
                    warn!("Failed to decode PDU at index {}: {}", index, e);
                    listing.failed.push(FailedEntry {
                        index: Some(index),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    if let Some((index, _)) = header {
        listing.failed.push(FailedEntry {
            index: Some(index),
            reason: "header without PDU".into(),
        });
    }
    listing
}

/// Parse an `AT+CMGR=<index>` reply: `+CMGR: <stat>,[<alpha>],<length>` then the PDU
pub fn parse_read(index: u32, lines: &[String]) -> Result<StoredSms, ModemError> {
    let fields = split_fields(reply_body(lines, "+CMGR:")?);
    let status = SmsStatus::from_code(number(fields.first(), "status")?);
    let hex = lines
        .iter()
        .map(|l| l.trim())
        .find(|l| is_pdu_line(l))
        .ok_or_else(|| ModemError::ProtocolAssertion(format!("no PDU for message {}", index)))?;
    Ok(StoredSms {
        index,
        status,
        pdu: Pdu::decode(hex)?,
    })
}

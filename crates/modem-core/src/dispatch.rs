//! Classification of received lines
//!
//! Every line from the framer is either one of the unsolicited notifications
//! the modem pushes on its own, a fragment of the in-flight command's
//! response, or noise. The first matching rule wins.

use sms_pdu::alphabet::decode_ucs2_hex;
use tracing::warn;

use crate::parse::{first_quoted, split_fields, strip_prefix_ci};

/// What a received line means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// Empty line
    Blank,
    /// Echo of a command we wrote
    Echo,
    /// The `>` input prompt on a line of its own
    Prompt,
    /// `+CMTI`: a message was stored
    NewSms { index: u32 },
    /// `+CLIP`: incoming call
    IncomingCall { number: String, scheme: String },
    /// `^SMMEMFULL`: message storage is full
    MemoryFull,
    /// `+CUSD`: USSD text from the network
    Ussd { follow_code: u8, text: String },
    /// Part of the in-flight command's response
    Fragment(String),
    /// Nothing is waiting for this line
    Dropped(String),
}

/// Classify one line
///
/// `in_flight` is the text of the command awaiting a response, and `recent`
/// holds the texts of the last few commands written, newest last.
pub fn classify(line: &str, in_flight: Option<&str>, recent: &[String]) -> Classified {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Classified::Blank;
    }
    if trimmed == ">" {
        return Classified::Prompt;
    }
    if is_echo(trimmed, in_flight, recent) {
        return Classified::Echo;
    }

    if let Some(body) = strip_prefix_ci(trimmed, "+CMTI:") {
        return match split_fields(body).get(1).and_then(|f| f.parse().ok()) {
            Some(index) => Classified::NewSms { index },
            None => {
                warn!("Malformed +CMTI notification: {}", trimmed);
                Classified::Dropped(trimmed.to_string())
            }
        };
    }

    if strip_prefix_ci(trimmed, "+CLIP").is_some() {
        let body = trimmed.split_once(':').map(|(_, b)| b).unwrap_or("");
        let scheme = split_fields(body).get(1).cloned().unwrap_or_default();
        let number = first_quoted(body)
            .filter(|n| !n.is_empty())
            .unwrap_or("unknown")
            .to_string();
        return Classified::IncomingCall { number, scheme };
    }

    if trimmed.to_ascii_uppercase().contains("^SMMEMFULL") {
        return Classified::MemoryFull;
    }

    if let Some(body) = strip_prefix_ci(trimmed, "+CUSD:") {
        let fields = split_fields(body);
        let follow_code = fields.first().and_then(|f| f.parse().ok()).unwrap_or(0);
        let raw = first_quoted(body).unwrap_or("");
        let text = decode_ucs2_hex(raw).unwrap_or_else(|_| raw.to_string());
        return Classified::Ussd { follow_code, text };
    }

    if in_flight.is_some() {
        Classified::Fragment(trimmed.to_string())
    } else {
        Classified::Dropped(trimmed.to_string())
    }
}

/// Whether `line` echoes a command we wrote
///
/// Matches the in-flight text or a recently written one, ignoring a leading
/// `> ` prompt and the trailing Ctrl-Z of a payload. Echoes can arrive after
/// their command already resolved. Reply lines that merely start with `AT`
/// are not echoes.
fn is_echo(line: &str, in_flight: Option<&str>, recent: &[String]) -> bool {
    let line = strip_payload(line.strip_prefix('>').unwrap_or(line));
    in_flight
        .into_iter()
        .chain(recent.iter().rev().map(String::as_str))
        .map(strip_payload)
        .any(|command| !command.is_empty() && line.eq_ignore_ascii_case(command))
}

fn strip_payload(text: &str) -> &str {
    text.trim().trim_end_matches('\u{1A}').trim()
}

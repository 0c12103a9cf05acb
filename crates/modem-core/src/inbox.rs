//! Merging stored messages into an inbox
//!
//! Long messages arrive as several stored parts that share a concatenation
//! reference. Parts are grouped by sender and reference, so two senders that
//! happen to pick the same reference stay apart. Status reports are listed on
//! their own even if they carry a header.

use std::collections::HashMap;

use serde::Serialize;
use sms_pdu::{MessageType, Timestamp};

use crate::parse::{SmsStatus, StoredSms};

/// A message as shown to the user, possibly assembled from several parts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxMessage {
    /// Storage indexes of every stored part, in part order
    pub indexes: Vec<u32>,
    pub kind: MessageType,
    /// Originator, destination or recipient depending on `kind`
    pub address: String,
    pub text: String,
    pub timestamp: Option<Timestamp>,
    pub status: SmsStatus,
    /// Concatenation reference, for merged messages
    pub reference: Option<u16>,
    /// Parts announced by the header, for merged messages
    pub total_parts: Option<u8>,
    /// Distinct parts present
    pub parts_received: u8,
}

impl InboxMessage {
    /// Whether every announced part is present
    pub fn is_complete(&self) -> bool {
        self.total_parts
            .map_or(true, |total| self.parts_received >= total)
    }

    fn single(sms: StoredSms) -> Self {
        Self {
            indexes: vec![sms.index],
            kind: sms.pdu.message_type(),
            address: sms.pdu.address().to_string(),
            text: sms.pdu.text().to_string(),
            timestamp: sms.pdu.timestamp(),
            status: sms.status,
            reference: None,
            total_parts: None,
            parts_received: 1,
        }
    }
}

/// Build the inbox from a listing
///
/// With `concatenate` off every stored message is its own entry. Entries are
/// ordered by their lowest storage index.
pub fn merge_inbox(messages: Vec<StoredSms>, concatenate: bool) -> Vec<InboxMessage> {
    let mut inbox = Vec::new();
    let mut groups: Vec<Vec<(u8, StoredSms)>> = Vec::new();
    let mut group_of: HashMap<(String, u16), usize> = HashMap::new();

    for sms in messages {
        let concat = sms
            .pdu
            .concatenation()
            .filter(|_| concatenate && sms.pdu.message_type() != MessageType::StatusReport);
        let Some(concat) = concat else {
            inbox.push(InboxMessage::single(sms));
            continue;
        };

        let key = (sms.pdu.address().to_string(), concat.reference);
        let slot = *group_of.entry(key).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push((concat.part, sms));
    }

    for mut parts in groups {
        parts.sort_by_key(|(part, sms)| (*part, sms.index));
        inbox.extend(assemble(parts));
    }

    inbox.sort_by_key(|m| m.indexes.iter().min().copied());
    inbox
}

fn assemble(parts: Vec<(u8, StoredSms)>) -> Option<InboxMessage> {
    let mut parts = parts.into_iter();
    let (mut last_part, first) = parts.next()?;
    let concat = first.pdu.concatenation();
    let mut message = InboxMessage::single(first);
    message.reference = concat.map(|c| c.reference);
    message.total_parts = concat.map(|c| c.total);

    for (part, sms) in parts {
        message.indexes.push(sms.index);
        if sms.status == SmsStatus::Unread {
            message.status = SmsStatus::Unread;
        }
        // a part stored twice is deleted with the rest but shown once
        if part == last_part {
            continue;
        }
        message.parts_received += 1;
        message.text.push_str(sms.pdu.text());
        last_part = part;
    }
    Some(message)
}

//! SMS-DELIVER, SMS-SUBMIT and SMS-STATUS-REPORT messages
//!
//! Decoding reads the fields strictly in wire order because every offset
//! after the service centre address depends on the variable-length fields
//! before it:
//!
//! - DELIVER: SCA, first octet, OA, PID, DCS, SCTS, UDL, UD
//! - SUBMIT: SCA, first octet, MR, DA, PID, DCS, \[VP\], UDL, UD
//! - STATUS-REPORT: SCA, first octet, MR, RA, SCTS, discharge time, status

use tracing::debug;

use crate::address::Address;
use crate::dcs::{DataCodingScheme, ProtocolIdentifier};
use crate::error::PduError;
use crate::header::{Concatenation, UserDataHeader};
use crate::hex;
use crate::reader::OctetReader;
use crate::timestamp::Timestamp;
use crate::user_data::{self, Payload};
use crate::validity::ValidityPeriod;

const MTI_MASK: u8 = 0x03;
const FLAG_MORE_OR_REJECT: u8 = 0x04;
const VPF_MASK: u8 = 0x18;
const FLAG_STATUS_REPORT: u8 = 0x20;
const FLAG_UDHI: u8 = 0x40;
const FLAG_REPLY_PATH: u8 = 0x80;

/// Message type indicator (bits 1-0 of the first octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageType {
    Deliver,
    Submit,
    StatusReport,
}

impl MessageType {
    pub fn from_first_octet(octet: u8) -> Result<Self, PduError> {
        match octet & MTI_MASK {
            0 => Ok(MessageType::Deliver),
            1 => Ok(MessageType::Submit),
            2 => Ok(MessageType::StatusReport),
            other => Err(PduError::UnknownMessageType(other)),
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            MessageType::Deliver => 0,
            MessageType::Submit => 1,
            MessageType::StatusReport => 2,
        }
    }
}

/// TP-ST status of a delivered or pending message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageStatus {
    /// Received by the recipient
    Delivered,
    /// Forwarded, delivery unconfirmed
    Forwarded,
    /// Replaced by the service centre
    Replaced,
    /// Temporary error, service centre still trying
    Pending(u8),
    /// Permanent error, service centre gave up
    PermanentFailure(u8),
    /// Temporary error, service centre no longer trying
    TemporaryFailure(u8),
    Reserved(u8),
}

impl MessageStatus {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x00 => MessageStatus::Delivered,
            0x01 => MessageStatus::Forwarded,
            0x02 => MessageStatus::Replaced,
            0x20..=0x3F => MessageStatus::Pending(b),
            0x40..=0x5F => MessageStatus::PermanentFailure(b),
            0x60..=0x7F => MessageStatus::TemporaryFailure(b),
            _ => MessageStatus::Reserved(b),
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            MessageStatus::Delivered => 0x00,
            MessageStatus::Forwarded => 0x01,
            MessageStatus::Replaced => 0x02,
            MessageStatus::Pending(b)
            | MessageStatus::PermanentFailure(b)
            | MessageStatus::TemporaryFailure(b)
            | MessageStatus::Reserved(b) => b,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            MessageStatus::Delivered | MessageStatus::Forwarded | MessageStatus::Replaced
        )
    }
}

/// SMS-DELIVER: a message received from the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deliver {
    pub smsc: Option<Address>,
    pub sender: Address,
    pub pid: ProtocolIdentifier,
    pub dcs: DataCodingScheme,
    pub timestamp: Timestamp,
    pub header: Option<UserDataHeader>,
    pub text: String,
    /// TP-MMS is inverted on the wire: this is true when more messages wait
    pub more_messages: bool,
    pub status_report_indication: bool,
    pub reply_path: bool,
}

impl Deliver {
    fn decode_body(
        first: u8,
        smsc: Option<Address>,
        reader: &mut OctetReader<'_>,
    ) -> Result<Self, PduError> {
        let sender = Address::decode(reader)?;
        let pid = ProtocolIdentifier(reader.u8()?);
        let dcs = DataCodingScheme::from_byte(reader.u8()?);
        let timestamp = Timestamp::decode(reader)?;
        let ud = user_data::decode(reader, dcs.alphabet, first & FLAG_UDHI != 0)?;

        Ok(Self {
            smsc,
            sender,
            pid,
            dcs,
            timestamp,
            header: ud.header,
            text: ud.text,
            more_messages: first & FLAG_MORE_OR_REJECT == 0,
            status_report_indication: first & FLAG_STATUS_REPORT != 0,
            reply_path: first & FLAG_REPLY_PATH != 0,
        })
    }

    /// Encode as a hex PDU, the way a modem would list a received message
    pub fn to_hex(&self) -> Result<String, PduError> {
        let mut first = MessageType::Deliver.bits();
        if !self.more_messages {
            first |= FLAG_MORE_OR_REJECT;
        }
        if self.status_report_indication {
            first |= FLAG_STATUS_REPORT;
        }
        if self.header.is_some() {
            first |= FLAG_UDHI;
        }
        if self.reply_path {
            first |= FLAG_REPLY_PATH;
        }

        let mut out = Address::encode_smsc(self.smsc.as_ref())?;
        out.push(first);
        out.extend(self.sender.encode()?);
        out.push(self.pid.0);
        out.push(self.dcs.to_byte());
        out.extend(self.timestamp.to_octets());
        out.extend(user_data::encode(
            self.dcs.alphabet,
            self.header.as_ref(),
            Payload::Text(&self.text),
        )?);
        Ok(hex::encode(&out))
    }
}

/// SMS-SUBMIT: a message sent to the network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submit {
    pub smsc: Option<Address>,
    pub reference: u8,
    pub destination: Address,
    pub pid: ProtocolIdentifier,
    pub dcs: DataCodingScheme,
    pub validity: Option<ValidityPeriod>,
    pub header: Option<UserDataHeader>,
    pub text: String,
    pub reject_duplicates: bool,
    pub status_report_request: bool,
    pub reply_path: bool,
}

impl Submit {
    fn decode_body(
        first: u8,
        smsc: Option<Address>,
        reader: &mut OctetReader<'_>,
    ) -> Result<Self, PduError> {
        let reference = reader.u8()?;
        let destination = Address::decode(reader)?;
        let pid = ProtocolIdentifier(reader.u8()?);
        let dcs = DataCodingScheme::from_byte(reader.u8()?);
        let validity = ValidityPeriod::decode(first & VPF_MASK, reader)?;
        let ud = user_data::decode(reader, dcs.alphabet, first & FLAG_UDHI != 0)?;

        Ok(Self {
            smsc,
            reference,
            destination,
            pid,
            dcs,
            validity,
            header: ud.header,
            text: ud.text,
            reject_duplicates: first & FLAG_MORE_OR_REJECT != 0,
            status_report_request: first & FLAG_STATUS_REPORT != 0,
            reply_path: first & FLAG_REPLY_PATH != 0,
        })
    }

    pub(crate) fn first_octet(&self, has_header: bool) -> u8 {
        let mut first = MessageType::Submit.bits();
        if self.reject_duplicates {
            first |= FLAG_MORE_OR_REJECT;
        }
        if let Some(vp) = &self.validity {
            first |= vp.format_bits();
        }
        if self.status_report_request {
            first |= FLAG_STATUS_REPORT;
        }
        if has_header {
            first |= FLAG_UDHI;
        }
        if self.reply_path {
            first |= FLAG_REPLY_PATH;
        }
        first
    }

    /// Encode the fields up to and including TP-VP
    pub(crate) fn encode_envelope(&self, has_header: bool) -> Result<(Vec<u8>, usize), PduError> {
        let mut out = Address::encode_smsc(self.smsc.as_ref())?;
        let smsc_len = out.len();
        out.push(self.first_octet(has_header));
        out.push(self.reference);
        out.extend(self.destination.encode()?);
        out.push(self.pid.0);
        out.push(self.dcs.to_byte());
        if let Some(vp) = &self.validity {
            out.extend(vp.encode());
        }
        Ok((out, smsc_len))
    }

    /// Encode this single message as a hex PDU
    pub fn to_hex(&self) -> Result<String, PduError> {
        let (mut out, _) = self.encode_envelope(self.header.is_some())?;
        out.extend(user_data::encode(
            self.dcs.alphabet,
            self.header.as_ref(),
            Payload::Text(&self.text),
        )?);
        Ok(hex::encode(&out))
    }
}

/// SMS-STATUS-REPORT: delivery outcome of a previously submitted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub smsc: Option<Address>,
    /// Reference of the submitted message this report is about
    pub reference: u8,
    pub recipient: Address,
    pub timestamp: Timestamp,
    pub discharge: Timestamp,
    pub status: MessageStatus,
}

impl StatusReport {
    fn decode_body(smsc: Option<Address>, reader: &mut OctetReader<'_>) -> Result<Self, PduError> {
        let reference = reader.u8()?;
        let recipient = Address::decode(reader)?;
        let timestamp = Timestamp::decode(reader)?;
        let discharge = Timestamp::decode(reader)?;
        let status = MessageStatus::from_byte(reader.u8()?);
        // optional parameter indicator and trailing fields are not interpreted
        let _ = reader.rest();

        Ok(Self {
            smsc,
            reference,
            recipient,
            timestamp,
            discharge,
            status,
        })
    }

    pub fn to_hex(&self) -> Result<String, PduError> {
        let mut out = Address::encode_smsc(self.smsc.as_ref())?;
        out.push(MessageType::StatusReport.bits());
        out.push(self.reference);
        out.extend(self.recipient.encode()?);
        out.extend(self.timestamp.to_octets());
        out.extend(self.discharge.to_octets());
        out.push(self.status.to_byte());
        Ok(hex::encode(&out))
    }
}

/// Any decoded PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pdu {
    Deliver(Deliver),
    Submit(Submit),
    StatusReport(StatusReport),
}

impl Pdu {
    /// Decode a hex PDU as listed by `AT+CMGR` / `AT+CMGL`
    pub fn decode(hex_text: &str) -> Result<Self, PduError> {
        let bytes = hex::decode(hex_text)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PduError> {
        let mut reader = OctetReader::new(bytes);
        let smsc = Address::decode_smsc(&mut reader)?;
        let first = reader.u8()?;
        let kind = MessageType::from_first_octet(first)?;
        debug!(
            "decoding {:?} PDU ({} octets, first octet 0x{:02X} at {})",
            kind,
            bytes.len(),
            first,
            reader.position() - 1
        );

        Ok(match kind {
            MessageType::Deliver => Pdu::Deliver(Deliver::decode_body(first, smsc, &mut reader)?),
            MessageType::Submit => Pdu::Submit(Submit::decode_body(first, smsc, &mut reader)?),
            MessageType::StatusReport => {
                Pdu::StatusReport(StatusReport::decode_body(smsc, &mut reader)?)
            }
        })
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Pdu::Deliver(_) => MessageType::Deliver,
            Pdu::Submit(_) => MessageType::Submit,
            Pdu::StatusReport(_) => MessageType::StatusReport,
        }
    }

    /// Originator, destination or recipient, depending on the type
    pub fn address(&self) -> &Address {
        match self {
            Pdu::Deliver(d) => &d.sender,
            Pdu::Submit(s) => &s.destination,
            Pdu::StatusReport(r) => &r.recipient,
        }
    }

    pub fn smsc(&self) -> Option<&Address> {
        match self {
            Pdu::Deliver(d) => d.smsc.as_ref(),
            Pdu::Submit(s) => s.smsc.as_ref(),
            Pdu::StatusReport(r) => r.smsc.as_ref(),
        }
    }

    /// Message text; empty for status reports
    pub fn text(&self) -> &str {
        match self {
            Pdu::Deliver(d) => &d.text,
            Pdu::Submit(s) => &s.text,
            Pdu::StatusReport(_) => "",
        }
    }

    pub fn timestamp(&self) -> Option<Timestamp> {
        match self {
            Pdu::Deliver(d) => Some(d.timestamp),
            Pdu::Submit(_) => None,
            Pdu::StatusReport(r) => Some(r.timestamp),
        }
    }

    pub fn header(&self) -> Option<&UserDataHeader> {
        match self {
            Pdu::Deliver(d) => d.header.as_ref(),
            Pdu::Submit(s) => s.header.as_ref(),
            Pdu::StatusReport(_) => None,
        }
    }

    pub fn concatenation(&self) -> Option<Concatenation> {
        self.header().and_then(UserDataHeader::concatenation)
    }

    pub fn dcs(&self) -> Option<DataCodingScheme> {
        match self {
            Pdu::Deliver(d) => Some(d.dcs),
            Pdu::Submit(s) => Some(s.dcs),
            Pdu::StatusReport(_) => None,
        }
    }
}

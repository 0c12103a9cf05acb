//! Error types for PDU parsing and encoding

use thiserror::Error;

/// Errors that can occur while decoding or encoding a PDU
///
/// Decoding never yields a partial result: any of these means the whole
/// PDU string should be treated as corrupt.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PduError {
    /// Input is not a valid hex string
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// PDU ended before a field could be read
    #[error("truncated PDU: need {needed} more octets at offset {offset}")]
    Truncated { offset: usize, needed: usize },

    /// A length field is inconsistent with the data that follows it
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Address type-of-number is reserved or otherwise unsupported
    #[error("unsupported address type: 0x{0:02X}")]
    UnsupportedAddressType(u8),

    /// Message type indicator is not DELIVER, SUBMIT or STATUS-REPORT
    #[error("unknown message type: {0}")]
    UnknownMessageType(u8),

    /// Timestamp contains non-BCD digits
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// User data header is malformed
    #[error("invalid user data header: {0}")]
    InvalidHeader(String),

    /// Address string contains characters that cannot be semi-octet encoded
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Character has no representation in the requested alphabet
    #[error("character {0:?} cannot be encoded in the GSM 7-bit alphabet")]
    UnencodableCharacter(char),

    /// Message would need more parts than a concatenation header can describe
    #[error("message too long: would need {parts} parts")]
    TextTooLong { parts: usize },
}

//! SMS PDU Library
//!
//! This crate encodes and decodes SMS messages in the PDU format used by
//! GSM modems in `AT+CMGF=0` mode:
//!
//! - **SMS-SUBMIT**: outgoing messages, split into concatenated parts as needed
//! - **SMS-DELIVER**: messages received from the network
//! - **SMS-STATUS-REPORT**: delivery outcome of a submitted message
//!
//! # Architecture
//!
//! Each field of the PDU has its own module with a pure encoder and a decoder
//! that reads from a bounds-checked cursor:
//! - [`address`]: semi-octet phone numbers and alphanumeric senders
//! - [`alphabet`]: GSM 7-bit packing, UCS-2 and 8-bit data
//! - [`dcs`]: data coding scheme and protocol identifier
//! - [`timestamp`] / [`validity`]: SCTS and TP-VP
//! - [`header`]: user data header and concatenation elements
//!
//! [`Pdu::decode`] ties them together in wire order, and [`encode_submit`]
//! segments text into ready-to-send [`Part`]s.
//!
//! # Example
//!
//! ```rust
//! use sms_pdu::{encode_submit, Pdu, SubmitOptions};
//!
//! let parts = encode_submit("+491701234567", "Hello", &SubmitOptions::default()).unwrap();
//! assert_eq!(parts.len(), 1);
//!
//! let pdu = Pdu::decode(&parts[0].hex).unwrap();
//! assert_eq!(pdu.text(), "Hello");
//! assert_eq!(pdu.address().to_string(), "+491701234567");
//! ```

pub mod address;
pub mod alphabet;
pub mod dcs;
pub mod encode;
pub mod error;
pub mod header;
pub mod hex;
pub mod pdu;
mod reader;
pub mod timestamp;
pub mod user_data;
pub mod validity;

pub use address::{Address, AddressType, NumberingPlan, TypeOfNumber};
pub use alphabet::Alphabet;
pub use dcs::{DataCodingScheme, DcsGroup, MessageClass, ProtocolIdentifier};
pub use encode::{encode_binary, encode_submit, Part, SubmitOptions};
pub use error::PduError;
pub use header::{Concatenation, InformationElement, UserDataHeader};
pub use pdu::{Deliver, MessageStatus, MessageType, Pdu, StatusReport, Submit};
pub use timestamp::Timestamp;
pub use user_data::UserData;
pub use validity::ValidityPeriod;

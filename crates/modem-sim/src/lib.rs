//! GSM Modem Simulation Library
//!
//! This crate provides an in-memory modem for testing the driver without
//! hardware. It includes:
//!
//! - **VirtualModem**: answers the AT command set with SIM message storage,
//!   PIN lock, the `AT+CMGS` prompt and configurable replies
//! - **run_virtual_modem_task**: serves a `VirtualModem` over an async stream,
//!   typically one end of `tokio::io::duplex()`
//!
//! # Example
//!
//! ```rust
//! use modem_sim::VirtualModem;
//!
//! let mut modem = VirtualModem::default();
//! modem.feed(b"AT+CSQ\r");
//!
//! let mut reply = Vec::new();
//! while let Some(bytes) = modem.take_output() {
//!     reply.extend(bytes);
//! }
//! assert_eq!(reply, b"AT+CSQ\r\r\n+CSQ: 23,99\r\n\r\nOK\r\n");
//! ```

pub mod modem;
pub mod task;

pub use modem::{deliver_pdus, StoredMessage, VirtualModem, VirtualModemConfig};
pub use task::{run_virtual_modem_task, SimSnapshot, VirtualModemCommand};

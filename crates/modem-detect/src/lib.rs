//! GSM Modem Serial Port Detection Library
//!
//! This crate provides serial port enumeration and AT probing for GSM
//! modems attached over USB or a plain serial adapter.
//!
//! # Example
//!
//! ```rust,no_run
//! use modem_detect::PortScanner;
//!
//! let scanner = PortScanner::new();
//! let ports = scanner.enumerate_ports().unwrap();
//!
//! for port in ports {
//!     println!("Found port: {} ({:?})", port.port, port.classification);
//! }
//! ```

pub mod error;
pub mod probe;
pub mod scanner;
pub mod usb_ids;

pub use error::DetectError;
pub use probe::{probe_port, ModemProber, ProbeConfig, ProbeResult};
pub use scanner::{PortScanner, ScannerConfig, SerialPortInfo};
pub use usb_ids::{classify_port, PortClassification};

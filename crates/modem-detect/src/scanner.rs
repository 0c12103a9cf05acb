//! Serial port scanner
//!
//! This module provides serial port enumeration.

use serde::Serialize;
use serialport::{available_ports, SerialPortType};
use tracing::info;

use crate::error::DetectError;
use crate::usb_ids::{classify_port, PortClassification};

/// Information about a serial port
#[derive(Debug, Clone, Serialize)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// USB Vendor ID (if USB)
    pub vid: Option<u16>,
    /// USB Product ID (if USB)
    pub pid: Option<u16>,
    /// USB manufacturer string
    pub manufacturer: Option<String>,
    /// USB product string
    pub product: Option<String>,
    pub classification: PortClassification,
    /// Vendor or adapter name derived from the VID
    pub hint: Option<&'static str>,
}

impl SerialPortInfo {
    /// Create from serialport crate's port info
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        let (vid, pid, manufacturer, product) = match port_type {
            SerialPortType::UsbPort(usb) => (
                Some(usb.vid),
                Some(usb.pid),
                usb.manufacturer.clone(),
                usb.product.clone(),
            ),
            _ => (None, None, None, None),
        };
        let (classification, hint) = classify_port(vid);
        Self {
            port: name,
            vid,
            pid,
            manufacturer,
            product,
            classification,
            hint,
        }
    }
}

/// Serial port scanner configuration
#[derive(Debug, Clone, Default)]
pub struct ScannerConfig {
    /// Skip ports matching these patterns
    pub skip_patterns: Vec<String>,
}

/// Serial port scanner
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// Create a new scanner with default configuration
    pub fn new() -> Self {
        Self {
            config: ScannerConfig {
                skip_patterns: vec![
                    // Bluetooth ports on macOS
                    "Bluetooth".to_string(),
                    // Debug/logging ports
                    "debug".to_string(),
                ],
            },
        }
    }

    /// Create a scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Enumerate all available serial ports, modems first
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        info!("Enumerating serial ports...");
        let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;

        let mut result: Vec<_> = ports
            .into_iter()
            .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
            .filter(|p| !self.should_skip_port(&p.port))
            .collect();
        result.sort_by_key(|p| p.classification);

        if result.is_empty() {
            info!("No serial ports found");
        } else {
            info!("Found {} serial port(s)", result.len());
            for port in &result {
                let desc = port
                    .hint
                    .or(port.product.as_deref())
                    .unwrap_or("Unknown");
                info!("  {} - {}", port.port, desc);
            }
        }

        Ok(result)
    }

    /// Check if a port should be skipped
    fn should_skip_port(&self, port: &str) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.contains(pattern.as_str()))
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_serial_port_info_from_usb_modem() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x12D1,
            pid: 0x1506,
            serial_number: None,
            manufacturer: Some("HUAWEI".to_string()),
            product: Some("HUAWEI Mobile".to_string()),
        });

        let info = SerialPortInfo::from_serialport("/dev/ttyUSB2".to_string(), &usb_info);

        assert_eq!(info.vid, Some(0x12D1));
        assert_eq!(info.classification, PortClassification::KnownModem);
        assert_eq!(info.hint, Some("Huawei"));
    }

    #[test]
    fn test_serial_port_info_json() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x12D1,
            pid: 0x1506,
            serial_number: None,
            manufacturer: None,
            product: None,
        });
        let info = SerialPortInfo::from_serialport("/dev/ttyUSB2".to_string(), &usb_info);

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["port"], "/dev/ttyUSB2");
        assert_eq!(json["vid"], 0x12D1);
        assert_eq!(json["classification"], "known_modem");
        assert_eq!(json["hint"], "Huawei");
        assert!(json["product"].is_null());
    }

    #[test]
    fn test_non_usb_port_is_unknown() {
        let info = SerialPortInfo::from_serialport("/dev/ttyS0".to_string(), &SerialPortType::Unknown);
        assert_eq!(info.vid, None);
        assert_eq!(info.classification, PortClassification::Unknown);
    }

    #[test]
    fn test_skip_patterns() {
        let scanner = PortScanner::new();
        assert!(scanner.should_skip_port("/dev/tty.Bluetooth-Incoming-Port"));
        assert!(scanner.should_skip_port("/dev/tty.debug-console"));
        assert!(!scanner.should_skip_port("/dev/ttyUSB0"));
    }
}

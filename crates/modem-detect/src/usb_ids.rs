//! USB Vendor/Product ID database for GSM modems and serial adapters
//!
//! USB modems usually expose several interfaces (diagnostics, NMEA, AT). The
//! vendor ID is enough to tell that a port belongs to a modem; which of its
//! interfaces answers AT commands is left to the probe.

use serde::Serialize;

/// USB Vendor ID / Product ID pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl UsbId {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }
}

/// Modem manufacturers with their own USB vendor IDs
pub mod modem {
    use super::UsbId;

    pub const HUAWEI: u16 = 0x12D1;
    pub const ZTE: u16 = 0x19D2;
    pub const SIERRA: u16 = 0x1199;
    pub const QUECTEL: u16 = 0x2C7C;
    pub const SIMCOM: u16 = 0x1E0E;
    pub const TELIT: u16 = 0x1BC7;
    pub const UBLOX: u16 = 0x1546;

    pub const HUAWEI_E3372: UsbId = UsbId::new(HUAWEI, 0x1506);
    pub const QUECTEL_EC25: UsbId = UsbId::new(QUECTEL, 0x0125);
    pub const SIMCOM_SIM7600: UsbId = UsbId::new(SIMCOM, 0x9001);

    pub const ALL_VIDS: &[u16] = &[HUAWEI, ZTE, SIERRA, QUECTEL, SIMCOM, TELIT, UBLOX];
}

/// Generic USB-to-serial adapters, often wired to modem boards
pub mod adapter {
    pub const FTDI: u16 = 0x0403;
    pub const CP210X: u16 = 0x10C4;
    pub const CH340: u16 = 0x1A86;
    pub const PROLIFIC: u16 = 0x067B;

    pub const ALL_VIDS: &[u16] = &[FTDI, CP210X, CH340, PROLIFIC];
}

/// Manufacturer name for a modem vendor ID
pub fn modem_vendor(vid: u16) -> Option<&'static str> {
    match vid {
        modem::HUAWEI => Some("Huawei"),
        modem::ZTE => Some("ZTE"),
        modem::SIERRA => Some("Sierra Wireless"),
        modem::QUECTEL => Some("Quectel"),
        modem::SIMCOM => Some("SIMCom"),
        modem::TELIT => Some("Telit"),
        modem::UBLOX => Some("u-blox"),
        _ => None,
    }
}

/// Adapter chip name for a serial adapter vendor ID
pub fn adapter_name(vid: u16) -> Option<&'static str> {
    match vid {
        adapter::FTDI => Some("FTDI"),
        adapter::CP210X => Some("CP210x"),
        adapter::CH340 => Some("CH340"),
        adapter::PROLIFIC => Some("PL2303"),
        _ => None,
    }
}

/// Port classification for probing decisions
///
/// Modem ports can be probed automatically. Generic adapters may have
/// anything on the other end, so they are only probed on request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PortClassification {
    /// USB modem vendor - safe to auto-probe
    KnownModem,
    /// Known serial adapter (FTDI, CP210x, CH340, PL2303) - manual probe only
    KnownAdapter,
    /// Unknown device - manual probe only
    Unknown,
}

impl PortClassification {
    /// Returns true if this port classification is safe for automatic probing
    pub fn is_safe_to_probe(&self) -> bool {
        matches!(self, Self::KnownModem)
    }
}

/// Classify a port by its USB vendor ID
///
/// Returns the classification and a display hint such as "Huawei" or "FTDI".
pub fn classify_port(vid: Option<u16>) -> (PortClassification, Option<&'static str>) {
    let Some(vid) = vid else {
        return (PortClassification::Unknown, None);
    };
    if let Some(name) = modem_vendor(vid) {
        return (PortClassification::KnownModem, Some(name));
    }
    if let Some(name) = adapter_name(vid) {
        return (PortClassification::KnownAdapter, Some(name));
    }
    (PortClassification::Unknown, None)
}

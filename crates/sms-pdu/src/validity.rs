//! Validity period (TP-VP) for SMS-SUBMIT
//!
//! The validity period format lives in bits 4-3 of the first octet:
//! `00` none, `10` relative (1 octet), `01` enhanced (7 octets),
//! `11` absolute (7 octet SCTS).

use crate::error::PduError;
use crate::reader::OctetReader;
use crate::timestamp::Timestamp;

const MINUTES_12H: u32 = 12 * 60;
const MINUTES_24H: u32 = 24 * 60;
const MINUTES_DAY: u32 = 24 * 60;
const MINUTES_WEEK: u32 = 7 * MINUTES_DAY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValidityPeriod {
    /// Relative period, rounded up to the next representable step
    Relative { minutes: u32 },
    /// Absolute expiry time
    Absolute(Timestamp),
    /// Enhanced format, kept opaque
    Enhanced([u8; 7]),
}

impl ValidityPeriod {
    /// VPF bits as placed in the first octet
    pub fn format_bits(&self) -> u8 {
        match self {
            ValidityPeriod::Relative { .. } => 0b10 << 3,
            ValidityPeriod::Enhanced(_) => 0b01 << 3,
            ValidityPeriod::Absolute(_) => 0b11 << 3,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            ValidityPeriod::Relative { minutes } => vec![relative_octet(*minutes)],
            ValidityPeriod::Absolute(ts) => ts.to_octets().to_vec(),
            ValidityPeriod::Enhanced(raw) => raw.to_vec(),
        }
    }

    pub(crate) fn decode(
        format_bits: u8,
        reader: &mut OctetReader<'_>,
    ) -> Result<Option<Self>, PduError> {
        Ok(match (format_bits >> 3) & 0b11 {
            0b10 => Some(ValidityPeriod::Relative {
                minutes: relative_minutes(reader.u8()?),
            }),
            0b01 => {
                let mut raw = [0u8; 7];
                raw.copy_from_slice(reader.take(7)?);
                Some(ValidityPeriod::Enhanced(raw))
            }
            0b11 => Some(ValidityPeriod::Absolute(Timestamp::decode(reader)?)),
            _ => None,
        })
    }
}

/// Relative TP-VP octet for a duration in minutes
pub fn relative_octet(minutes: u32) -> u8 {
    if minutes <= MINUTES_12H {
        (minutes.div_ceil(5).max(1) - 1) as u8
    } else if minutes <= MINUTES_24H {
        ((minutes - MINUTES_12H).div_ceil(30) + 143) as u8
    } else if minutes <= 30 * MINUTES_DAY {
        (minutes.div_ceil(MINUTES_DAY) + 166) as u8
    } else {
        (minutes.div_ceil(MINUTES_WEEK).clamp(5, 63) + 192) as u8
    }
}

/// Duration in minutes described by a relative TP-VP octet
pub fn relative_minutes(octet: u8) -> u32 {
    let v = u32::from(octet);
    match octet {
        0..=143 => (v + 1) * 5,
        144..=167 => MINUTES_12H + (v - 143) * 30,
        168..=196 => (v - 166) * MINUTES_DAY,
        _ => (v - 192) * MINUTES_WEEK,
    }
}

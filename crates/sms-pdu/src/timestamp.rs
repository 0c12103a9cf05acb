//! Service centre time stamp (SCTS)
//!
//! Seven octets of swapped BCD: year, month, day, hour, minute, second and
//! timezone. The timezone is a count of quarter hours; its sign is bit 3 of
//! the raw octet, which is the high nibble once the digits are swapped back.

use std::fmt;

use crate::error::PduError;
use crate::reader::OctetReader;

/// Decoded SCTS with its timezone offset in quarter hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timestamp {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Offset from UTC in 15 minute units
    pub offset_quarters: i8,
}

impl Timestamp {
    /// Offset from UTC in minutes
    pub fn offset_minutes(&self) -> i32 {
        i32::from(self.offset_quarters) * 15
    }

    pub(crate) fn decode(reader: &mut OctetReader<'_>) -> Result<Self, PduError> {
        let raw = reader.take(7)?;
        Self::from_octets(raw)
    }

    /// Decode from the seven raw octets
    pub fn from_octets(raw: &[u8]) -> Result<Self, PduError> {
        if raw.len() != 7 {
            return Err(PduError::InvalidTimestamp(format!(
                "expected 7 octets, got {}",
                raw.len()
            )));
        }

        let mut fields = [0u8; 6];
        for (field, &octet) in fields.iter_mut().zip(raw) {
            *field = swapped_bcd(octet)?;
        }

        let tz = raw[6];
        let low = tz & 0x07;
        let high = tz >> 4;
        if low > 9 || high > 9 {
            return Err(PduError::InvalidTimestamp(format!(
                "invalid timezone octet 0x{:02X}",
                tz
            )));
        }
        let quarters = (low * 10 + high) as i8;
        let offset_quarters = if tz & 0x08 != 0 { -quarters } else { quarters };

        let yy = u16::from(fields[0]);
        Ok(Self {
            year: if yy > 70 { 1900 + yy } else { 2000 + yy },
            month: fields[1],
            day: fields[2],
            hour: fields[3],
            minute: fields[4],
            second: fields[5],
            offset_quarters,
        })
    }

    /// Encode to the seven raw octets
    pub fn to_octets(&self) -> [u8; 7] {
        let quarters = self.offset_quarters.unsigned_abs().min(79);
        let mut tz = ((quarters % 10) << 4) | (quarters / 10);
        if self.offset_quarters < 0 {
            tz |= 0x08;
        }

        [
            to_swapped_bcd((self.year % 100) as u8),
            to_swapped_bcd(self.month),
            to_swapped_bcd(self.day),
            to_swapped_bcd(self.hour),
            to_swapped_bcd(self.minute),
            to_swapped_bcd(self.second),
            tz,
        ]
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let minutes = self.offset_minutes();
        let sign = if minutes < 0 { '-' } else { '+' };
        let minutes = minutes.abs();
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}{}{:02}:{:02}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            self.second,
            sign,
            minutes / 60,
            minutes % 60
        )
    }
}

fn swapped_bcd(octet: u8) -> Result<u8, PduError> {
    let low = octet & 0x0F;
    let high = octet >> 4;
    if low > 9 || high > 9 {
        return Err(PduError::InvalidTimestamp(format!(
            "non-BCD octet 0x{:02X}",
            octet
        )));
    }
    Ok(low * 10 + high)
}

fn to_swapped_bcd(value: u8) -> u8 {
    let value = value % 100;
    ((value % 10) << 4) | (value / 10)
}

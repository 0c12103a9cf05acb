//! Semi-octet address encoding
//!
//! Phone numbers are stored two digits per octet with the nibbles swapped,
//! padded with `F` when the digit count is odd. Originator and destination
//! addresses count their length in digits (semi-octets); the service centre
//! address counts octets, including the type octet.
//!
//! # Format
//! - Type octet: `1 TTT NNNN` (type of number, numbering plan)
//! - `0x91`: international / ISDN, `0x81`: unknown / ISDN
//! - Alphanumeric senders (type of number 5) carry packed GSM 7-bit text

use std::fmt;

use crate::alphabet;
use crate::error::PduError;
use crate::reader::OctetReader;

/// Type of number (bits 6-4 of the type octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TypeOfNumber {
    Unknown,
    International,
    National,
    NetworkSpecific,
    Subscriber,
    Alphanumeric,
    Abbreviated,
    Reserved,
}

impl TypeOfNumber {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0 => TypeOfNumber::Unknown,
            1 => TypeOfNumber::International,
            2 => TypeOfNumber::National,
            3 => TypeOfNumber::NetworkSpecific,
            4 => TypeOfNumber::Subscriber,
            5 => TypeOfNumber::Alphanumeric,
            6 => TypeOfNumber::Abbreviated,
            _ => TypeOfNumber::Reserved,
        }
    }

    fn bits(self) -> u8 {
        match self {
            TypeOfNumber::Unknown => 0,
            TypeOfNumber::International => 1,
            TypeOfNumber::National => 2,
            TypeOfNumber::NetworkSpecific => 3,
            TypeOfNumber::Subscriber => 4,
            TypeOfNumber::Alphanumeric => 5,
            TypeOfNumber::Abbreviated => 6,
            TypeOfNumber::Reserved => 7,
        }
    }
}

/// Numbering plan identification (bits 3-0 of the type octet)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NumberingPlan {
    Unknown,
    /// ISDN/telephone numbering plan (E.164)
    Isdn,
    Data,
    Telex,
    National,
    Private,
    /// Any other 4-bit value
    Other(u8),
}

impl NumberingPlan {
    fn from_bits(bits: u8) -> Self {
        match bits & 0x0F {
            0x0 => NumberingPlan::Unknown,
            0x1 => NumberingPlan::Isdn,
            0x3 => NumberingPlan::Data,
            0x4 => NumberingPlan::Telex,
            0x8 => NumberingPlan::National,
            0x9 => NumberingPlan::Private,
            other => NumberingPlan::Other(other),
        }
    }

    fn bits(self) -> u8 {
        match self {
            NumberingPlan::Unknown => 0x0,
            NumberingPlan::Isdn => 0x1,
            NumberingPlan::Data => 0x3,
            NumberingPlan::Telex => 0x4,
            NumberingPlan::National => 0x8,
            NumberingPlan::Private => 0x9,
            NumberingPlan::Other(v) => v & 0x0F,
        }
    }
}

/// Address type octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddressType {
    pub ton: TypeOfNumber,
    pub npi: NumberingPlan,
}

impl AddressType {
    /// `0x91`
    pub const INTERNATIONAL: AddressType = AddressType {
        ton: TypeOfNumber::International,
        npi: NumberingPlan::Isdn,
    };

    /// `0x81`
    pub const UNKNOWN: AddressType = AddressType {
        ton: TypeOfNumber::Unknown,
        npi: NumberingPlan::Isdn,
    };

    /// `0xD0`
    pub const ALPHANUMERIC: AddressType = AddressType {
        ton: TypeOfNumber::Alphanumeric,
        npi: NumberingPlan::Unknown,
    };

    pub fn from_byte(b: u8) -> Self {
        Self {
            ton: TypeOfNumber::from_bits(b >> 4),
            npi: NumberingPlan::from_bits(b),
        }
    }

    pub fn to_byte(self) -> u8 {
        0x80 | (self.ton.bits() << 4) | self.npi.bits()
    }
}

/// A phone number or alphanumeric sender
///
/// `number` never carries the `+` of an international number; it is implied by
/// the type and added back by [`Display`](fmt::Display).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address {
    pub number: String,
    pub kind: AddressType,
}

impl Address {
    /// Parse a dialable number; a leading `+` selects the international type
    pub fn parse(input: &str) -> Result<Self, PduError> {
        let trimmed = input.trim();
        let (digits, kind) = match trimmed.strip_prefix('+') {
            Some(rest) => (rest, AddressType::INTERNATIONAL),
            None => (trimmed, AddressType::UNKNOWN),
        };
        let address = Self {
            number: digits.to_string(),
            kind,
        };
        address.validate()?;
        Ok(address)
    }

    /// Number with an explicit type octet
    pub fn with_type(number: impl Into<String>, kind: AddressType) -> Self {
        Self {
            number: number.into(),
            kind,
        }
    }

    pub fn is_international(&self) -> bool {
        self.kind.ton == TypeOfNumber::International
    }

    fn validate(&self) -> Result<(), PduError> {
        if self.kind.ton == TypeOfNumber::Alphanumeric {
            return if alphabet::is_gsm7(&self.number) {
                Ok(())
            } else {
                Err(PduError::InvalidAddress(self.number.clone()))
            };
        }
        if self.number.is_empty() || !self.number.chars().all(|c| digit_nibble(c).is_some()) {
            return Err(PduError::InvalidAddress(self.number.clone()));
        }
        Ok(())
    }

    /// Encode as an originator/destination address (length in semi-octets)
    pub fn encode(&self) -> Result<Vec<u8>, PduError> {
        self.validate()?;
        let mut out = Vec::new();
        if self.kind.ton == TypeOfNumber::Alphanumeric {
            let septets = alphabet::to_septets(&self.number)?;
            let packed = alphabet::pack_septets(&septets, 0);
            out.push((septets.len() * 7).div_ceil(4) as u8);
            out.push(self.kind.to_byte());
            out.extend_from_slice(&packed);
        } else {
            out.push(self.number.chars().count() as u8);
            out.push(self.kind.to_byte());
            out.extend(swap_digits(&self.number)?);
        }
        Ok(out)
    }

    /// Encode as a service centre address (length in octets)
    pub fn encode_smsc(address: Option<&Address>) -> Result<Vec<u8>, PduError> {
        let Some(address) = address else {
            return Ok(vec![0x00]);
        };
        address.validate()?;
        let digits = swap_digits(&address.number)?;
        let mut out = Vec::with_capacity(digits.len() + 2);
        out.push((digits.len() + 1) as u8);
        out.push(address.kind.to_byte());
        out.extend(digits);
        Ok(out)
    }

    pub(crate) fn decode(reader: &mut OctetReader<'_>) -> Result<Self, PduError> {
        let semi_octets = reader.u8()? as usize;
        let kind = AddressType::from_byte(reader.u8()?);
        let bytes = reader.take(semi_octets.div_ceil(2))?;

        let number = match kind.ton {
            TypeOfNumber::Reserved => {
                return Err(PduError::UnsupportedAddressType(kind.to_byte()));
            }
            TypeOfNumber::Alphanumeric => {
                let septets = alphabet::unpack_septets(bytes, Some(semi_octets * 4 / 7), 0);
                alphabet::from_septets(&septets)
            }
            _ => {
                let mut digits = unswap_digits(bytes);
                digits.truncate(semi_octets);
                digits
            }
        };

        Ok(Self { number, kind })
    }

    pub(crate) fn decode_smsc(reader: &mut OctetReader<'_>) -> Result<Option<Self>, PduError> {
        let octets = reader.u8()? as usize;
        if octets == 0 {
            return Ok(None);
        }
        let kind = AddressType::from_byte(reader.u8()?);
        if kind.ton == TypeOfNumber::Reserved {
            return Err(PduError::UnsupportedAddressType(kind.to_byte()));
        }
        let bytes = reader.take(octets - 1)?;
        Ok(Some(Self {
            number: unswap_digits(bytes),
            kind,
        }))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_international() {
            write!(f, "+{}", self.number)
        } else {
            f.write_str(&self.number)
        }
    }
}

fn digit_nibble(c: char) -> Option<u8> {
    match c {
        '0'..='9' => Some(c as u8 - b'0'),
        '*' => Some(0xA),
        '#' => Some(0xB),
        'a' => Some(0xC),
        'b' => Some(0xD),
        'c' => Some(0xE),
        _ => None,
    }
}

fn nibble_digit(n: u8) -> Option<char> {
    match n {
        0..=9 => Some((b'0' + n) as char),
        0xA => Some('*'),
        0xB => Some('#'),
        0xC => Some('a'),
        0xD => Some('b'),
        0xE => Some('c'),
        _ => None,
    }
}

fn swap_digits(number: &str) -> Result<Vec<u8>, PduError> {
    let nibbles = number
        .chars()
        .map(|c| digit_nibble(c).ok_or_else(|| PduError::InvalidAddress(number.to_string())))
        .collect::<Result<Vec<u8>, _>>()?;

    Ok(nibbles
        .chunks(2)
        .map(|pair| {
            let low = pair[0];
            let high = pair.get(1).copied().unwrap_or(0xF);
            (high << 4) | low
        })
        .collect())
}

/// Undo the nibble swap, stopping at the `F` filler
fn unswap_digits(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        for n in [b & 0x0F, b >> 4] {
            match nibble_digit(n) {
                Some(c) => out.push(c),
                None => return out,
            }
        }
    }
    out
}

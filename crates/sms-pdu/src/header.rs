//! User data header (UDH)
//!
//! A length octet (UDHL) followed by information elements, each encoded as
//! `{ iei, length, data }`. Only the concatenation elements are interpreted:
//!
//! - IEI `0x00`: 8-bit reference, `05 00 03 ref total seq`
//! - IEI `0x08`: 16-bit reference, `06 08 04 refHi refLo total seq`
//!
//! Every other element is carried through untouched.

use crate::error::PduError;

/// IEI for concatenation with an 8-bit reference
pub const IEI_CONCAT_8: u8 = 0x00;
/// IEI for concatenation with a 16-bit reference
pub const IEI_CONCAT_16: u8 = 0x08;

/// A single information element
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InformationElement {
    pub id: u8,
    pub data: Vec<u8>,
}

/// Concatenated message metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Concatenation {
    pub reference: u16,
    pub total: u8,
    /// 1-based part index
    pub part: u8,
    /// Encoded with IEI 0x08 rather than 0x00
    pub wide_reference: bool,
}

impl Concatenation {
    fn to_element(self) -> InformationElement {
        if self.wide_reference {
            let [hi, lo] = self.reference.to_be_bytes();
            InformationElement {
                id: IEI_CONCAT_16,
                data: vec![hi, lo, self.total, self.part],
            }
        } else {
            InformationElement {
                id: IEI_CONCAT_8,
                data: vec![self.reference as u8, self.total, self.part],
            }
        }
    }

    fn from_element(ie: &InformationElement) -> Option<Self> {
        match (ie.id, ie.data.as_slice()) {
            (IEI_CONCAT_8, &[reference, total, part]) => Some(Self {
                reference: u16::from(reference),
                total,
                part,
                wide_reference: false,
            }),
            (IEI_CONCAT_16, &[hi, lo, total, part]) => Some(Self {
                reference: u16::from_be_bytes([hi, lo]),
                total,
                part,
                wide_reference: true,
            }),
            _ => None,
        }
    }

    /// Encoded header length in octets, including the UDHL octet
    pub fn header_len(wide_reference: bool) -> usize {
        if wide_reference {
            7
        } else {
            6
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UserDataHeader {
    pub elements: Vec<InformationElement>,
}

impl UserDataHeader {
    pub fn with_concatenation(concat: Concatenation) -> Self {
        Self {
            elements: vec![concat.to_element()],
        }
    }

    /// First concatenation element, if any
    pub fn concatenation(&self) -> Option<Concatenation> {
        self.elements.iter().find_map(Concatenation::from_element)
    }

    /// Encode including the leading UDHL octet
    pub fn encode(&self) -> Vec<u8> {
        let body: Vec<u8> = self
            .elements
            .iter()
            .flat_map(|ie| {
                let mut bytes = Vec::with_capacity(ie.data.len() + 2);
                bytes.push(ie.id);
                bytes.push(ie.data.len() as u8);
                bytes.extend_from_slice(&ie.data);
                bytes
            })
            .collect();

        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(body.len() as u8);
        out.extend(body);
        out
    }

    /// Decode from user data starting at the UDHL octet
    ///
    /// Returns the header and its total length including the UDHL octet.
    pub fn decode(user_data: &[u8]) -> Result<(Self, usize), PduError> {
        let Some(&udhl) = user_data.first() else {
            return Err(PduError::InvalidHeader("missing header length".into()));
        };
        let udhl = udhl as usize;
        let Some(body) = user_data.get(1..1 + udhl) else {
            return Err(PduError::InvalidHeader(format!(
                "header length {} exceeds user data ({} octets)",
                udhl,
                user_data.len() - 1
            )));
        };

        let mut elements = Vec::new();
        let mut pos = 0;
        while pos < body.len() {
            if pos + 2 > body.len() {
                return Err(PduError::InvalidHeader(format!(
                    "element header truncated at {}",
                    pos
                )));
            }
            let id = body[pos];
            let len = body[pos + 1] as usize;
            let data = body.get(pos + 2..pos + 2 + len).ok_or_else(|| {
                PduError::InvalidHeader(format!("element 0x{:02X} overruns header", id))
            })?;
            elements.push(InformationElement {
                id,
                data: data.to_vec(),
            });
            pos += 2 + len;
        }

        Ok((Self { elements }, udhl + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_narrow_concatenation_bytes() {
        let header = UserDataHeader::with_concatenation(Concatenation {
            reference: 0x42,
            total: 3,
            part: 2,
            wide_reference: false,
        });
        let encoded = header.encode();
        assert_eq!(encoded, vec![0x05, 0x00, 0x03, 0x42, 0x03, 0x02]);
        assert_eq!(encoded.len(), Concatenation::header_len(false));
    }

    #[test]
    fn test_wide_concatenation_round_trip() {
        let concat = Concatenation {
            reference: 0xBEEF,
            total: 2,
            part: 1,
            wide_reference: true,
        };
        let encoded = UserDataHeader::with_concatenation(concat).encode();
        assert_eq!(encoded, vec![0x06, 0x08, 0x04, 0xBE, 0xEF, 0x02, 0x01]);
        let (header, len) = UserDataHeader::decode(&encoded).unwrap();
        assert_eq!(len, 7);
        assert_eq!(header.concatenation(), Some(concat));
    }

    #[test]
    fn test_unknown_elements_pass_through() {
        // port addressing element followed by a concatenation element
        let raw = [0x0B, 0x05, 0x04, 0x0B, 0x84, 0x23, 0xF0, 0x00, 0x03, 0x07, 0x02, 0x01];
        let (header, len) = UserDataHeader::decode(&raw).unwrap();
        assert_eq!(len, 12);
        assert_eq!(header.elements[0].id, 0x05);
        assert_eq!(header.elements[0].data, vec![0x0B, 0x84, 0x23, 0xF0]);
        assert_eq!(header.concatenation().unwrap().reference, 7);
        assert_eq!(header.encode(), raw.to_vec());
    }

    #[test]
    fn test_overrunning_element_rejected() {
        let raw = [0x04, 0x00, 0x05, 0x01, 0x02];
        assert!(matches!(
            UserDataHeader::decode(&raw),
            Err(PduError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_header_longer_than_data_rejected() {
        let raw = [0x09, 0x00, 0x03];
        assert!(matches!(
            UserDataHeader::decode(&raw),
            Err(PduError::InvalidHeader(_))
        ));
    }
}

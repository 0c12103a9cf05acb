//! User data (TP-UDL + TP-UD) packing
//!
//! For 7-bit text TP-UDL counts septets, including the septets a header
//! occupies (rounded up, so text after a header starts on a septet boundary).
//! For 8-bit and UCS-2 it counts octets.

use crate::alphabet::{self, Alphabet};
use crate::error::PduError;
use crate::header::UserDataHeader;
use crate::reader::OctetReader;

/// Decoded user data
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserData {
    pub header: Option<UserDataHeader>,
    pub text: String,
}

/// Septets a header of `header_octets` (including UDHL) occupies
pub fn header_septets(header_octets: usize) -> usize {
    (header_octets * 8).div_ceil(7)
}

/// Fill bits between a header of `header_octets` and the first text septet
pub fn fill_bits(header_octets: usize) -> usize {
    header_septets(header_octets) * 7 - header_octets * 8
}

/// Payload of an outgoing part, already split to fit
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Payload<'a> {
    Text(&'a str),
    Binary(&'a [u8]),
}

/// Encode UDL followed by UD
pub(crate) fn encode(
    alphabet: Alphabet,
    header: Option<&UserDataHeader>,
    payload: Payload<'_>,
) -> Result<Vec<u8>, PduError> {
    let header_bytes = header.map(UserDataHeader::encode).unwrap_or_default();
    let h = header_bytes.len();

    let (udl, body) = match (alphabet, payload) {
        (Alphabet::Gsm7, Payload::Text(text)) => {
            let septets = alphabet::to_septets(text)?;
            let fill = if h > 0 { fill_bits(h) } else { 0 };
            let skip = if h > 0 { header_septets(h) } else { 0 };
            (
                skip + septets.len(),
                alphabet::pack_septets(&septets, fill),
            )
        }
        (Alphabet::Ucs2, Payload::Text(text)) => {
            let bytes = alphabet::to_ucs2(text);
            (h + bytes.len(), bytes)
        }
        (Alphabet::Data8, Payload::Text(text)) => {
            let bytes: Vec<u8> = text.chars().map(|c| c as u32 as u8).collect();
            (h + bytes.len(), bytes)
        }
        (_, Payload::Binary(bytes)) => (h + bytes.len(), bytes.to_vec()),
    };

    if udl > 255 {
        return Err(PduError::InvalidLength(format!(
            "user data length {} exceeds 255",
            udl
        )));
    }

    let mut out = Vec::with_capacity(1 + h + body.len());
    out.push(udl as u8);
    out.extend(header_bytes);
    out.extend(body);
    Ok(out)
}

/// Decode UDL + UD from the reader, consuming the rest of the PDU
pub(crate) fn decode(
    reader: &mut OctetReader<'_>,
    alphabet: Alphabet,
    has_header: bool,
) -> Result<UserData, PduError> {
    let udl = reader.u8()? as usize;
    let octets = match alphabet {
        Alphabet::Gsm7 => (udl * 7).div_ceil(8),
        _ => udl,
    };
    let data = reader.take(octets)?;

    let (header, header_len) = if has_header && udl > 0 {
        let (header, len) = UserDataHeader::decode(data)?;
        (Some(header), len)
    } else {
        (None, 0)
    };

    let text = match alphabet {
        Alphabet::Gsm7 => {
            let (septets, fill) = if header_len > 0 {
                let skip = header_septets(header_len);
                if skip > udl {
                    return Err(PduError::InvalidLength(format!(
                        "header occupies {} septets but UDL is {}",
                        skip, udl
                    )));
                }
                (udl - skip, fill_bits(header_len))
            } else {
                (udl, 0)
            };
            let body = data.get(header_len..).unwrap_or_default();
            alphabet::from_septets(&alphabet::unpack_septets(body, Some(septets), fill))
        }
        Alphabet::Ucs2 => alphabet::from_ucs2(data.get(header_len..).unwrap_or_default()),
        Alphabet::Data8 => alphabet::from_data8(data.get(header_len..).unwrap_or_default()),
    };

    Ok(UserData { header, text })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::Concatenation;

    #[test]
    fn test_fill_bits_for_common_headers() {
        assert_eq!(header_septets(6), 7);
        assert_eq!(fill_bits(6), 1);
        assert_eq!(header_septets(7), 8);
        assert_eq!(fill_bits(7), 0);
    }

    #[test]
    fn test_seven_bit_with_header_round_trip() {
        let header = UserDataHeader::with_concatenation(Concatenation {
            reference: 9,
            total: 2,
            part: 1,
            wide_reference: false,
        });
        let encoded = encode(Alphabet::Gsm7, Some(&header), Payload::Text("Hi there")).unwrap();
        // 7 header septets + 8 text septets
        assert_eq!(encoded[0], 15);

        let mut reader = OctetReader::new(&encoded);
        let decoded = decode(&mut reader, Alphabet::Gsm7, true).unwrap();
        assert_eq!(decoded.text, "Hi there");
        assert_eq!(decoded.header, Some(header));
    }

    #[test]
    fn test_ucs2_udl_counts_octets() {
        let encoded = encode(Alphabet::Ucs2, None, Payload::Text("Ж")).unwrap();
        assert_eq!(encoded, vec![0x02, 0x04, 0x16]);
    }

    #[test]
    fn test_binary_payload() {
        let encoded = encode(Alphabet::Data8, None, Payload::Binary(&[0xCA, 0xFE])).unwrap();
        let mut reader = OctetReader::new(&encoded);
        let decoded = decode(&mut reader, Alphabet::Data8, false).unwrap();
        assert_eq!(decoded.text, "\u{CA}\u{FE}");
    }

    #[test]
    fn test_truncated_user_data_rejected() {
        // UDL says 10 septets (9 octets) but only 3 octets follow
        let data = [0x0A, 0x01, 0x02, 0x03];
        let mut reader = OctetReader::new(&data);
        assert!(matches!(
            decode(&mut reader, Alphabet::Gsm7, false),
            Err(PduError::Truncated { .. })
        ));
    }
}

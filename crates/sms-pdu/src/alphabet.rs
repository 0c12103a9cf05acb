//! Text alphabets: GSM 7-bit default alphabet, 8-bit data and UCS-2
//!
//! The 7-bit alphabet is handled in two layers. Characters map to septets
//! through the default table and the escape (0x1B) extension table, and
//! septets are packed LSB-first into octets with an optional number of
//! leading fill bits, which is how text lines up after a user data header.

use crate::error::PduError;

/// Escape septet introducing an extension table character
pub const ESCAPE: u8 = 0x1B;

/// Text alphabet selected by the data coding scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Alphabet {
    /// GSM 03.38 default alphabet, packed 7 bits per character
    #[default]
    Gsm7,
    /// Raw 8-bit data
    Data8,
    /// UCS-2, big-endian 16-bit code units
    Ucs2,
}

impl Alphabet {
    /// Alphabet bits as used in the general data coding group
    pub fn bits(self) -> u8 {
        match self {
            Alphabet::Gsm7 => 0b00,
            Alphabet::Data8 => 0b01,
            Alphabet::Ucs2 => 0b10,
        }
    }

    /// Alphabet from the general data coding group bits (reserved maps to 7-bit)
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b01 => Alphabet::Data8,
            0b10 => Alphabet::Ucs2,
            _ => Alphabet::Gsm7,
        }
    }
}

/// Default alphabet, indexed by septet value. Index 27 is the escape.
const BASIC: [char; 128] = [
    '@', '£', '$', '¥', 'è', 'é', 'ù', 'ì', 'ò', 'Ç', '\n', 'Ø', 'ø', '\r', 'Å', 'å', //
    'Δ', '_', 'Φ', 'Γ', 'Λ', 'Ω', 'Π', 'Ψ', 'Σ', 'Θ', 'Ξ', '\u{1B}', 'Æ', 'æ', 'ß', 'É', //
    ' ', '!', '"', '#', '¤', '%', '&', '\'', '(', ')', '*', '+', ',', '-', '.', '/', //
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', ':', ';', '<', '=', '>', '?', //
    '¡', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', //
    'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'Ä', 'Ö', 'Ñ', 'Ü', '§', //
    '¿', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', //
    'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z', 'ä', 'ö', 'ñ', 'ü', 'à', //
];

/// Extension table reached through the escape septet
const EXTENSION: [(u8, char); 10] = [
    (0x0A, '\u{0C}'),
    (0x14, '^'),
    (0x28, '{'),
    (0x29, '}'),
    (0x2F, '\\'),
    (0x3C, '['),
    (0x3D, '~'),
    (0x3E, ']'),
    (0x40, '|'),
    (0x65, '€'),
];

fn basic_septet(c: char) -> Option<u8> {
    if c == '\u{1B}' {
        return None;
    }
    BASIC.iter().position(|&b| b == c).map(|i| i as u8)
}

fn extension_septet(c: char) -> Option<u8> {
    EXTENSION.iter().find(|(_, ch)| *ch == c).map(|(s, _)| *s)
}

/// Septets needed to encode `c`, or `None` if it is not in the GSM alphabet
pub fn gsm7_char_len(c: char) -> Option<usize> {
    if basic_septet(c).is_some() {
        Some(1)
    } else if extension_septet(c).is_some() {
        Some(2)
    } else {
        None
    }
}

/// Whether every character of `text` has a GSM 7-bit representation
pub fn is_gsm7(text: &str) -> bool {
    text.chars().all(|c| gsm7_char_len(c).is_some())
}

/// Map text to unpacked septets, expanding extension characters to escape pairs
pub fn to_septets(text: &str) -> Result<Vec<u8>, PduError> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        if let Some(s) = basic_septet(c) {
            out.push(s);
        } else if let Some(s) = extension_septet(c) {
            out.push(ESCAPE);
            out.push(s);
        } else {
            return Err(PduError::UnencodableCharacter(c));
        }
    }
    Ok(out)
}

/// Map unpacked septets back to text
///
/// An escape followed by a value missing from the extension table falls back
/// to the default table. A trailing lone escape is dropped.
pub fn from_septets(septets: &[u8]) -> String {
    let mut out = String::with_capacity(septets.len());
    let mut escaped = false;
    for &s in septets {
        let s = s & 0x7F;
        if escaped {
            escaped = false;
            match EXTENSION.iter().find(|(v, _)| *v == s) {
                Some((_, c)) => out.push(*c),
                None => out.push(BASIC[s as usize]),
            }
        } else if s == ESCAPE {
            escaped = true;
        } else {
            out.push(BASIC[s as usize]);
        }
    }
    out
}

/// Pack septets LSB-first, preceded by `fill_bits` zero bits (0..=6)
pub fn pack_septets(septets: &[u8], fill_bits: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity((septets.len() * 7 + fill_bits).div_ceil(8));
    let mut acc: u32 = 0;
    let mut bits = fill_bits as u32;

    for &s in septets {
        acc |= u32::from(s & 0x7F) << bits;
        bits += 7;
        while bits >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            bits -= 8;
        }
    }
    if bits > 0 {
        out.push(acc as u8);
    }
    out
}

/// Unpack septets, skipping `fill_bits` leading bits of the first octet
///
/// With an explicit `count`, exactly that many septets are produced (fewer if
/// the input runs out). Without one, every complete septet is produced and a
/// trailing all-zero septet is treated as padding.
pub fn unpack_septets(octets: &[u8], count: Option<usize>, fill_bits: usize) -> Vec<u8> {
    let available = (octets.len() * 8).saturating_sub(fill_bits) / 7;
    let wanted = count.map_or(available, |c| c.min(available));

    let mut out = Vec::with_capacity(wanted);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    let mut skip = fill_bits as u32;

    for &o in octets {
        if out.len() == wanted {
            break;
        }
        acc |= u32::from(o) << bits;
        bits += 8;
        if skip > 0 {
            acc >>= skip;
            bits -= skip;
            skip = 0;
        }
        while bits >= 7 && out.len() < wanted {
            out.push((acc & 0x7F) as u8);
            acc >>= 7;
            bits -= 7;
        }
    }

    if count.is_none() && out.last() == Some(&0) {
        out.pop();
    }
    out
}

/// Encode text as UCS-2 big-endian bytes
pub fn to_ucs2(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
}

/// Decode UCS-2 big-endian bytes; an odd trailing byte is ignored
pub fn from_ucs2(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

/// Decode a UCS-2 hex string such as the text field of a `+CUSD` line
pub fn decode_ucs2_hex(hex_text: &str) -> Result<String, PduError> {
    crate::hex::decode(hex_text).map(|bytes| from_ucs2(&bytes))
}

/// Decode 8-bit data as text, one character per octet
pub fn from_data8(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

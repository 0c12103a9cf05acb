//! Hex text helpers
//!
//! Modems exchange PDUs as uppercase hex text. Lowercase is accepted on input.

use crate::error::PduError;

const DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Encode bytes as uppercase hex
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(DIGITS[(b >> 4) as usize] as char);
        out.push(DIGITS[(b & 0x0F) as usize] as char);
    }
    out
}

/// Decode a hex string into bytes
pub fn decode(text: &str) -> Result<Vec<u8>, PduError> {
    let text = text.trim();
    if text.len() % 2 != 0 {
        return Err(PduError::InvalidHex(format!(
            "odd number of digits ({})",
            text.len()
        )));
    }

    text.as_bytes()
        .chunks(2)
        .map(|pair| Ok((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

fn nibble(c: u8) -> Result<u8, PduError> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(PduError::InvalidHex(format!("unexpected character {:?}", c as char))),
    }
}

//! Outgoing SMS-SUBMIT encoding with segmentation
//!
//! A message that fits in one PDU is sent without a header. Longer messages
//! are split into parts that each carry a concatenation header, which eats
//! into the per-part capacity:
//!
//! | Alphabet | Single | 8-bit reference | 16-bit reference |
//! |----------|--------|-----------------|------------------|
//! | 7-bit    | 160    | 153             | 152              |
//! | 8-bit    | 140    | 134             | 133              |
//! | UCS-2    | 70     | 67              | 66               |
//!
//! Characters are never split: an escaped 7-bit character or a UTF-16
//! surrogate pair always lands whole in one part.

use tracing::debug;

use crate::address::{Address, AddressType};
use crate::alphabet::{self, Alphabet};
use crate::dcs::{DataCodingScheme, MessageClass, ProtocolIdentifier};
use crate::error::PduError;
use crate::header::{Concatenation, UserDataHeader};
use crate::hex;
use crate::pdu::Submit;
use crate::user_data::{self, Payload};
use crate::validity::ValidityPeriod;

/// Maximum user data octets in one PDU
const MAX_USER_DATA: usize = 140;
/// Parts a concatenation header can number
const MAX_PARTS: usize = 255;

/// Options for [`encode_submit`] and [`encode_binary`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOptions {
    /// Force an alphabet; `None` picks 7-bit when possible, otherwise UCS-2
    pub alphabet: Option<Alphabet>,
    pub class: Option<MessageClass>,
    /// Force the international (`Some(true)`) or unknown (`Some(false)`) type
    pub international: Option<bool>,
    pub validity: Option<ValidityPeriod>,
    pub status_report: bool,
    /// Use IEI 0x08 with a 16-bit reference instead of IEI 0x00
    pub wide_reference: bool,
    pub smsc: Option<Address>,
    pub reject_duplicates: bool,
    /// Fixed concatenation reference; random when `None`
    pub reference: Option<u16>,
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self {
            alphabet: None,
            class: None,
            international: None,
            validity: None,
            status_report: true,
            wide_reference: false,
            smsc: None,
            reject_duplicates: false,
            reference: None,
        }
    }
}

impl SubmitOptions {
    /// Class 0 message
    pub fn flash(mut self) -> Self {
        self.class = Some(MessageClass::Class0);
        self
    }
}

/// One encoded PDU ready for `AT+CMGS`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub hex: String,
    /// Octets after the SMSC block, the argument to `AT+CMGS`
    pub tpdu_len: usize,
    pub header: Option<Concatenation>,
    /// Text carried by this part
    pub text: String,
}

/// Encode `text` for `number`, splitting it into as many parts as needed
pub fn encode_submit(
    number: &str,
    text: &str,
    options: &SubmitOptions,
) -> Result<Vec<Part>, PduError> {
    let alphabet = options.alphabet.unwrap_or_else(|| {
        if alphabet::is_gsm7(text) {
            Alphabet::Gsm7
        } else {
            Alphabet::Ucs2
        }
    });

    let units = char_units(text, alphabet)?;
    let total: usize = units.iter().map(|(_, cost)| cost).sum();
    let chunks = if total <= single_capacity(alphabet) {
        vec![text.to_string()]
    } else {
        split_text(&units, part_capacity(alphabet, options.wide_reference))
    };

    let template = submit_template(number, alphabet, options)?;
    build_parts(&template, options, chunks.len(), |submit, header, i| {
        let text = &chunks[i];
        let ud = user_data::encode(alphabet, header, Payload::Text(text))?;
        submit.text = text.clone();
        Ok(ud)
    })
}

/// Encode raw 8-bit data for `number`, splitting it as needed
pub fn encode_binary(
    number: &str,
    data: &[u8],
    options: &SubmitOptions,
) -> Result<Vec<Part>, PduError> {
    let chunks: Vec<&[u8]> = if data.len() <= MAX_USER_DATA {
        vec![data]
    } else {
        data.chunks(part_capacity(Alphabet::Data8, options.wide_reference))
            .collect()
    };

    let template = submit_template(number, Alphabet::Data8, options)?;
    build_parts(&template, options, chunks.len(), |submit, header, i| {
        submit.text = alphabet::from_data8(chunks[i]);
        user_data::encode(Alphabet::Data8, header, Payload::Binary(chunks[i]))
    })
}

fn submit_template(
    number: &str,
    alphabet: Alphabet,
    options: &SubmitOptions,
) -> Result<Submit, PduError> {
    let mut destination = Address::parse(number)?;
    match options.international {
        Some(true) => destination.kind = AddressType::INTERNATIONAL,
        Some(false) => destination.kind = AddressType::UNKNOWN,
        None => {}
    }

    let mut dcs = DataCodingScheme::new(alphabet);
    dcs.class = options.class;

    Ok(Submit {
        smsc: options.smsc.clone(),
        reference: 0,
        destination,
        pid: ProtocolIdentifier::default(),
        dcs,
        validity: options.validity,
        header: None,
        text: String::new(),
        reject_duplicates: options.reject_duplicates,
        status_report_request: options.status_report,
        reply_path: false,
    })
}

fn build_parts<F>(
    template: &Submit,
    options: &SubmitOptions,
    count: usize,
    mut user_data_for: F,
) -> Result<Vec<Part>, PduError>
where
    F: FnMut(&mut Submit, Option<&UserDataHeader>, usize) -> Result<Vec<u8>, PduError>,
{
    if count > MAX_PARTS {
        return Err(PduError::TextTooLong { parts: count });
    }

    let reference = options.reference.unwrap_or_else(|| random_reference(options.wide_reference));
    let multipart = count > 1;
    debug!(
        "encoding {} part(s), {:?}, reference {}",
        count, template.dcs.alphabet, reference
    );

    let mut parts = Vec::with_capacity(count);
    for i in 0..count {
        let concat = multipart.then(|| Concatenation {
            reference: if options.wide_reference {
                reference
            } else {
                reference & 0xFF
            },
            total: count as u8,
            part: (i + 1) as u8,
            wide_reference: options.wide_reference,
        });
        let header = concat.map(UserDataHeader::with_concatenation);

        let mut submit = template.clone();
        let ud = user_data_for(&mut submit, header.as_ref(), i)?;
        let (mut octets, smsc_len) = submit.encode_envelope(header.is_some())?;
        octets.extend(ud);

        parts.push(Part {
            tpdu_len: octets.len() - smsc_len,
            hex: hex::encode(&octets),
            header: concat,
            text: submit.text,
        });
    }
    Ok(parts)
}

fn random_reference(wide: bool) -> u16 {
    if wide {
        rand::random::<u16>()
    } else {
        u16::from(rand::random::<u8>())
    }
}

/// Capacity of a lone PDU in alphabet units
fn single_capacity(alphabet: Alphabet) -> usize {
    match alphabet {
        Alphabet::Gsm7 => MAX_USER_DATA * 8 / 7,
        Alphabet::Data8 => MAX_USER_DATA,
        Alphabet::Ucs2 => MAX_USER_DATA / 2,
    }
}

/// Capacity of one part of a concatenated message in alphabet units
fn part_capacity(alphabet: Alphabet, wide_reference: bool) -> usize {
    let header = Concatenation::header_len(wide_reference);
    match alphabet {
        Alphabet::Gsm7 => single_capacity(alphabet) - user_data::header_septets(header),
        Alphabet::Data8 => MAX_USER_DATA - header,
        Alphabet::Ucs2 => (MAX_USER_DATA - header) / 2,
    }
}

/// Each character with its cost in alphabet units
fn char_units(text: &str, alphabet: Alphabet) -> Result<Vec<(char, usize)>, PduError> {
    text.chars()
        .map(|c| {
            let cost = match alphabet {
                Alphabet::Gsm7 => {
                    alphabet::gsm7_char_len(c).ok_or(PduError::UnencodableCharacter(c))?
                }
                Alphabet::Ucs2 => c.len_utf16(),
                Alphabet::Data8 => {
                    if u32::from(c) > 0xFF {
                        return Err(PduError::UnencodableCharacter(c));
                    }
                    1
                }
            };
            Ok((c, cost))
        })
        .collect()
}

fn split_text(units: &[(char, usize)], capacity: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut used = 0;
    for &(c, cost) in units {
        if used + cost > capacity {
            chunks.push(std::mem::take(&mut current));
            used = 0;
        }
        current.push(c);
        used += cost;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

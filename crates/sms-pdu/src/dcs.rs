//! Data coding scheme (TP-DCS) and protocol identifier (TP-PID)

use crate::alphabet::Alphabet;

/// Message class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageClass {
    /// Flash message, displayed immediately and not stored
    Class0,
    /// Mobile equipment specific
    Class1,
    /// SIM specific
    Class2,
    /// Terminal equipment specific
    Class3,
}

impl MessageClass {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => MessageClass::Class0,
            1 => MessageClass::Class1,
            2 => MessageClass::Class2,
            _ => MessageClass::Class3,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            MessageClass::Class0 => 0,
            MessageClass::Class1 => 1,
            MessageClass::Class2 => 2,
            MessageClass::Class3 => 3,
        }
    }
}

/// Coding group, selected by the high nibble of the DCS octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DcsGroup {
    /// `00xx` and `01xx` (the latter marked for automatic deletion)
    General { compressed: bool, auto_delete: bool },
    /// `1100` discard, `1101` store, `1110` store UCS-2
    MessageWaiting {
        store: bool,
        active: bool,
        indication: u8,
    },
    /// `1111` data coding / message class
    DataClass,
    /// `1000`..`1011`
    Reserved(u8),
}

/// Decoded TP-DCS octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DataCodingScheme {
    pub alphabet: Alphabet,
    pub class: Option<MessageClass>,
    pub group: DcsGroup,
}

impl DataCodingScheme {
    /// General group, no class, uncompressed
    pub fn new(alphabet: Alphabet) -> Self {
        Self {
            alphabet,
            class: None,
            group: DcsGroup::General {
                compressed: false,
                auto_delete: false,
            },
        }
    }

    pub fn with_class(mut self, class: MessageClass) -> Self {
        self.class = Some(class);
        self
    }

    /// Class 0 message in the given alphabet
    pub fn flash(alphabet: Alphabet) -> Self {
        Self::new(alphabet).with_class(MessageClass::Class0)
    }

    pub fn is_flash(&self) -> bool {
        self.class == Some(MessageClass::Class0)
    }

    pub fn is_compressed(&self) -> bool {
        matches!(
            self.group,
            DcsGroup::General {
                compressed: true,
                ..
            }
        )
    }

    pub fn from_byte(b: u8) -> Self {
        match b >> 4 {
            0x0..=0x7 => {
                let class = if b & 0x10 != 0 {
                    Some(MessageClass::from_bits(b))
                } else {
                    None
                };
                Self {
                    alphabet: Alphabet::from_bits(b >> 2),
                    class,
                    group: DcsGroup::General {
                        compressed: b & 0x20 != 0,
                        auto_delete: b & 0x40 != 0,
                    },
                }
            }
            0xC..=0xE => Self {
                alphabet: if b >> 4 == 0xE {
                    Alphabet::Ucs2
                } else {
                    Alphabet::Gsm7
                },
                class: None,
                group: DcsGroup::MessageWaiting {
                    store: b >> 4 != 0xC,
                    active: b & 0x08 != 0,
                    indication: b & 0x03,
                },
            },
            0xF => Self {
                alphabet: if b & 0x04 != 0 {
                    Alphabet::Data8
                } else {
                    Alphabet::Gsm7
                },
                class: Some(MessageClass::from_bits(b)),
                group: DcsGroup::DataClass,
            },
            _ => Self {
                alphabet: Alphabet::Gsm7,
                class: None,
                group: DcsGroup::Reserved(b),
            },
        }
    }

    pub fn to_byte(&self) -> u8 {
        let class_bits = self.class.map_or(0, MessageClass::bits);
        match self.group {
            DcsGroup::General {
                compressed,
                auto_delete,
            } => {
                let mut b = self.alphabet.bits() << 2 | class_bits;
                if self.class.is_some() {
                    b |= 0x10;
                }
                if compressed {
                    b |= 0x20;
                }
                if auto_delete {
                    b |= 0x40;
                }
                b
            }
            DcsGroup::MessageWaiting {
                store,
                active,
                indication,
            } => {
                let high = match (store, self.alphabet) {
                    (false, _) => 0xC0,
                    (true, Alphabet::Ucs2) => 0xE0,
                    (true, _) => 0xD0,
                };
                let active = if active { 0x08 } else { 0 };
                high | active | (indication & 0x03)
            }
            DcsGroup::DataClass => {
                let data = if self.alphabet == Alphabet::Data8 {
                    0x04
                } else {
                    0
                };
                0xF0 | data | class_bits
            }
            DcsGroup::Reserved(raw) => raw,
        }
    }
}

impl Default for DataCodingScheme {
    fn default() -> Self {
        Self::new(Alphabet::Gsm7)
    }
}

/// TP-PID octet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtocolIdentifier(pub u8);

impl ProtocolIdentifier {
    /// Bits 7-6
    pub fn group(&self) -> u8 {
        self.0 >> 6
    }

    /// Bit 5: telematic interworking
    pub fn is_telematic(&self) -> bool {
        self.group() == 0 && self.0 & 0x20 != 0
    }

    /// Bits 4-0
    pub fn kind(&self) -> u8 {
        self.0 & 0x1F
    }
}

//! Integration tests for the SMS PDU codec
//!
//! These tests exercise the public API end to end:
//! - Encoding outgoing messages and decoding the result
//! - Decoding PDUs as reported by real devices
//! - Reassembling concatenated messages from their parts
//! - Alphabet selection and segmentation boundaries

use sms_pdu::{
    encode_submit, Alphabet, Concatenation, MessageStatus, Pdu, PduError, SubmitOptions,
};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Printable characters of the GSM default alphabet, one septet each
    pub const GSM7_BASIC: &str =
        "@£$¥èéùìòÇØøÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
         ¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

    /// Characters that need the escape table
    pub const GSM7_EXTENDED: &str = "^{}\\[~]|€";

    /// Encode with a fixed reference so parts are predictable
    pub fn encode_fixed(text: &str) -> Vec<sms_pdu::Part> {
        let options = SubmitOptions {
            reference: Some(0x5A),
            ..Default::default()
        };
        encode_submit("+491701234567", text, &options).unwrap()
    }

    /// Decode every part and join the texts in part order
    pub fn reassemble(parts: &[sms_pdu::Part]) -> (String, Vec<Concatenation>) {
        let mut decoded: Vec<(Option<Concatenation>, String)> = parts
            .iter()
            .map(|p| {
                let pdu = Pdu::decode(&p.hex).unwrap();
                (pdu.concatenation(), pdu.text().to_string())
            })
            .collect();
        decoded.sort_by_key(|(c, _)| c.map(|c| c.part));
        let headers = decoded.iter().filter_map(|(c, _)| *c).collect();
        let text = decoded.into_iter().map(|(_, t)| t).collect();
        (text, headers)
    }
}

// ============================================================================
// Encode / Decode Tests
// ============================================================================

mod codec_tests {
    use super::*;

    #[test]
    fn hello_submit_decodes_back() {
        let parts = encode_submit("+491701234567", "Hello", &SubmitOptions::default()).unwrap();
        assert_eq!(parts.len(), 1);

        let Pdu::Submit(submit) = Pdu::decode(&parts[0].hex).unwrap() else {
            panic!("expected SUBMIT");
        };
        assert_eq!(submit.text, "Hello");
        assert_eq!(submit.destination.to_string(), "+491701234567");
        assert_eq!(submit.dcs.alphabet, Alphabet::Gsm7);
        assert!(!submit.dcs.is_flash());
        assert!(submit.header.is_none());
    }

    #[test]
    fn tpdu_length_excludes_smsc_block() {
        let options = SubmitOptions {
            smsc: sms_pdu::Address::parse("+31624000000").ok(),
            ..Default::default()
        };
        let parts = encode_submit("12345", "ping", &options).unwrap();
        let total_octets = parts[0].hex.len() / 2;
        // 07 91 + 6 digit octets
        assert_eq!(parts[0].tpdu_len, total_octets - 8);
    }

    #[test]
    fn device_deliver_pdu_decodes() {
        let pdu = Pdu::decode(
            "07917283010010F5040BC87238880900F10000993092516195800AE8329BFD4697D9EC37",
        )
        .unwrap();
        assert_eq!(pdu.address().number, "27838890001");
        assert_eq!(pdu.text(), "hellohello");
        let ts = pdu.timestamp().unwrap();
        assert_eq!(ts.to_string(), "1999-03-29T15:16:59+02:00");
    }

    #[test]
    fn ucs2_deliver_with_header_decodes() {
        // DELIVER, UDHI set, UCS-2, part 2 of 2 with reference 0x1F
        let hex = concat!(
            "00", "44", "0B91", "9471103254F6", "00", "08",
            "42105121054480", "0E", "050003", "1F0202",
            "0041", "00DF", "0436", "0021",
        );
        let pdu = Pdu::decode(hex).unwrap();
        assert_eq!(pdu.text(), "Aßж!");
        let concat = pdu.concatenation().unwrap();
        assert_eq!((concat.reference, concat.total, concat.part), (0x1F, 2, 2));
        assert_eq!(pdu.address().to_string(), "+49170123456");
    }

    #[test]
    fn malformed_pdus_fail_without_partial_result() {
        assert!(matches!(Pdu::decode("zz"), Err(PduError::InvalidHex(_))));
        assert!(matches!(Pdu::decode("000"), Err(PduError::InvalidHex(_))));
        assert_eq!(Pdu::decode("0007"), Err(PduError::UnknownMessageType(3)));
        assert!(matches!(
            Pdu::decode("00040B91"),
            Err(PduError::Truncated { .. })
        ));
    }

    #[test]
    fn status_report_exposes_status() {
        let report = sms_pdu::StatusReport {
            smsc: None,
            reference: 7,
            recipient: sms_pdu::Address::parse("+4917012345").unwrap(),
            timestamp: sms_pdu::Timestamp::from_octets(&[0x42, 0x60, 0x10, 0x21, 0x00, 0x00, 0x40])
                .unwrap(),
            discharge: sms_pdu::Timestamp::from_octets(&[0x42, 0x60, 0x10, 0x21, 0x00, 0x30, 0x40])
                .unwrap(),
            status: MessageStatus::TemporaryFailure(0x62),
        };
        let Pdu::StatusReport(decoded) = Pdu::decode(&report.to_hex().unwrap()).unwrap() else {
            panic!("expected STATUS-REPORT");
        };
        assert_eq!(decoded.reference, 7);
        assert!(!decoded.status.is_success());
        assert_eq!(decoded.discharge.second, 3);
    }
}

// ============================================================================
// Segmentation Tests
// ============================================================================

mod segmentation_tests {
    use super::*;

    #[test]
    fn long_seven_bit_text_reassembles() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(8);
        let parts = helpers::encode_fixed(&text);
        assert_eq!(parts.len(), 3);

        let (joined, headers) = helpers::reassemble(&parts);
        assert_eq!(joined, text);
        assert!(headers.iter().all(|h| h.reference == 0x5A && h.total == 3));
    }

    #[test]
    fn long_ucs2_text_reassembles() {
        let text = "Съешь же ещё этих мягких французских булок. ".repeat(3);
        let parts = helpers::encode_fixed(&text);
        assert!(parts.len() > 1);
        let (joined, _) = helpers::reassemble(&parts);
        assert_eq!(joined, text);
    }

    #[test]
    fn forced_eight_bit_text() {
        let options = SubmitOptions {
            alphabet: Some(Alphabet::Data8),
            ..Default::default()
        };
        let parts = encode_submit("12345", "raw\u{7F}", &options).unwrap();
        let pdu = Pdu::decode(&parts[0].hex).unwrap();
        assert_eq!(pdu.dcs().unwrap().alphabet, Alphabet::Data8);
        assert_eq!(pdu.text(), "raw\u{7F}");
    }

    #[test]
    fn seven_bit_rejects_foreign_characters_when_forced() {
        let options = SubmitOptions {
            alphabet: Some(Alphabet::Gsm7),
            ..Default::default()
        };
        assert_eq!(
            encode_submit("12345", "naïve", &options),
            Err(PduError::UnencodableCharacter('ï'))
        );
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn gsm7_char() -> impl Strategy<Value = char> {
        let chars: Vec<char> = helpers::GSM7_BASIC
            .chars()
            .chain(helpers::GSM7_EXTENDED.chars())
            .collect();
        prop::sample::select(chars)
    }

    fn gsm7_text(max: usize) -> impl Strategy<Value = String> {
        prop::collection::vec(gsm7_char(), 0..max).prop_map(|v| v.into_iter().collect())
    }

    /// Text of at most `budget` septets, escape pairs counting two
    fn gsm7_within(
        chars: std::ops::RangeInclusive<usize>,
        budget: usize,
    ) -> impl Strategy<Value = String> {
        prop::collection::vec(gsm7_char(), chars).prop_map(move |v| {
            let mut used = 0;
            v.into_iter()
                .take_while(|&c| {
                    used += sms_pdu::alphabet::gsm7_char_len(c).unwrap_or(2);
                    used <= budget
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn seven_bit_round_trip(text in gsm7_within(0..=160, 160)) {
            let parts = encode_submit("+4917012345", &text, &SubmitOptions::default()).unwrap();
            prop_assert_eq!(parts.len(), 1);
            let pdu = Pdu::decode(&parts[0].hex).unwrap();
            prop_assert_eq!(pdu.text(), text.as_str());
        }

        #[test]
        fn seven_bit_round_trip_near_capacity(text in gsm7_within(150..=160, 160)) {
            let parts = encode_submit("+4917012345", &text, &SubmitOptions::default()).unwrap();
            prop_assert_eq!(parts.len(), 1);
            let pdu = Pdu::decode(&parts[0].hex).unwrap();
            prop_assert_eq!(pdu.text(), text.as_str());
        }

        #[test]
        fn segmented_parts_share_reference(text in gsm7_text(600), wide: bool) {
            let options = SubmitOptions { wide_reference: wide, ..Default::default() };
            let parts = encode_submit("12345", &text, &options).unwrap();
            let (joined, headers) = helpers::reassemble(&parts);
            prop_assert_eq!(&joined, &text);

            if parts.len() > 1 {
                prop_assert_eq!(headers.len(), parts.len());
                let reference = headers[0].reference;
                for (i, h) in headers.iter().enumerate() {
                    prop_assert_eq!(h.reference, reference);
                    prop_assert_eq!(h.part as usize, i + 1);
                    prop_assert_eq!(h.total as usize, parts.len());
                    prop_assert_eq!(h.wide_reference, wide);
                }
            } else {
                prop_assert!(headers.is_empty());
            }
        }

        #[test]
        fn unicode_text_round_trips(text in "\\PC{0,200}") {
            let parts = encode_submit("12345", &text, &SubmitOptions::default()).unwrap();
            let (joined, _) = helpers::reassemble(&parts);
            prop_assert_eq!(joined, text);
        }

        #[test]
        fn every_part_fits_in_one_pdu(text in "\\PC{0,400}") {
            let parts = encode_submit("12345", &text, &SubmitOptions::default()).unwrap();
            for part in &parts {
                // SMSC 00 + up to 12 octets of envelope + 140 octets of user data
                prop_assert!(part.tpdu_len <= 12 + 141);
            }
        }
    }
}

//! Integration tests for the modem driver
//!
//! These tests drive a `Modem` over an in-memory duplex stream, either
//! against the virtual modem or against a hand-scripted peer, and verify:
//! - Queue order and the single in-flight command
//! - Timeouts, unsolicited notifications and response buffering
//! - SMS send, inbox merge and deletion end to end
//! - Initialization with a locked SIM

use std::time::Duration;

use modem_core::{
    CommandSpec, LineFramer, Modem, ModemConnection, ModemError, ModemEvent, ModemOptions,
    SendOptions,
};
use modem_sim::{
    deliver_pdus, run_virtual_modem_task, SimSnapshot, VirtualModem, VirtualModemCommand,
    VirtualModemConfig,
};
use sms_pdu::Timestamp;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::{mpsc, oneshot};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    pub struct Harness {
        pub modem: Modem,
        pub events: mpsc::Receiver<ModemEvent>,
        pub sim: mpsc::Sender<VirtualModemCommand>,
    }

    impl Harness {
        pub async fn snapshot(&self) -> SimSnapshot {
            let (tx, rx) = oneshot::channel();
            self.sim.send(VirtualModemCommand::Query(tx)).await.unwrap();
            rx.await.unwrap()
        }

        /// Every event received so far
        pub fn drain(&mut self) -> Vec<ModemEvent> {
            let mut out = Vec::new();
            while let Ok(event) = self.events.try_recv() {
                out.push(event);
            }
            out
        }

        /// Wait for the first event matching `pred`
        pub async fn wait_for(&mut self, pred: impl Fn(&ModemEvent) -> bool) -> ModemEvent {
            tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    let event = self.events.recv().await.expect("event channel closed");
                    if pred(&event) {
                        return event;
                    }
                }
            })
            .await
            .expect("event not received")
        }
    }

    pub fn options() -> ModemOptions {
        ModemOptions {
            auto_init_on_open: false,
            ..Default::default()
        }
    }

    /// Start a driver against a virtual modem
    pub async fn start(sim: VirtualModem, options: ModemOptions) -> Harness {
        let (driver_io, device_io) = duplex(4096);
        let (sim_tx, sim_rx) = mpsc::channel(16);
        tokio::spawn(run_virtual_modem_task(device_io, sim, sim_rx));
        let (modem, events) = Modem::spawn(driver_io, options).await.unwrap();
        Harness {
            modem,
            events,
            sim: sim_tx,
        }
    }

    /// Start a driver whose peer is the returned stream
    pub fn scripted() -> (Modem, mpsc::Receiver<ModemEvent>, DuplexStream) {
        let (driver_io, peer) = duplex(4096);
        let connection = ModemConnection::new("scripted".to_string(), driver_io);
        let (modem, events) = Modem::launch(connection, options());
        (modem, events, peer)
    }

    /// Read from the peer until `needle` has been written by the driver
    pub async fn expect_written(peer: &mut DuplexStream, needle: &str) {
        let mut seen = Vec::new();
        let mut buf = [0u8; 256];
        while !String::from_utf8_lossy(&seen).contains(needle) {
            let n = peer.read(&mut buf).await.unwrap();
            assert!(n > 0, "driver closed before writing {:?}", needle);
            seen.extend_from_slice(&buf[..n]);
        }
    }

    pub fn written(events: &[ModemEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                ModemEvent::WriteToModem { data } => Some(data.trim_end().to_string()),
                _ => None,
            })
            .collect()
    }

    pub fn timestamp() -> Timestamp {
        Timestamp {
            year: 2024,
            month: 6,
            day: 1,
            hour: 12,
            minute: 30,
            second: 0,
            offset_quarters: 8,
        }
    }
}

use helpers::*;

// ============================================================================
// Command Execution Tests
// ============================================================================

mod execution_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn priority_commands_overtake_normal_ones() {
        let mut sim = VirtualModem::default();
        sim.ignore("AT+CNUM");
        let mut h = start(sim, options()).await;

        let blocker = h
            .modem
            .queue(CommandSpec::new("AT+CNUM").timeout(Duration::from_millis(200)), false)
            .await
            .unwrap();
        let n1 = h.modem.queue(CommandSpec::new("AT+CSQ"), false).await.unwrap();
        let n2 = h.modem.queue(CommandSpec::new("AT+CGSN"), false).await.unwrap();
        let p1 = h.modem.queue(CommandSpec::new("ATH"), true).await.unwrap();
        let p2 = h.modem.queue(CommandSpec::new("AT"), true).await.unwrap();

        assert!(blocker.wait().await.unwrap_err().is_timeout());
        for pending in [n1, n2, p1, p2] {
            pending.wait().await.unwrap();
        }

        let written = written(&h.drain());
        assert_eq!(written, vec!["AT+CNUM", "ATH", "AT", "AT+CSQ", "AT+CGSN"]);
    }

    #[tokio::test]
    async fn only_one_command_is_written_at_a_time() {
        let (modem, _events, mut peer) = scripted();

        let first = modem.queue(CommandSpec::new("AT+CGSN"), false).await.unwrap();
        let second = modem.queue(CommandSpec::new("AT+CSQ"), false).await.unwrap();
        expect_written(&mut peer, "AT+CGSN\r").await;

        // nothing else goes out until the first command completes
        let mut buf = [0u8; 64];
        let early = tokio::time::timeout(Duration::from_millis(50), peer.read(&mut buf)).await;
        assert!(early.is_err());

        peer.write_all(b"\r\n356938035643809\r\n\r\nOK\r\n").await.unwrap();
        assert_eq!(first.wait().await.unwrap(), vec!["356938035643809"]);

        expect_written(&mut peer, "AT+CSQ\r").await;
        peer.write_all(b"\r\n+CSQ: 10,99\r\n\r\nOK\r\n").await.unwrap();
        assert_eq!(second.wait().await.unwrap(), vec!["+CSQ: 10,99"]);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_command_times_out_on_schedule() {
        let mut sim = VirtualModem::default();
        sim.ignore("AT+CGSN");
        let h = start(sim, options()).await;

        let started = tokio::time::Instant::now();
        let result = h
            .modem
            .execute("AT+CGSN", Some(Duration::from_millis(100)), false)
            .await;
        let elapsed = started.elapsed();

        match result {
            Err(ModemError::CommandTimeout { command }) => assert_eq!(command, "AT+CGSN"),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed < Duration::from_millis(150));

        // the queue keeps working afterwards
        h.modem.check_modem().await.unwrap();
    }

    #[tokio::test]
    async fn device_error_carries_the_response() {
        let mut sim = VirtualModem::default();
        sim.fail_on("AT+CNUM");
        let h = start(sim, options()).await;

        match h.modem.own_number().await {
            Err(ModemError::Device { lines }) => assert_eq!(lines.last().unwrap(), "ERROR"),
            other => panic!("expected device error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn closing_fails_pending_commands() {
        let (modem, mut events, _peer) = scripted();

        let pending = modem.queue(CommandSpec::new("AT+CGSN"), false).await.unwrap();
        modem.close().await.unwrap();

        assert!(matches!(pending.wait().await, Err(ModemError::Transport(_))));
        assert!(!modem.is_open());
        let mut closed = false;
        while let Ok(event) = events.try_recv() {
            closed |= matches!(event, ModemEvent::Close);
        }
        assert!(closed);
    }
}

// ============================================================================
// Unsolicited Notification Tests
// ============================================================================

mod notification_tests {
    use super::*;

    #[tokio::test]
    async fn new_sms_notification_during_a_command() {
        let (modem, mut events, mut peer) = scripted();

        let pending = modem.queue(CommandSpec::new("AT+CSQ"), false).await.unwrap();
        expect_written(&mut peer, "AT+CSQ\r").await;
        peer.write_all(b"AT+CSQ\r\r\n+CSQ: 23,99\r\n\r\n+CMTI: \"SM\",7\r\n\r\nOK\r\n")
            .await
            .unwrap();

        assert_eq!(pending.wait().await.unwrap(), vec!["+CSQ: 23,99"]);
        let mut new_sms = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let ModemEvent::NewSms { index } = event {
                new_sms.push(index);
            }
        }
        assert_eq!(new_sms, vec![7]);
    }

    #[tokio::test]
    async fn signal_quality_from_virtual_modem() {
        let h = start(VirtualModem::default(), options()).await;
        let signal = h.modem.signal_quality().await.unwrap();
        assert_eq!(signal.quality, 23);
        assert_eq!(signal.strength, 67);
    }

    #[tokio::test]
    async fn incoming_call_and_ussd() {
        let mut h = start(VirtualModem::default(), options()).await;

        h.sim
            .send(VirtualModemCommand::Inject("+CLIP: \"+4917011\",145".into()))
            .await
            .unwrap();
        let call = h
            .wait_for(|e| matches!(e, ModemEvent::IncomingCall { .. }))
            .await;
        assert!(matches!(call, ModemEvent::IncomingCall { number, .. } if number == "+4917011"));

        h.modem.send_ussd("*100#").await.unwrap();
        let ussd = h
            .wait_for(|e| matches!(e, ModemEvent::IncomingUssd { .. }))
            .await;
        assert!(matches!(ussd, ModemEvent::IncomingUssd { text, .. } if text == "Balance: 5.00 EUR"));
    }

    #[tokio::test]
    async fn delete_on_receive() {
        let options = ModemOptions {
            delete_sms_on_receive: true,
            ..helpers::options()
        };
        let mut h = start(VirtualModem::default(), options).await;

        let pdu = deliver_pdus("+4917011", "hi", timestamp()).unwrap().remove(0);
        h.sim.send(VirtualModemCommand::ReceiveSms(pdu)).await.unwrap();
        h.wait_for(|e| matches!(e, ModemEvent::NewSms { index: 1 }))
            .await;
        h.wait_for(|e| matches!(e, ModemEvent::WriteToModem { data } if data.starts_with("AT+CMGD=1")))
            .await;

        // the deletion completes before the next command runs
        h.modem.check_modem().await.unwrap();
        assert!(h.snapshot().await.stored.is_empty());
    }
}

// ============================================================================
// SMS Tests
// ============================================================================

mod sms_tests {
    use super::*;

    #[tokio::test]
    async fn send_single_part() {
        let mut h = start(VirtualModem::default(), options()).await;

        let sent = h
            .modem
            .send_sms("+491701234567", "Hello", &SendOptions::default())
            .await
            .unwrap();
        assert_eq!(sent.parts.len(), 1);

        let snapshot = h.snapshot().await;
        assert_eq!(snapshot.sent, sent.parts);
        let pdu = sms_pdu::Pdu::decode(&snapshot.sent[0]).unwrap();
        assert_eq!(pdu.text(), "Hello");
        assert_eq!(pdu.address().to_string(), "+491701234567");

        let event = h.wait_for(|e| matches!(e, ModemEvent::SmsSent(_))).await;
        assert!(matches!(event, ModemEvent::SmsSent(sms) if sms.text == "Hello"));
    }

    #[tokio::test]
    async fn send_multipart() {
        let h = start(VirtualModem::default(), options()).await;
        let text = "0123456789".repeat(20);

        let sent = h
            .modem
            .send_sms("+491701234567", &text, &SendOptions::default())
            .await
            .unwrap();
        assert_eq!(sent.parts.len(), 2);

        let texts: String = h
            .snapshot()
            .await
            .sent
            .iter()
            .map(|p| sms_pdu::Pdu::decode(p).unwrap().text().to_string())
            .collect();
        assert_eq!(texts, text);
    }

    #[tokio::test]
    async fn eight_bit_text_keeps_latin1_characters() {
        let mut h = start(VirtualModem::default(), options()).await;
        let options = SendOptions {
            alphabet: Some(sms_pdu::Alphabet::Data8),
            ..Default::default()
        };

        let sent = h.modem.send_sms("+491701234567", "café", &options).await.unwrap();

        let snapshot = h.snapshot().await;
        let pdu = sms_pdu::Pdu::decode(&snapshot.sent[0]).unwrap();
        assert_eq!(pdu.text(), "café");
        assert_eq!(sent.text, "café");
        let event = h.wait_for(|e| matches!(e, ModemEvent::SmsSent(_))).await;
        assert!(matches!(event, ModemEvent::SmsSent(sms) if sms.text == "café"));
    }

    #[tokio::test]
    async fn eight_bit_text_outside_latin1_is_rejected() {
        let h = start(VirtualModem::default(), options()).await;
        let options = SendOptions {
            alphabet: Some(sms_pdu::Alphabet::Data8),
            ..Default::default()
        };

        let err = h.modem.send_sms("+491701234567", "€", &options).await.unwrap_err();
        assert!(matches!(err, ModemError::Pdu(_)));
        assert!(h.snapshot().await.sent.is_empty());
    }

    #[tokio::test]
    async fn send_binary_reports_what_the_recipient_sees() {
        let h = start(VirtualModem::default(), options()).await;
        let data = [0x00, 0x7F, 0xE9, 0xFF];

        let sent = h
            .modem
            .send_binary("+491701234567", &data, &SendOptions::default())
            .await
            .unwrap();

        let snapshot = h.snapshot().await;
        let pdu = sms_pdu::Pdu::decode(&snapshot.sent[0]).unwrap();
        assert_eq!(pdu.text(), sent.text);
        assert_eq!(sent.text, "\u{0}\u{7f}éÿ");
    }

    #[tokio::test]
    async fn failed_part_stops_the_send() {
        let mut sim = VirtualModem::default();
        sim.limit_submits(1);
        let mut h = start(sim, options()).await;

        let err = h
            .modem
            .send_sms("+491701234567", &"a".repeat(200), &SendOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModemError::SequenceStep { .. }));
        assert!(matches!(err.root(), ModemError::Device { .. }));
        assert_eq!(h.snapshot().await.sent.len(), 1);

        // let the event channel catch up behind one more command
        h.modem.check_modem().await.unwrap();
        let events = h.drain();
        let failed = events
            .iter()
            .filter(|e| matches!(e, ModemEvent::SmsSendFailed { .. }))
            .count();
        let sent = events
            .iter()
            .filter(|e| matches!(e, ModemEvent::SmsSent(_)))
            .count();
        assert_eq!((failed, sent), (1, 0));
    }

    #[tokio::test]
    async fn inbox_merges_concatenated_parts() {
        let mut sim = VirtualModem::default();
        let long = "abcdefghij".repeat(17);
        let parts = deliver_pdus("+4917011", &long, timestamp()).unwrap();
        assert_eq!(parts.len(), 2);
        // stored out of order, with a single message in between
        sim.store(1, parts[1].clone());
        sim.store(0, deliver_pdus("+4917022", "short", timestamp()).unwrap().remove(0));
        sim.store(1, parts[0].clone());
        let h = start(sim, options()).await;

        let inbox = h.modem.get_inbox().await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].text, long);
        assert_eq!(inbox[0].indexes, vec![3, 1]);
        assert!(inbox[0].is_complete());
        assert_eq!(inbox[1].text, "short");
        assert_eq!(inbox[1].address, "+4917022");

        let report = h.modem.delete_message(&inbox[0]).await;
        assert_eq!(report.deleted, vec![3, 1]);
        assert!(report.failed.is_empty());
        let stored: Vec<u32> = h.snapshot().await.stored.iter().map(|(i, _)| *i).collect();
        assert_eq!(stored, vec![2]);
    }

    #[tokio::test]
    async fn read_marks_message_read() {
        let mut sim = VirtualModem::default();
        sim.store(0, deliver_pdus("+4917011", "read me", timestamp()).unwrap().remove(0));
        let h = start(sim, options()).await;

        let sms = h.modem.read_sms(1).await.unwrap();
        assert_eq!(sms.pdu.text(), "read me");
        assert_eq!(h.snapshot().await.stored[0].1.stat, 1);
        assert!(h.modem.read_sms(9).await.is_err());
    }
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn initialize_unlocks_sim() {
        let sim = VirtualModem::from_config(VirtualModemConfig {
            pin: Some("1234".into()),
            ..Default::default()
        });
        let options = ModemOptions {
            pin_code: Some("1234".into()),
            auto_init_on_open: true,
            ..Default::default()
        };
        let mut h = start(sim, options).await;

        assert!(!h.snapshot().await.pin_locked);
        let events = h.drain();
        assert!(events.iter().any(|e| matches!(e, ModemEvent::Initialized)));
        assert!(written(&events).contains(&"AT+CPIN=1234".to_string()));
        assert!(written(&events).contains(&"AT+CMGF=0".to_string()));
    }

    #[tokio::test]
    async fn initialize_without_pin_fails() {
        let sim = VirtualModem::from_config(VirtualModemConfig {
            pin: Some("1234".into()),
            ..Default::default()
        });
        let h = start(sim, options()).await;

        let err = h.modem.initialize().await.unwrap_err();
        assert!(matches!(err, ModemError::ProtocolAssertion(_)));
    }

    #[tokio::test]
    async fn queries_against_virtual_modem() {
        let h = start(VirtualModem::default(), options()).await;

        assert_eq!(h.modem.serial_number().await.unwrap(), "356938035643809");
        assert_eq!(h.modem.own_number().await.unwrap().number, "+491701234567");
        assert_eq!(
            h.modem.current_operator().await.unwrap().name.as_deref(),
            Some("Virtual Net")
        );
        let operators = h.modem.available_operators().await.unwrap();
        assert_eq!(operators.len(), 2);
        let memory = h.modem.check_sim_memory().await.unwrap();
        assert_eq!((memory.used, memory.total), (0, 30));

        h.modem.set_own_number("+4930123", "Desk").await.unwrap();
        assert_eq!(h.modem.own_number().await.unwrap().number, "+4930123");
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn line() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("OK".to_string()),
            Just("+CMTI: \"SM\",3".to_string()),
            "[A-Z0-9+:, ]{1,20}",
        ]
    }

    proptest! {
        #[test]
        fn framing_ignores_chunk_boundaries(
            lines in prop::collection::vec(line(), 1..8),
            cuts in prop::collection::vec(0usize..200, 0..6),
        ) {
            let stream: String = lines.iter().map(|l| format!("\r\n{}\r\n", l)).collect();
            let bytes = stream.as_bytes();

            let mut whole = LineFramer::new();
            let expected = whole.feed(bytes);

            let mut cuts: Vec<usize> = cuts.into_iter().map(|c| c % (bytes.len() + 1)).collect();
            cuts.sort_unstable();
            let mut chunked = LineFramer::new();
            let mut actual = Vec::new();
            let mut start = 0;
            for cut in cuts.into_iter().chain(std::iter::once(bytes.len())) {
                actual.extend(chunked.feed(&bytes[start..cut]));
                start = cut;
            }

            prop_assert_eq!(&actual, &expected);
            let content: Vec<String> = actual.into_iter().filter(|l| !l.is_empty()).collect();
            prop_assert_eq!(content, lines);
        }
    }
}

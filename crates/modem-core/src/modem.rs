//! High-level modem operations
//!
//! [`Modem`] is a cheap, cloneable handle to a running actor. Every operation
//! queues one command (or one sequence) and awaits its reply, so operations
//! called from several tasks are serialized by the actor.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sms_pdu::alphabet::from_data8;
use sms_pdu::{
    encode_binary, encode_submit, Alphabet, Part, PduError, SubmitOptions, ValidityPeriod,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::actor::{run_modem_actor, ActorConfig, ModemCommand};
use crate::command::{
    Command, CommandHandle, CommandResult, CommandSequence, CommandSpec, QueueItem,
    SequenceResult, Terminator,
};
use crate::config::{ModemOptions, SerialSettings};
use crate::connection::ModemConnection;
use crate::error::ModemError;
use crate::events::{EventSink, ModemEvent, SentSms};
use crate::inbox::{merge_inbox, InboxMessage};
use crate::parse::{
    parse_available_operators, parse_current_operator, parse_listing, parse_own_number,
    parse_pin_ready, parse_read, parse_serial_number, parse_signal, parse_sim_memory,
    AvailableOperator, Operator, OwnNumber, Signal, SimMemory, SmsListing, StoredSms,
};

const CMGS_PROMPT_WAIT: Duration = Duration::from_millis(250);
const CMGS_PAYLOAD_TIMEOUT: Duration = Duration::from_secs(10);
const OPERATOR_SCAN_TIMEOUT: Duration = Duration::from_secs(60);

/// Concatenation header used for multi-part messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcatIei {
    /// IEI 0x00, 8-bit reference
    #[default]
    EightBit,
    /// IEI 0x08, 16-bit reference
    SixteenBit,
}

/// Options for [`Modem::send_sms`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendOptions {
    /// Class 0 message, shown immediately and not stored
    pub flash: bool,
    /// `None` picks 7-bit or UCS-2 from the text; `Some(Alphabet::Data8)`
    /// sends one octet per character, for text within Latin-1
    pub alphabet: Option<Alphabet>,
    /// Force the international or unknown number type
    pub international: Option<bool>,
    pub validity: Option<ValidityPeriod>,
    /// Request a delivery report
    pub status_report: bool,
    pub concat_iei: ConcatIei,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            flash: false,
            alphabet: None,
            international: None,
            validity: None,
            status_report: true,
            concat_iei: ConcatIei::EightBit,
        }
    }
}

impl SendOptions {
    fn submit_options(&self) -> SubmitOptions {
        let options = SubmitOptions {
            alphabet: self.alphabet,
            international: self.international,
            validity: self.validity,
            status_report: self.status_report,
            wide_reference: self.concat_iei == ConcatIei::SixteenBit,
            ..Default::default()
        };
        if self.flash {
            options.flash()
        } else {
            options
        }
    }
}

/// Outcome of deleting every part of an inbox message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteReport {
    pub deleted: Vec<u32>,
    pub failed: Vec<u32>,
}

/// A queued command that has not resolved yet
#[derive(Debug)]
pub struct PendingCommand {
    handle: CommandHandle,
    rx: oneshot::Receiver<CommandResult>,
}

impl PendingCommand {
    /// Cancel the command if it has not been written yet
    pub fn cancel(&self) {
        self.handle.cancel();
    }

    pub fn handle(&self) -> CommandHandle {
        self.handle.clone()
    }

    pub async fn wait(self) -> CommandResult {
        self.rx.await.unwrap_or_else(|_| Err(ModemError::ActorGone))
    }
}

/// Handle to a running modem
#[derive(Debug, Clone)]
pub struct Modem {
    cmd_tx: mpsc::Sender<ModemCommand>,
    events: EventSink,
    options: Arc<ModemOptions>,
}

impl Modem {
    /// Open a serial port and start the modem
    pub async fn open(
        settings: &SerialSettings,
        options: ModemOptions,
    ) -> Result<(Self, mpsc::Receiver<ModemEvent>), ModemError> {
        let connection = ModemConnection::open(&settings.port, settings.baud_rate)?;
        Self::start(connection, options).await
    }

    /// Start the modem on any byte stream, e.g. a `tokio::io::duplex` end
    pub async fn spawn<T>(
        io: T,
        options: ModemOptions,
    ) -> Result<(Self, mpsc::Receiver<ModemEvent>), ModemError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        Self::start(ModemConnection::new("virtual".to_string(), io), options).await
    }

    /// Start the actor, then initialize if `auto_init_on_open` is set
    pub async fn start<T>(
        connection: ModemConnection<T>,
        options: ModemOptions,
    ) -> Result<(Self, mpsc::Receiver<ModemEvent>), ModemError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (modem, event_rx) = Self::launch(connection, options);
        if modem.options.auto_init_on_open {
            modem.initialize().await?;
        }
        Ok((modem, event_rx))
    }

    /// Start the actor without initializing
    pub fn launch<T>(
        connection: ModemConnection<T>,
        options: ModemOptions,
    ) -> (Self, mpsc::Receiver<ModemEvent>)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        let (event_tx, event_rx) = mpsc::channel(1024);
        let events = EventSink::new(event_tx);
        let config = ActorConfig::from(&options);

        tokio::spawn(run_modem_actor(connection, cmd_rx, events.clone(), config));
        events.emit(ModemEvent::Open);

        let modem = Self {
            cmd_tx,
            events,
            options: Arc::new(options),
        };
        (modem, event_rx)
    }

    pub fn options(&self) -> &ModemOptions {
        &self.options
    }

    /// Whether the actor is still running
    pub fn is_open(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Stop the actor; pending commands fail with a transport error
    pub async fn close(&self) -> Result<(), ModemError> {
        let (tx, rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(ModemCommand::Shutdown { response: tx })
            .await
            .is_err()
        {
            return Ok(());
        }
        let _ = rx.await;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Command plumbing
    // -------------------------------------------------------------------------

    async fn submit(&self, item: QueueItem, priority: bool) -> Result<(), ModemError> {
        self.cmd_tx
            .send(ModemCommand::Enqueue { item, priority })
            .await
            .map_err(|_| ModemError::ActorGone)
    }

    /// Queue a command and return without waiting for it
    pub async fn queue(&self, spec: CommandSpec, priority: bool) -> Result<PendingCommand, ModemError> {
        let (command, handle, rx) = Command::new(spec);
        self.submit(command.into(), priority).await?;
        Ok(PendingCommand { handle, rx })
    }

    /// Queue a command and wait for its response lines
    pub async fn run(&self, spec: CommandSpec, priority: bool) -> CommandResult {
        self.queue(spec, priority).await?.wait().await
    }

    /// Run commands back to back with nothing interleaved
    pub async fn run_sequence(
        &self,
        steps: Vec<CommandSpec>,
        cancel_on_failure: bool,
        priority: bool,
    ) -> SequenceResult {
        let (sequence, _, rx) = CommandSequence::new(steps, cancel_on_failure);
        self.submit(sequence.into(), priority).await?;
        rx.await.unwrap_or_else(|_| Err(ModemError::ActorGone))
    }

    /// Send a raw command and return its response lines
    ///
    /// `timeout` defaults to the configured command timeout.
    pub async fn execute(&self, text: &str, timeout: Option<Duration>, priority: bool) -> CommandResult {
        let spec = CommandSpec::new(text)
            .timeout(timeout.unwrap_or_else(|| self.options.command_timeout()));
        self.run(spec, priority).await
    }

    fn spec(&self, text: impl Into<String>) -> CommandSpec {
        CommandSpec::new(text).timeout(self.options.command_timeout())
    }

    async fn simple(&self, text: impl Into<String>) -> Result<(), ModemError> {
        self.run(self.spec(text), false).await.map(|_| ())
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Bring the modem into PDU mode with notifications enabled
    pub async fn initialize(&self) -> Result<(), ModemError> {
        info!("Initializing modem");
        for text in ["AT", "ATZ", "ATE1"] {
            self.run(self.spec(text), true).await?;
        }

        let pin_state = self.run(self.spec("AT+CPIN?"), true).await?;
        if !parse_pin_ready(&pin_state)? {
            let pin = self.options.pin_code.as_deref().ok_or_else(|| {
                ModemError::ProtocolAssertion("SIM requires a PIN but none is configured".into())
            })?;
            debug!("Unlocking SIM");
            self.run(self.spec(format!("AT+CPIN={}", pin)), true).await?;
        }

        let mut commands = Vec::new();
        if !self.options.custom_init_command.is_empty() {
            commands.push(self.options.custom_init_command.clone());
        }
        commands.push("AT+CMGF=0".to_string());
        commands.push(self.options.cnmi_command.clone());
        commands.push("AT+CLIP=1".to_string());
        for text in commands {
            self.run(self.spec(text), true).await?;
        }

        info!("Modem initialized");
        self.events.emit(ModemEvent::Initialized);
        Ok(())
    }

    /// `AT`
    pub async fn check_modem(&self) -> Result<(), ModemError> {
        self.simple("AT").await
    }

    /// `ATZ`
    pub async fn reset(&self) -> Result<(), ModemError> {
        self.simple("ATZ").await
    }

    pub async fn set_echo(&self, enabled: bool) -> Result<(), ModemError> {
        self.simple(if enabled { "ATE1" } else { "ATE0" }).await
    }

    // -------------------------------------------------------------------------
    // SMS
    // -------------------------------------------------------------------------

    /// Send a text message, splitting it into parts as needed
    ///
    /// All parts go out in one sequence that stops at the first failure.
    /// Emits [`ModemEvent::SmsSent`] or [`ModemEvent::SmsSendFailed`] once.
    pub async fn send_sms(
        &self,
        number: &str,
        text: &str,
        options: &SendOptions,
    ) -> Result<SentSms, ModemError> {
        let encoded = encode_submit(number, text, &options.submit_options());
        self.send_parts(number, text.to_string(), options, encoded).await
    }

    /// Send raw 8-bit data, splitting it into parts as needed
    ///
    /// `options.alphabet` is ignored. The reported text is the data read as
    /// Latin-1, which is how the recipient decodes it.
    pub async fn send_binary(
        &self,
        number: &str,
        data: &[u8],
        options: &SendOptions,
    ) -> Result<SentSms, ModemError> {
        let encoded = encode_binary(number, data, &options.submit_options());
        self.send_parts(number, from_data8(data), options, encoded).await
    }

    async fn send_parts(
        &self,
        number: &str,
        text: String,
        options: &SendOptions,
        encoded: Result<Vec<Part>, PduError>,
    ) -> Result<SentSms, ModemError> {
        let mut sms = SentSms {
            recipient: number.to_string(),
            text,
            flash: options.flash,
            parts: Vec::new(),
        };

        let parts = match encoded {
            Ok(parts) => parts,
            Err(e) => {
                let error = ModemError::from(e);
                self.report_send_failure(sms, &error);
                return Err(error);
            }
        };
        sms.parts = parts.iter().map(|p| p.hex.clone()).collect();
        debug!("Sending SMS to {} in {} part(s)", number, parts.len());

        match self.run_sequence(submit_steps(&parts), true, false).await {
            Ok(_) => {
                info!("SMS sent to {}", number);
                self.events.emit(ModemEvent::SmsSent(sms.clone()));
                Ok(sms)
            }
            Err(error) => {
                self.report_send_failure(sms, &error);
                Err(error)
            }
        }
    }

    fn report_send_failure(&self, sms: SentSms, error: &ModemError) {
        warn!("Failed to send SMS to {}: {}", sms.recipient, error);
        self.events.emit(ModemEvent::SmsSendFailed {
            sms,
            error: error.to_string(),
        });
    }

    /// `AT+CMGR=<index>`
    pub async fn read_sms(&self, index: u32) -> Result<StoredSms, ModemError> {
        let lines = self.run(self.spec(format!("AT+CMGR={}", index)), false).await?;
        parse_read(index, &lines)
    }

    /// `AT+CMGL=4`: every stored message
    pub async fn list_sms(&self) -> Result<SmsListing, ModemError> {
        let lines = self.run(self.spec("AT+CMGL=4"), false).await?;
        let listing = parse_listing(&lines);
        if !listing.failed.is_empty() {
            warn!("{} stored message(s) could not be decoded", listing.failed.len());
        }
        Ok(listing)
    }

    /// Stored messages with concatenated parts merged
    pub async fn get_inbox(&self) -> Result<Vec<InboxMessage>, ModemError> {
        let listing = self.list_sms().await?;
        Ok(merge_inbox(listing.messages, self.options.enable_concatenation))
    }

    /// `AT+CMGD=<index>`
    pub async fn delete_sms(&self, index: u32) -> Result<(), ModemError> {
        self.simple(format!("AT+CMGD={}", index)).await
    }

    /// `AT+CMGD=1,4`: delete every stored message
    pub async fn delete_all_sms(&self) -> Result<(), ModemError> {
        self.simple("AT+CMGD=1,4").await
    }

    /// Delete every stored part of an inbox message, highest index first
    pub async fn delete_message(&self, message: &InboxMessage) -> DeleteReport {
        let mut indexes = message.indexes.clone();
        indexes.sort_unstable_by(|a, b| b.cmp(a));
        indexes.dedup();

        let mut report = DeleteReport::default();
        for index in indexes {
            match self.delete_sms(index).await {
                Ok(()) => report.deleted.push(index),
                Err(e) => {
                    warn!("Failed to delete message {}: {}", index, e);
                    report.failed.push(index);
                }
            }
        }
        report
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// `AT+CPMS="SM"`; emits [`ModemEvent::MemoryFull`] when storage is full
    pub async fn check_sim_memory(&self) -> Result<SimMemory, ModemError> {
        let spec = self
            .spec("AT+CPMS=\"SM\"")
            .terminator(Terminator::ReplyPrefix);
        let memory = parse_sim_memory(&self.run(spec, false).await?)?;
        if memory.is_full() {
            self.events.emit(ModemEvent::MemoryFull {
                used: memory.used,
                total: memory.total,
            });
        }
        Ok(memory)
    }

    /// `AT+CSQ`
    pub async fn signal_quality(&self) -> Result<Signal, ModemError> {
        let spec = self.spec("AT+CSQ").terminator(Terminator::ReplyPrefix);
        parse_signal(&self.run(spec, false).await?)
    }

    /// `AT+CGSN`: the IMEI
    pub async fn serial_number(&self) -> Result<String, ModemError> {
        parse_serial_number(&self.run(self.spec("AT+CGSN"), false).await?)
    }

    /// `AT+CNUM`
    pub async fn own_number(&self) -> Result<OwnNumber, ModemError> {
        parse_own_number(&self.run(self.spec("AT+CNUM"), false).await?)
    }

    /// Store the subscriber number in the `ON` phonebook
    pub async fn set_own_number(&self, number: &str, name: &str) -> Result<(), ModemError> {
        let steps = vec![
            self.spec("AT+CPBS=\"ON\""),
            self.spec(format!("AT+CPBW=1,\"{}\",129,\"{}\"", number, name)),
        ];
        self.run_sequence(steps, true, false).await.map(|_| ())
    }

    /// `AT+COPS?`
    pub async fn current_operator(&self) -> Result<Operator, ModemError> {
        parse_current_operator(&self.run(self.spec("AT+COPS?"), false).await?)
    }

    /// `AT+COPS=?`; the network scan can take up to a minute
    pub async fn available_operators(&self) -> Result<Vec<AvailableOperator>, ModemError> {
        let spec = CommandSpec::new("AT+COPS=?").timeout(OPERATOR_SCAN_TIMEOUT);
        parse_available_operators(&self.run(spec, false).await?)
    }

    /// `ATH`
    pub async fn hang_up_call(&self) -> Result<(), ModemError> {
        self.simple("ATH").await
    }

    /// Start a USSD session; the reply arrives as [`ModemEvent::IncomingUssd`]
    pub async fn send_ussd(&self, code: &str) -> Result<(), ModemError> {
        let spec = self
            .spec(format!("AT+CUSD=1,\"{}\",15", code))
            .terminator(Terminator::Prompt);
        self.run(spec, false).await.map(|_| ())
    }
}

/// The `AT+CMGS` prompt and payload for every part
fn submit_steps(parts: &[Part]) -> Vec<CommandSpec> {
    parts
        .iter()
        .flat_map(|part| {
            [
                CommandSpec::new(format!("AT+CMGS={}", part.tpdu_len))
                    .timeout(CMGS_PROMPT_WAIT)
                    .no_await(),
                CommandSpec::new(format!("{}\u{1A}", part.hex)).timeout(CMGS_PAYLOAD_TIMEOUT),
            ]
        })
        .collect()
}

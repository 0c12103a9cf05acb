//! GSM modem driver
//!
//! This crate drives a GSM modem over a serial link with AT commands:
//!
//! - **Executor**: one command in flight, priority and normal queues,
//!   timeouts and atomic multi-step sequences
//! - **Dispatcher**: unsolicited notifications (`+CMTI`, `+CLIP`, `+CUSD`,
//!   `^SMMEMFULL`) separated from command responses
//! - **Facade**: SMS send/receive in PDU mode and common queries
//!
//! # Architecture
//!
//! A single actor task owns the connection. Callers hold a [`Modem`] handle
//! that queues work through a channel; results come back on oneshot
//! channels and everything else is reported as a [`ModemEvent`].
//!
//! ```text
//! bytes -> LineFramer -> classify -> CommandExecutor -> caller
//!                           |               |
//!                           v               v
//!                       ModemEvent      CommandQueue -> write
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use modem_core::{Modem, ModemOptions, SendOptions, SerialSettings};
//!
//! let settings = SerialSettings::new("/dev/ttyUSB2");
//! let (modem, mut events) = Modem::open(&settings, ModemOptions::default()).await?;
//! modem.send_sms("+491701234567", "Hello", &SendOptions::default()).await?;
//! ```

pub mod actor;
pub mod command;
pub mod config;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod executor;
pub mod framer;
pub mod inbox;
pub mod modem;
pub mod parse;
pub mod queue;

pub use actor::{run_modem_actor, ActorConfig, ModemCommand};
pub use command::{
    Command, CommandHandle, CommandResult, CommandSequence, CommandSpec, QueueItem,
    SequenceResult, Terminator,
};
pub use config::{ExecutorConfig, ModemOptions, SerialSettings};
pub use connection::ModemConnection;
pub use error::ModemError;
pub use events::{EventSink, ModemEvent, SentSms};
pub use executor::{Action, CommandExecutor, ExecutorState};
pub use framer::LineFramer;
pub use inbox::{merge_inbox, InboxMessage};
pub use modem::{ConcatIei, DeleteReport, Modem, PendingCommand, SendOptions};
pub use parse::{
    is_pdu_line, AvailableOperator, Operator, OwnNumber, Signal, SimMemory, SmsListing,
    SmsStatus, StoredSms,
};

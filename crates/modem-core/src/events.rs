//! Unified event stream for the modem
//!
//! Unsolicited notifications, SMS outcomes and raw traffic are all emitted
//! through a single event channel, so a consumer sees them in the order the
//! actor observed them.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// An outgoing SMS together with the PDUs it was split into
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentSms {
    /// Destination number as given by the caller
    pub recipient: String,
    /// Message text
    pub text: String,
    /// Sent as a class 0 message
    pub flash: bool,
    /// Hex PDU of every part, in send order
    pub parts: Vec<String>,
}

/// Unified event enum for all modem activity
#[derive(Debug, Clone)]
pub enum ModemEvent {
    // -------------------------------------------------------------------------
    // Lifecycle events
    // -------------------------------------------------------------------------
    /// The transport is open and the actor is running
    Open,

    /// The actor has stopped
    Close,

    /// The initialization sequence completed
    Initialized,

    // -------------------------------------------------------------------------
    // Unsolicited notifications
    // -------------------------------------------------------------------------
    /// A message was stored on the SIM (`+CMTI`)
    NewSms {
        /// Storage index of the new message
        index: u32,
    },

    /// Caller line identification (`+CLIP`)
    IncomingCall {
        /// Calling number, or "unknown"
        number: String,
        /// Number type field as reported
        scheme: String,
    },

    /// USSD reply or network-initiated USSD (`+CUSD`)
    IncomingUssd {
        /// Decoded text
        text: String,
        /// Follow code as reported by the network
        follow_code: u8,
        /// Human-readable meaning of the follow code
        follow: String,
    },

    /// SIM message storage is full
    MemoryFull {
        /// Messages stored
        used: u32,
        /// Storage capacity
        total: u32,
    },

    // -------------------------------------------------------------------------
    // SMS outcomes
    // -------------------------------------------------------------------------
    /// Every part of an SMS was accepted by the modem
    SmsSent(SentSms),

    /// Sending an SMS failed
    SmsSendFailed {
        /// The message that failed
        sms: SentSms,
        /// Error message
        error: String,
    },

    // -------------------------------------------------------------------------
    // Traffic events (for traffic monitor)
    // -------------------------------------------------------------------------
    /// Data written to the modem
    WriteToModem {
        /// Text written, including the terminating `\r`
        data: String,
    },

    /// A line received from the modem
    DataReceived {
        /// Line without its terminator
        data: String,
    },

    /// A command finished with a terminal line
    CommandResponse {
        /// Buffered response lines
        lines: Vec<String>,
    },

    // -------------------------------------------------------------------------
    // Error events
    // -------------------------------------------------------------------------
    /// An error occurred outside of any caller's command
    Error {
        /// Source of the error (e.g., "Transport", "Inbox")
        source: String,
        /// Error message
        message: String,
    },
}

/// Sending half of the event channel
///
/// Events are offered with `try_send`. A consumer that stops draining the
/// channel loses events instead of stalling the actor.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<ModemEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<ModemEvent>) -> Self {
        Self { tx }
    }

    /// Emit an event, dropping it if the channel is full or closed
    pub fn emit(&self, event: ModemEvent) {
        if let Err(e) = self.tx.try_send(event) {
            match e {
                mpsc::error::TrySendError::Full(event) => {
                    debug!("Event channel full, dropping {:?}", event);
                }
                mpsc::error::TrySendError::Closed(_) => {}
            }
        }
    }
}

/// Meaning of a `+CUSD` follow code
pub fn ussd_follow_text(code: u8) -> &'static str {
    match code {
        0 => "no further action required",
        1 => "further action required",
        2 => "terminated by network",
        3 | 4 => "operation not supported",
        _ => "unknown",
    }
}

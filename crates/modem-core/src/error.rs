//! Error types for the modem driver

use sms_pdu::PduError;
use thiserror::Error;

/// Errors that can occur while driving a modem
///
/// Every command resolves with either its response lines or one of these;
/// nothing escapes the actor as a panic.
#[derive(Debug, Error)]
pub enum ModemError {
    /// The serial link failed or the modem was closed with the command pending
    #[error("transport error: {0}")]
    Transport(String),

    /// No terminal line arrived before the command's deadline
    #[error("command timed out: {command}")]
    CommandTimeout { command: String },

    /// The device answered with an error result code
    #[error("device returned an error: {}", lines.join(" | "))]
    Device { lines: Vec<String> },

    /// A PDU could not be encoded or decoded
    #[error("PDU error: {0}")]
    Pdu(#[from] PduError),

    /// The device answered, but not in the expected shape
    #[error("unexpected response: {0}")]
    ProtocolAssertion(String),

    /// The command was cancelled before it was written
    #[error("command cancelled")]
    Cancelled,

    /// A step of a fail-fast sequence failed and the rest were skipped
    #[error("sequence step {step} failed: {source}")]
    SequenceStep {
        step: usize,
        #[source]
        source: Box<ModemError>,
    },

    /// The actor task is no longer running
    #[error("modem actor is not running")]
    ActorGone,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModemError {
    /// The innermost error, looking through sequence steps
    pub fn root(&self) -> &ModemError {
        match self {
            ModemError::SequenceStep { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), ModemError::CommandTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_error_lists_lines() {
        let err = ModemError::Device {
            lines: vec!["+CMS ERROR: 500".into()],
        };
        assert_eq!(err.to_string(), "device returned an error: +CMS ERROR: 500");
    }

    #[test]
    fn test_root_unwraps_sequence_steps() {
        let err = ModemError::SequenceStep {
            step: 1,
            source: Box::new(ModemError::CommandTimeout {
                command: "AT".into(),
            }),
        };
        assert!(err.is_timeout());
        assert!(err.to_string().starts_with("sequence step 1 failed"));
    }
}

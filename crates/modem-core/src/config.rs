//! Modem and serial configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Behaviour of the modem driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemOptions {
    /// SIM PIN, sent when `AT+CPIN?` does not report READY
    pub pin_code: Option<String>,
    /// Delete each message from the SIM as soon as `+CMTI` reports it
    pub delete_sms_on_receive: bool,
    /// Merge concatenated parts in `get_inbox`
    pub enable_concatenation: bool,
    /// Extra command run during initialization
    pub custom_init_command: String,
    /// Run `initialize` when the modem is opened
    pub auto_init_on_open: bool,
    /// New message indication setup
    pub cnmi_command: String,
    /// Per-command timeout
    pub command_timeout_ms: u64,
    /// Absolute limit for any awaited command
    pub command_ceiling_ms: u64,
}

impl Default for ModemOptions {
    fn default() -> Self {
        Self {
            pin_code: None,
            delete_sms_on_receive: false,
            enable_concatenation: true,
            custom_init_command: "AT+CMEE=1;+CREG=2".to_string(),
            auto_init_on_open: true,
            cnmi_command: "AT+CNMI=2,1,0,2,1".to_string(),
            command_timeout_ms: 10_000,
            command_ceiling_ms: 180_000,
        }
    }
}

impl ModemOptions {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            ceiling: Duration::from_millis(self.command_ceiling_ms),
        }
    }
}

/// Serial port to open
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialSettings {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    9600
}

impl SerialSettings {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: default_baud_rate(),
        }
    }
}

/// Settings of the command executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// No awaited command stays in flight longer than
    /// `max(ceiling, command timeout)`, whatever the line activity
    pub ceiling: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            ceiling: Duration::from_secs(180),
        }
    }
}

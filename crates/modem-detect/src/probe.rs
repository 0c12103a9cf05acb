//! AT probing for modem detection
//!
//! A port holds a modem if it answers `AT` with `OK`. Once it does, the
//! prober asks for the manufacturer and model so the port list can show
//! something more useful than a device path.

use std::io;
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::error::DetectError;

/// Result of probing a serial port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResult {
    /// `AT+CGMI` reply
    pub manufacturer: Option<String>,
    /// `AT+CGMM` reply
    pub model: Option<String>,
    /// Raw reply to the initial `AT`
    pub id_data: Vec<u8>,
}

/// Configuration for probing
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Timeout for each probe command
    pub timeout: Duration,
    /// Delay between commands
    pub inter_probe_delay: Duration,
    /// Query manufacturer and model after a successful `AT`
    pub identify: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(500),
            inter_probe_delay: Duration::from_millis(50),
            identify: true,
        }
    }
}

/// Modem prober
pub struct ModemProber {
    config: ProbeConfig,
}

impl ModemProber {
    /// Create a new prober with default configuration
    pub fn new() -> Self {
        Self {
            config: ProbeConfig::default(),
        }
    }

    /// Create a prober with custom configuration
    pub fn with_config(config: ProbeConfig) -> Self {
        Self { config }
    }

    /// Probe a stream for a modem
    ///
    /// Returns `Ok(None)` when nothing answered `OK` in time.
    pub async fn probe<S>(&self, stream: &mut S) -> io::Result<Option<ProbeResult>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let Some((ok, id_data)) = self.exchange(stream, "AT").await? else {
            debug!("No modem detected");
            return Ok(None);
        };
        if !ok {
            debug!("Port answered AT with an error");
            return Ok(None);
        }

        let mut result = ProbeResult {
            manufacturer: None,
            model: None,
            id_data,
        };

        if self.config.identify {
            tokio::time::sleep(self.config.inter_probe_delay).await;
            result.manufacturer = self.query_field(stream, "AT+CGMI").await?;
            tokio::time::sleep(self.config.inter_probe_delay).await;
            result.model = self.query_field(stream, "AT+CGMM").await?;
        }

        info!(
            "Identified modem: {} {}",
            result.manufacturer.as_deref().unwrap_or("unknown"),
            result.model.as_deref().unwrap_or("")
        );
        Ok(Some(result))
    }

    /// Send a query and return its first informational line
    async fn query_field<S>(&self, stream: &mut S, command: &str) -> io::Result<Option<String>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        Ok(match self.exchange(stream, command).await? {
            Some((true, reply)) => first_info_line(&reply, command),
            _ => None,
        })
    }

    /// Write `command\r` and collect bytes until a final result code
    ///
    /// Returns `None` on timeout, otherwise whether the final code was `OK`
    /// together with everything read.
    async fn exchange<S>(&self, stream: &mut S, command: &str) -> io::Result<Option<(bool, Vec<u8>)>>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        trace!("Sending {} probe", command);
        stream.write_all(format!("{}\r", command).as_bytes()).await?;
        stream.flush().await?;

        let mut collected = Vec::new();
        let read_loop = async {
            let mut buf = [0u8; 128];
            loop {
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    return Ok::<_, io::Error>(None);
                }
                collected.extend_from_slice(&buf[..n]);
                if let Some(ok) = final_result(&collected) {
                    return Ok(Some(ok));
                }
            }
        };

        let outcome = timeout(self.config.timeout, read_loop).await;
        match outcome {
            Ok(Ok(Some(ok))) => {
                trace!("{} response: {:?}", command, String::from_utf8_lossy(&collected));
                Ok(Some((ok, collected)))
            }
            Ok(Ok(None)) => {
                trace!("{} probe: stream closed", command);
                Ok(None)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                trace!("{} probe timeout", command);
                Ok(None)
            }
        }
    }
}

impl Default for ModemProber {
    fn default() -> Self {
        Self::new()
    }
}

/// `Some(true)` once an `OK` line arrived, `Some(false)` for an error line
fn final_result(data: &[u8]) -> Option<bool> {
    let text = String::from_utf8_lossy(data);
    text.split(|c| c == '\r' || c == '\n')
        .map(str::trim)
        .find_map(|line| {
            if line.eq_ignore_ascii_case("OK") {
                Some(true)
            } else if line.to_ascii_uppercase().contains("ERROR") {
                Some(false)
            } else {
                None
            }
        })
}

/// First line that is neither the echo, blank, nor a result code
fn first_info_line(data: &[u8], command: &str) -> Option<String> {
    let text = String::from_utf8_lossy(data);
    text.split(|c| c == '\r' || c == '\n')
        .map(str::trim)
        .find(|line| !line.is_empty() && *line != command && !line.eq_ignore_ascii_case("OK"))
        .map(|line| line.to_string())
}

/// Probe a specific port at a given baud rate
///
/// This is a convenience function for manual probing from the command line.
pub async fn probe_port(
    port_name: &str,
    baud_rate: u32,
    config: ProbeConfig,
) -> Result<ProbeResult, DetectError> {
    use tokio_serial::SerialPortBuilderExt;

    debug!("Probing {} at {} baud", port_name, baud_rate);

    let mut stream = tokio_serial::new(port_name, baud_rate)
        .timeout(Duration::from_millis(100))
        .open_native_async()
        .map_err(|e| {
            warn!("Failed to open {}: {}", port_name, e);
            DetectError::OpenFailed {
                port: port_name.to_string(),
                reason: e.to_string(),
            }
        })?;

    // Give the port a moment to settle
    tokio::time::sleep(Duration::from_millis(50)).await;

    let prober = ModemProber::with_config(config);
    match prober.probe(&mut stream).await {
        Ok(Some(result)) => Ok(result),
        Ok(None) => Err(DetectError::Timeout {
            port: port_name.to_string(),
        }),
        Err(e) => Err(DetectError::IoError {
            port: port_name.to_string(),
            reason: e.to_string(),
        }),
    }
}

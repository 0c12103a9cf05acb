//! Transport for the modem actor
//!
//! Generic over the I/O type so the same actor drives a real serial port or
//! an in-memory stream. For tests and simulation use `DuplexStream` from
//! `tokio::io::duplex()`.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};

use crate::error::ModemError;

/// A byte stream to a modem
pub struct ModemConnection<T> {
    port_name: String,
    pub(crate) io: T,
    pub(crate) buffer: Vec<u8>,
}

impl ModemConnection<SerialStream> {
    /// Open a serial port
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, ModemError> {
        debug!("Opening {} at {} baud", port_name, baud_rate);
        let stream = tokio_serial::new(port_name, baud_rate)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| {
                warn!("Failed to open {}: {}", port_name, e);
                ModemError::Transport(format!("failed to open {}: {}", port_name, e))
            })?;

        Ok(Self::new(port_name.to_string(), stream))
    }
}

impl<T> ModemConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(name: String, io: T) -> Self {
        Self {
            port_name: name,
            io,
            buffer: vec![0u8; 1024],
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    /// Write data to the modem
    pub async fn write(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        self.io.write_all(data).await?;
        self.io.flush().await?;
        Ok(())
    }
}

//! Virtual modem actor task
//!
//! Owns a VirtualModem and serves it over an async stream. The task uses a
//! select! loop to:
//! - Read bytes written by the driver and feed them to the modem
//! - Apply test commands (incoming messages, injected lines, failures)
//! - Write every reply the modem produced back to the stream

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::modem::{StoredMessage, VirtualModem};

/// Commands that can be sent to a virtual modem task
#[derive(Debug)]
pub enum VirtualModemCommand {
    /// Deliver a DELIVER PDU, announced with `+CMTI`
    ReceiveSms(String),
    /// Emit an arbitrary unsolicited line
    Inject(String),
    SetSignalQuality(u8),
    /// Answer `ERROR` to commands starting with this prefix
    FailOn(String),
    /// Never answer commands starting with this prefix
    Ignore(String),
    /// Accept this many more `AT+CMGS` payloads
    LimitSubmits(usize),
    /// Report the modem's current state
    Query(oneshot::Sender<SimSnapshot>),
    Shutdown,
}

/// Observable state of a virtual modem
#[derive(Debug, Clone)]
pub struct SimSnapshot {
    /// PDUs accepted by `AT+CMGS`
    pub sent: Vec<String>,
    /// SIM storage as `(index, message)`
    pub stored: Vec<(u32, StoredMessage)>,
    pub echo: bool,
    pub pin_locked: bool,
}

impl SimSnapshot {
    fn of(modem: &VirtualModem) -> Self {
        Self {
            sent: modem.submitted().to_vec(),
            stored: modem
                .storage()
                .iter()
                .map(|(i, m)| (*i, m.clone()))
                .collect(),
            echo: modem.echo(),
            pin_locked: modem.is_pin_locked(),
        }
    }
}

/// Run the virtual modem actor task
///
/// Returns when the stream closes, on shutdown, or when the command channel
/// is dropped.
pub async fn run_virtual_modem_task<S>(
    mut stream: S,
    mut modem: VirtualModem,
    mut cmd_rx: mpsc::Receiver<VirtualModemCommand>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; 1024];
    info!("Starting virtual modem task");

    loop {
        tokio::select! {
            result = stream.read(&mut buf) => {
                match result {
                    Ok(0) => {
                        debug!("Virtual modem stream closed");
                        break;
                    }
                    Ok(n) => modem.feed(&buf[..n]),
                    Err(e) => {
                        warn!("Virtual modem stream error: {}", e);
                        return Err(e);
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    VirtualModemCommand::ReceiveSms(pdu) => {
                        let index = modem.receive(pdu);
                        debug!("Virtual modem stored incoming message at {:?}", index);
                    }
                    VirtualModemCommand::Inject(line) => modem.unsolicited(&line),
                    VirtualModemCommand::SetSignalQuality(q) => modem.set_signal_quality(q),
                    VirtualModemCommand::FailOn(prefix) => modem.fail_on(prefix),
                    VirtualModemCommand::Ignore(prefix) => modem.ignore(prefix),
                    VirtualModemCommand::LimitSubmits(count) => modem.limit_submits(count),
                    VirtualModemCommand::Query(reply) => {
                        let _ = reply.send(SimSnapshot::of(&modem));
                    }
                    VirtualModemCommand::Shutdown => {
                        info!("Virtual modem shutting down");
                        break;
                    }
                }
            }
        }

        while let Some(bytes) = modem.take_output() {
            stream.write_all(&bytes).await?;
        }
        stream.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    async fn read_until(stream: &mut tokio::io::DuplexStream, needle: &str) -> String {
        let mut out = Vec::new();
        let mut buf = [0u8; 256];
        while !String::from_utf8_lossy(&out).contains(needle) {
            let n = stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "stream closed before {:?}", needle);
            out.extend_from_slice(&buf[..n]);
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn test_task_answers_commands() {
        let (mut driver, device) = duplex(1024);
        let (_tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run_virtual_modem_task(device, VirtualModem::default(), rx));

        driver.write_all(b"AT+CSQ\r").await.unwrap();
        let out = read_until(&mut driver, "OK\r\n").await;
        assert!(out.contains("+CSQ: 23,99"));

        drop(driver);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_task_commands_and_snapshot() {
        let (mut driver, device) = duplex(1024);
        let (tx, rx) = mpsc::channel(8);
        let task = tokio::spawn(run_virtual_modem_task(device, VirtualModem::default(), rx));

        tx.send(VirtualModemCommand::Inject("RING".into())).await.unwrap();
        read_until(&mut driver, "RING").await;

        tx.send(VirtualModemCommand::ReceiveSms("00".into())).await.unwrap();
        read_until(&mut driver, "+CMTI: \"SM\",1").await;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(VirtualModemCommand::Query(reply_tx)).await.unwrap();
        let snapshot = reply_rx.await.unwrap();
        assert_eq!(snapshot.stored.len(), 1);
        assert!(snapshot.echo);

        tx.send(VirtualModemCommand::Shutdown).await.unwrap();
        task.await.unwrap().unwrap();
    }
}

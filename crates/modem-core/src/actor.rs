//! Modem actor
//!
//! This module provides the async task that owns the modem connection. All
//! command processing happens in this actor: callers queue commands through
//! a channel and await a oneshot reply, so the executor state is never
//! shared.
//!
//! # Architecture
//!
//! The actor selects over three sources:
//! - commands from callers (queue a command or sequence, shut down)
//! - bytes read from the connection
//! - the in-flight command's deadline
//!
//! Each of them is fed to the [`CommandExecutor`], and the actions it returns
//! (writes, events, storage checks) are carried out before the next select.
//!
//! # Example
//!
//! ```rust,ignore
//! use modem_core::actor::{run_modem_actor, ActorConfig, ModemCommand};
//! use modem_core::{EventSink, ModemConnection};
//! use tokio::sync::mpsc;
//!
//! let (cmd_tx, cmd_rx) = mpsc::channel(256);
//! let (event_tx, mut event_rx) = mpsc::channel(256);
//! let connection = ModemConnection::open("/dev/ttyUSB2", 9600)?;
//!
//! tokio::spawn(run_modem_actor(connection, cmd_rx, EventSink::new(event_tx), ActorConfig::default()));
//! ```

use std::collections::VecDeque;
use std::io::ErrorKind;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::command::{Command, CommandSpec, QueueItem, Terminator};
use crate::config::{ExecutorConfig, ModemOptions};
use crate::connection::ModemConnection;
use crate::error::ModemError;
use crate::events::{EventSink, ModemEvent};
use crate::executor::{Action, CommandExecutor};
use crate::parse::parse_sim_memory;

/// Commands sent to the modem actor
#[derive(Debug)]
pub enum ModemCommand {
    /// Queue a command or sequence
    Enqueue {
        /// The work to queue
        item: QueueItem,
        /// Run before every non-priority item
        priority: bool,
    },

    /// Stop the actor, failing everything still pending
    Shutdown {
        /// Signalled once the actor has stopped
        response: oneshot::Sender<()>,
    },
}

/// Settings the actor needs beyond the executor's
#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub executor: ExecutorConfig,
    /// Queue `AT+CMGD=<index>` for every `+CMTI`
    pub delete_sms_on_receive: bool,
    /// Timeout for commands the actor issues itself
    pub command_timeout: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self::from(&ModemOptions::default())
    }
}

impl From<&ModemOptions> for ActorConfig {
    fn from(options: &ModemOptions) -> Self {
        Self {
            executor: options.executor_config(),
            delete_sms_on_receive: options.delete_sms_on_receive,
            command_timeout: options.command_timeout(),
        }
    }
}

/// Run the modem actor
///
/// Returns when shut down, when every sender is dropped, or when the
/// connection fails. Pending commands then resolve with
/// [`ModemError::Transport`] and [`ModemEvent::Close`] is emitted.
pub async fn run_modem_actor<T>(
    mut connection: ModemConnection<T>,
    mut cmd_rx: mpsc::Receiver<ModemCommand>,
    events: EventSink,
    config: ActorConfig,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut executor = CommandExecutor::new(config.executor);
    let mut shutdown_reply = None;
    info!("Modem actor started on {}", connection.port_name());

    let reason = loop {
        let deadline = executor.deadline();
        let idle_wake = Instant::now() + Duration::from_secs(3600);

        let actions = tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break "command channel closed";
                };
                match cmd {
                    ModemCommand::Enqueue { item, priority } => {
                        executor.enqueue(item, priority, Instant::now())
                    }
                    ModemCommand::Shutdown { response } => {
                        info!("Shutdown requested for {}", connection.port_name());
                        shutdown_reply = Some(response);
                        break "modem closed";
                    }
                }
            }

            result = connection.io.read(&mut connection.buffer) => {
                match result {
                    Ok(0) => {
                        info!("Connection to {} closed by peer", connection.port_name());
                        events.emit(ModemEvent::Error {
                            source: "Transport".to_string(),
                            message: "connection closed".to_string(),
                        });
                        break "connection closed";
                    }
                    Ok(n) => executor.on_data(&connection.buffer[..n], Instant::now()),
                    Err(e) => {
                        // Serial ports report WouldBlock when no data is available
                        if e.kind() == ErrorKind::WouldBlock {
                            continue;
                        }
                        if e.kind() == ErrorKind::ConnectionAborted {
                            debug!("Virtual modem channel closed for {}", connection.port_name());
                            break "connection aborted";
                        }
                        warn!("Read error on {}: {}", connection.port_name(), e);
                        events.emit(ModemEvent::Error {
                            source: "Transport".to_string(),
                            message: format!("Read error: {}", e),
                        });
                        break "read error";
                    }
                }
            }

            _ = sleep_until(deadline.unwrap_or(idle_wake)), if deadline.is_some() => {
                executor.on_timer(Instant::now())
            }
        };

        perform(&mut connection, &mut executor, &events, &config, actions).await;
    };

    executor.close(reason);
    cmd_rx.close();
    while let Ok(cmd) = cmd_rx.try_recv() {
        match cmd {
            ModemCommand::Enqueue { item, .. } => {
                item.reject(ModemError::Transport(reason.to_string()));
            }
            ModemCommand::Shutdown { response } => {
                let _ = response.send(());
            }
        }
    }

    info!("Modem actor stopped on {} ({})", connection.port_name(), reason);
    events.emit(ModemEvent::Close);
    if let Some(response) = shutdown_reply {
        let _ = response.send(());
    }
}

/// Carry out executor actions in order, including those they cause
async fn perform<T>(
    connection: &mut ModemConnection<T>,
    executor: &mut CommandExecutor,
    events: &EventSink,
    config: &ActorConfig,
    actions: Vec<Action>,
) where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut pending: VecDeque<Action> = actions.into();
    while let Some(action) = pending.pop_front() {
        match action {
            Action::Write(data) => {
                if let Err(e) = connection.write(data.as_bytes()).await {
                    warn!("Write error on {}: {}", connection.port_name(), e);
                    let error = ModemError::Transport(format!("write failed: {}", e));
                    pending.extend(executor.fail_current(error, Instant::now()));
                }
            }
            Action::Emit(event) => {
                let delete_index = match &event {
                    ModemEvent::NewSms { index } if config.delete_sms_on_receive => Some(*index),
                    _ => None,
                };
                events.emit(event);
                if let Some(index) = delete_index {
                    pending.extend(queue_delete(executor, config, index));
                }
            }
            Action::CheckMemory => {
                pending.extend(queue_memory_check(executor, events, config));
            }
        }
    }
}

/// Delete a message the modem just announced
fn queue_delete(executor: &mut CommandExecutor, config: &ActorConfig, index: u32) -> Vec<Action> {
    let spec = CommandSpec::new(format!("AT+CMGD={}", index)).timeout(config.command_timeout);
    let (command, _, rx) = Command::new(spec);
    tokio::spawn(async move {
        match rx.await {
            Ok(Ok(_)) => debug!("Deleted received message {}", index),
            Ok(Err(e)) => warn!("Failed to delete received message {}: {}", index, e),
            Err(_) => {}
        }
    });
    executor.enqueue(command.into(), true, Instant::now())
}

/// Query storage after `^SMMEMFULL` and report it if it is really full
fn queue_memory_check(
    executor: &mut CommandExecutor,
    events: &EventSink,
    config: &ActorConfig,
) -> Vec<Action> {
    let spec = CommandSpec::new("AT+CPMS=\"SM\"")
        .timeout(config.command_timeout)
        .terminator(Terminator::ReplyPrefix);
    let (command, _, rx) = Command::new(spec);
    let events = events.clone();
    tokio::spawn(async move {
        let lines = match rx.await {
            Ok(Ok(lines)) => lines,
            Ok(Err(e)) => {
                warn!("Storage check failed: {}", e);
                return;
            }
            Err(_) => return,
        };
        match parse_sim_memory(&lines) {
            Ok(memory) if memory.is_full() => events.emit(ModemEvent::MemoryFull {
                used: memory.used,
                total: memory.total,
            }),
            Ok(memory) => debug!("Storage at {}/{}", memory.used, memory.total),
            Err(e) => warn!("Unexpected storage reply: {}", e),
        }
    });
    executor.enqueue(command.into(), true, Instant::now())
}

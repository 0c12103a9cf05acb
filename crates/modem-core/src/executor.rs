//! Command executor state machine
//!
//! The executor owns the queue, the line framer and the single in-flight
//! command. It performs no I/O itself: every entry point takes the current
//! time and returns the [`Action`]s the driver must carry out, in order. This
//! keeps the protocol logic synchronous and testable without a transport; the
//! actor in [`crate::actor`] supplies bytes, timer expiries and writes.
//!
//! # Lifecycle of a command
//!
//! 1. Dequeued when nothing is in flight (priority queue first). Cancelled
//!    commands resolve with [`ModemError::Cancelled`] and are never written.
//! 2. Written as `"<text>\r"`; the state is [`ExecutorState::AwaitingEcho`].
//! 3. Echo and response fragments move it to [`ExecutorState::Collecting`]
//!    and re-arm the timeout. Unsolicited lines become events instead.
//! 4. A terminal line, the timeout or the ceiling resolves the caller and
//!    the next unit is dispatched.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::command::{
    CommandResult, CommandSpec, QueueItem, SequenceResult, Terminal, Terminator,
};
use crate::config::ExecutorConfig;
use crate::dispatch::{classify, Classified};
use crate::error::ModemError;
use crate::events::{ussd_follow_text, ModemEvent};
use crate::framer::LineFramer;
use crate::queue::CommandQueue;

/// Work for the driver, produced by the executor
#[derive(Debug, Clone)]
pub enum Action {
    /// Write this text to the transport
    Write(String),
    /// Emit this event
    Emit(ModemEvent),
    /// `^SMMEMFULL` was received; storage should be queried
    CheckMemory,
}

/// Progress of the in-flight command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorState {
    Idle,
    AwaitingEcho,
    Collecting,
}

enum Owner {
    Single(oneshot::Sender<CommandResult>),
    Sequence(SequenceRun),
}

impl Owner {
    fn reject(self, error: ModemError) {
        match self {
            Owner::Single(tx) => {
                let _ = tx.send(Err(error));
            }
            Owner::Sequence(run) => {
                let _ = run.responder.send(Err(error));
            }
        }
    }
}

struct SequenceRun {
    remaining: VecDeque<CommandSpec>,
    step: usize,
    cancel_on_failure: bool,
    results: Vec<CommandResult>,
    responder: oneshot::Sender<SequenceResult>,
}

struct InFlight {
    spec: CommandSpec,
    owner: Owner,
    started: Instant,
    last_activity: Instant,
    collecting: bool,
    buffer: Vec<String>,
}

enum Outcome {
    Response,
    DeviceError,
    Elapsed,
    TimedOut,
    Failed(ModemError),
}

/// Written commands remembered for matching late echoes
const RECENT_WRITES: usize = 4;

/// Serializes commands onto the modem and matches responses to them
pub struct CommandExecutor {
    config: ExecutorConfig,
    queue: CommandQueue,
    framer: LineFramer,
    current: Option<InFlight>,
    /// A reply-prefix command resolved before its trailing `OK` arrived
    swallow_ok: bool,
    /// Texts of the last commands written, newest last
    recent: Vec<String>,
}

impl CommandExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            queue: CommandQueue::new(),
            framer: LineFramer::new(),
            current: None,
            swallow_ok: false,
            recent: Vec::with_capacity(RECENT_WRITES),
        }
    }

    pub fn state(&self) -> ExecutorState {
        match &self.current {
            None => ExecutorState::Idle,
            Some(c) if c.collecting => ExecutorState::Collecting,
            Some(_) => ExecutorState::AwaitingEcho,
        }
    }

    /// Text of the command currently written to the modem
    pub fn in_flight(&self) -> Option<&str> {
        self.current.as_ref().map(|c| c.spec.text.as_str())
    }

    /// Number of queued units, not counting the one in flight
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Queue a command or sequence and dispatch it if the modem is idle
    pub fn enqueue(&mut self, item: QueueItem, priority: bool, now: Instant) -> Vec<Action> {
        self.queue.push(item, priority);
        let mut actions = Vec::new();
        self.dispatch(now, &mut actions);
        actions
    }

    /// When the in-flight command times out, if anything is in flight
    pub fn deadline(&self) -> Option<Instant> {
        let current = self.current.as_ref()?;
        let timeout = current.spec.timeout;
        if !current.spec.await_response {
            return Some(current.started + timeout.unwrap_or(Duration::ZERO));
        }
        let ceiling = current.started + self.config.ceiling.max(timeout.unwrap_or_default());
        Some(match timeout {
            Some(t) => (current.last_activity + t).min(ceiling),
            None => ceiling,
        })
    }

    /// Process bytes read from the transport
    pub fn on_data(&mut self, data: &[u8], now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        for line in self.framer.feed(data) {
            trace!("Received line {:?}", line);
            actions.push(Action::Emit(ModemEvent::DataReceived { data: line.clone() }));
            self.handle_line(&line, now, &mut actions);
        }

        let waiting_for_prompt = self.current.as_ref().is_some_and(|c| {
            c.spec.await_response && c.spec.terminator == Terminator::Prompt
        });
        if waiting_for_prompt && self.framer.take_prompt() {
            self.finish(Outcome::Response, now, &mut actions);
        }
        actions
    }

    /// Resolve the in-flight command if its deadline has passed
    pub fn on_timer(&mut self, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        let expired = self.deadline().is_some_and(|deadline| now >= deadline);
        if expired {
            let awaited = self
                .current
                .as_ref()
                .is_some_and(|c| c.spec.await_response);
            let outcome = if awaited {
                Outcome::TimedOut
            } else {
                Outcome::Elapsed
            };
            self.finish(outcome, now, &mut actions);
        }
        actions
    }

    /// Fail the in-flight command, e.g. because writing it failed
    pub fn fail_current(&mut self, error: ModemError, now: Instant) -> Vec<Action> {
        let mut actions = Vec::new();
        self.finish(Outcome::Failed(error), now, &mut actions);
        actions
    }

    /// Resolve everything in flight or queued with a transport error
    pub fn close(&mut self, reason: &str) {
        if let Some(current) = self.current.take() {
            current.owner.reject(ModemError::Transport(reason.to_string()));
        }
        for item in self.queue.drain() {
            item.reject(ModemError::Transport(reason.to_string()));
        }
        self.framer.clear();
        self.swallow_ok = false;
    }

    fn dispatch(&mut self, now: Instant, actions: &mut Vec<Action>) {
        while self.current.is_none() {
            let Some(item) = self.queue.pop() else {
                break;
            };
            if item.is_cancelled() {
                debug!("Skipping cancelled command");
                item.reject(ModemError::Cancelled);
                continue;
            }
            match item {
                QueueItem::Command(command) => {
                    let (spec, responder) = command.into_responder();
                    self.start(spec, Owner::Single(responder), now, actions);
                }
                QueueItem::Sequence(sequence) => {
                    let (steps, cancel_on_failure, responder) = sequence.into_parts();
                    let mut remaining: VecDeque<_> = steps.into();
                    let Some(first) = remaining.pop_front() else {
                        let _ = responder.send(Ok(Vec::new()));
                        continue;
                    };
                    let run = SequenceRun {
                        remaining,
                        step: 0,
                        cancel_on_failure,
                        results: Vec::new(),
                        responder,
                    };
                    self.start(first, Owner::Sequence(run), now, actions);
                }
            }
        }
    }

    fn start(&mut self, spec: CommandSpec, owner: Owner, now: Instant, actions: &mut Vec<Action>) {
        debug!("Writing {:?}", spec.text);
        let data = format!("{}\r", spec.text);
        actions.push(Action::Emit(ModemEvent::WriteToModem { data: data.clone() }));
        actions.push(Action::Write(data));
        if self.recent.len() == RECENT_WRITES {
            self.recent.remove(0);
        }
        self.recent.push(spec.text.clone());
        self.current = Some(InFlight {
            spec,
            owner,
            started: now,
            last_activity: now,
            collecting: false,
            buffer: Vec::new(),
        });
    }

    fn handle_line(&mut self, line: &str, now: Instant, actions: &mut Vec<Action>) {
        let classified = classify(line, self.in_flight(), &self.recent);
        match classified {
            Classified::Blank => {}
            Classified::Echo => {
                self.swallow_ok = false;
                if let Some(current) = self.current.as_mut() {
                    current.collecting = true;
                    current.last_activity = now;
                }
            }
            Classified::Prompt => {
                let waiting = self.current.as_ref().is_some_and(|c| {
                    c.spec.await_response && c.spec.terminator == Terminator::Prompt
                });
                if waiting {
                    self.finish(Outcome::Response, now, actions);
                }
            }
            Classified::NewSms { index } => {
                debug!("New SMS at index {}", index);
                actions.push(Action::Emit(ModemEvent::NewSms { index }));
            }
            Classified::IncomingCall { number, scheme } => {
                actions.push(Action::Emit(ModemEvent::IncomingCall { number, scheme }));
            }
            Classified::MemoryFull => {
                debug!("Modem reports full message storage");
                actions.push(Action::CheckMemory);
            }
            Classified::Ussd { follow_code, text } => {
                actions.push(Action::Emit(ModemEvent::IncomingUssd {
                    text,
                    follow_code,
                    follow: ussd_follow_text(follow_code).to_string(),
                }));
            }
            Classified::Fragment(text) => {
                if self.take_swallowed_ok(&text) {
                    return;
                }
                self.on_fragment(text, now, actions);
            }
            Classified::Dropped(text) => {
                if !self.take_swallowed_ok(&text) {
                    debug!("Dropping unsolicited line {:?}", text);
                }
            }
        }
    }

    /// Consume the `OK` trailing a reply that already resolved its command
    fn take_swallowed_ok(&mut self, text: &str) -> bool {
        std::mem::take(&mut self.swallow_ok) && text.eq_ignore_ascii_case("OK")
    }

    fn on_fragment(&mut self, text: String, now: Instant, actions: &mut Vec<Action>) {
        let Some(current) = self.current.as_mut() else {
            return;
        };
        current.collecting = true;
        current.last_activity = now;
        if !current.spec.await_response {
            trace!("Discarding {:?} for unawaited command", text);
            return;
        }

        match current.spec.terminator.evaluate(&text, &current.spec.text) {
            None => current.buffer.push(text),
            Some(Terminal::Success) => self.finish(Outcome::Response, now, actions),
            Some(Terminal::Reply) => {
                current.buffer.push(text);
                self.swallow_ok = true;
                self.finish(Outcome::Response, now, actions);
            }
            Some(Terminal::Failure) => {
                current.buffer.push(text);
                self.finish(Outcome::DeviceError, now, actions);
            }
        }
    }

    fn finish(&mut self, outcome: Outcome, now: Instant, actions: &mut Vec<Action>) {
        let Some(InFlight {
            spec, owner, buffer, ..
        }) = self.current.take()
        else {
            return;
        };

        let result = match outcome {
            Outcome::Response => {
                debug!("{} -> OK ({} lines)", spec.text, buffer.len());
                actions.push(Action::Emit(ModemEvent::CommandResponse {
                    lines: buffer.clone(),
                }));
                Ok(buffer)
            }
            Outcome::DeviceError => {
                debug!("{} -> {:?}", spec.text, buffer.last());
                actions.push(Action::Emit(ModemEvent::CommandResponse {
                    lines: buffer.clone(),
                }));
                Err(ModemError::Device { lines: buffer })
            }
            Outcome::Elapsed => Ok(Vec::new()),
            Outcome::TimedOut => {
                warn!("Command timed out: {}", spec.text);
                Err(ModemError::CommandTimeout { command: spec.text })
            }
            Outcome::Failed(error) => {
                warn!("Command failed: {}: {}", spec.text, error);
                Err(error)
            }
        };

        match owner {
            Owner::Single(tx) => {
                let _ = tx.send(result);
            }
            Owner::Sequence(mut run) => match result {
                Err(error) if run.cancel_on_failure => {
                    debug!(
                        "Sequence stopped at step {}, skipping {} more",
                        run.step,
                        run.remaining.len()
                    );
                    let _ = run.responder.send(Err(ModemError::SequenceStep {
                        step: run.step,
                        source: Box::new(error),
                    }));
                }
                result => {
                    run.results.push(result);
                    match run.remaining.pop_front() {
                        Some(next) => {
                            run.step += 1;
                            self.start(next, Owner::Sequence(run), now, actions);
                        }
                        None => {
                            let _ = run.responder.send(Ok(run.results));
                        }
                    }
                }
            },
        }

        self.dispatch(now, actions);
    }
}

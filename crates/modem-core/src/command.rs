//! Commands, sequences and how their responses end
//!
//! A [`Command`] is one line written to the modem. A [`CommandSequence`] is an
//! ordered group of commands that runs without any other command interleaved,
//! such as the `AT+CMGS` prompt followed by its PDU payload.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::ModemError;

/// Response lines of a command, or why it failed
pub type CommandResult = Result<Vec<String>, ModemError>;

/// Result of every step of a sequence
pub type SequenceResult = Result<Vec<CommandResult>, ModemError>;

/// How the end of a command's response is recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Terminator {
    /// `OK` or any line containing `ERROR`
    #[default]
    Final,
    /// As `Final`, or the `>` input prompt
    Prompt,
    /// As `Final`, or the first line starting with the command's reply verb
    ReplyPrefix,
}

/// A line that ends the in-flight command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// `OK` or the prompt; not part of the response
    Success,
    /// The reply line itself; kept in the response
    Reply,
    /// An error line; kept in the response
    Failure,
}

impl Terminator {
    /// Decide whether `line` ends the response to `command`
    pub fn evaluate(self, line: &str, command: &str) -> Option<Terminal> {
        let line = line.trim();
        if line.to_ascii_uppercase().contains("ERROR") {
            return Some(Terminal::Failure);
        }
        if line.eq_ignore_ascii_case("OK") {
            return Some(Terminal::Success);
        }
        match self {
            Terminator::Final => None,
            Terminator::Prompt => (line == ">").then_some(Terminal::Success),
            Terminator::ReplyPrefix => {
                let verb = reply_verb(command)?;
                line.get(..verb.len())
                    .is_some_and(|head| head.eq_ignore_ascii_case(&verb))
                    .then_some(Terminal::Reply)
            }
        }
    }
}

/// The prefix a command's information reply starts with
///
/// `AT+CSQ` answers with `+CSQ`, `AT+CPMS="SM"` with `+CPMS`. Basic commands
/// without a `+` verb have none.
pub fn reply_verb(command: &str) -> Option<String> {
    let command = command.trim();
    if !command.get(..2)?.eq_ignore_ascii_case("AT") {
        return None;
    }
    let verb: String = command[2..]
        .chars()
        .take_while(|c| !matches!(c, '=' | '?' | ';' | ' '))
        .collect();
    let first = verb.chars().next()?;
    (matches!(first, '+' | '^' | '$' | '*') && verb.len() > 1).then(|| verb.to_ascii_uppercase())
}

/// What to write and how to wait for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Command text, written followed by `\r`
    pub text: String,
    /// Per-command timeout; `None` waits up to the executor ceiling
    pub timeout: Option<Duration>,
    /// Collect a response; when false the command resolves with no lines
    /// once its timeout elapses
    pub await_response: bool,
    pub terminator: Terminator,
}

impl CommandSpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            timeout: None,
            await_response: true,
            terminator: Terminator::Final,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn no_await(mut self) -> Self {
        self.await_response = false;
        self
    }

    pub fn terminator(mut self, terminator: Terminator) -> Self {
        self.terminator = terminator;
        self
    }
}

/// Cancels a queued command or sequence
///
/// Cancellation only takes effect before the command is written.
#[derive(Debug, Clone)]
pub struct CommandHandle {
    cancelled: Arc<AtomicBool>,
}

impl CommandHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// A single queued command
#[derive(Debug)]
pub struct Command {
    pub spec: CommandSpec,
    cancelled: Arc<AtomicBool>,
    responder: oneshot::Sender<CommandResult>,
}

impl Command {
    pub fn new(spec: CommandSpec) -> (Self, CommandHandle, oneshot::Receiver<CommandResult>) {
        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = CommandHandle {
            cancelled: cancelled.clone(),
        };
        let command = Self {
            spec,
            cancelled,
            responder: tx,
        };
        (command, handle, rx)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn into_responder(self) -> (CommandSpec, oneshot::Sender<CommandResult>) {
        (self.spec, self.responder)
    }
}

/// Commands that run back to back with nothing interleaved
#[derive(Debug)]
pub struct CommandSequence {
    pub steps: Vec<CommandSpec>,
    /// Stop at the first failing step; the sequence then resolves with that
    /// step's error wrapped in [`ModemError::SequenceStep`]
    pub cancel_on_failure: bool,
    cancelled: Arc<AtomicBool>,
    responder: oneshot::Sender<SequenceResult>,
}

impl CommandSequence {
    pub fn new(
        steps: Vec<CommandSpec>,
        cancel_on_failure: bool,
    ) -> (Self, CommandHandle, oneshot::Receiver<SequenceResult>) {
        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let handle = CommandHandle {
            cancelled: cancelled.clone(),
        };
        let sequence = Self {
            steps,
            cancel_on_failure,
            cancelled,
            responder: tx,
        };
        (sequence, handle, rx)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub(crate) fn into_parts(self) -> (Vec<CommandSpec>, bool, oneshot::Sender<SequenceResult>) {
        (self.steps, self.cancel_on_failure, self.responder)
    }
}

/// A unit of work in the command queue
#[derive(Debug)]
pub enum QueueItem {
    Command(Command),
    Sequence(CommandSequence),
}

impl QueueItem {
    pub fn is_cancelled(&self) -> bool {
        match self {
            QueueItem::Command(c) => c.is_cancelled(),
            QueueItem::Sequence(s) => s.is_cancelled(),
        }
    }

    /// Resolve without running, e.g. when cancelled or the modem closed
    pub fn reject(self, error: ModemError) {
        match self {
            QueueItem::Command(c) => {
                let _ = c.responder.send(Err(error));
            }
            QueueItem::Sequence(s) => {
                let _ = s.responder.send(Err(error));
            }
        }
    }
}

impl From<Command> for QueueItem {
    fn from(command: Command) -> Self {
        QueueItem::Command(command)
    }
}

impl From<CommandSequence> for QueueItem {
    fn from(sequence: CommandSequence) -> Self {
        QueueItem::Sequence(sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_verb() {
        assert_eq!(reply_verb("AT+CSQ").as_deref(), Some("+CSQ"));
        assert_eq!(reply_verb("at+cpms=\"SM\"").as_deref(), Some("+CPMS"));
        assert_eq!(reply_verb("AT+COPS?").as_deref(), Some("+COPS"));
        assert_eq!(reply_verb("AT^SYSINFO").as_deref(), Some("^SYSINFO"));
        assert_eq!(reply_verb("ATZ"), None);
        assert_eq!(reply_verb("AT"), None);
        assert_eq!(reply_verb("0011000B91"), None);
    }

    #[test]
    fn test_final_terminator() {
        let t = Terminator::Final;
        assert_eq!(t.evaluate("OK", "AT"), Some(Terminal::Success));
        assert_eq!(t.evaluate("ok", "AT"), Some(Terminal::Success));
        assert_eq!(t.evaluate("ERROR", "AT"), Some(Terminal::Failure));
        assert_eq!(t.evaluate("+CME ERROR: 10", "AT"), Some(Terminal::Failure));
        assert_eq!(t.evaluate("+CSQ: 23,99", "AT+CSQ"), None);
        assert_eq!(t.evaluate(">", "AT+CMGS=18"), None);
    }

    #[test]
    fn test_error_wins_over_reply() {
        let t = Terminator::ReplyPrefix;
        assert_eq!(t.evaluate("+CPMS ERROR", "AT+CPMS?"), Some(Terminal::Failure));
    }

    #[test]
    fn test_prompt_and_reply_prefix() {
        assert_eq!(
            Terminator::Prompt.evaluate("> ", "AT+CUSD=1"),
            Some(Terminal::Success)
        );
        assert_eq!(
            Terminator::ReplyPrefix.evaluate("+CSQ: 23,99", "AT+CSQ"),
            Some(Terminal::Reply)
        );
        assert_eq!(Terminator::ReplyPrefix.evaluate("+CMTI: \"SM\",1", "AT+CSQ"), None);
        assert_eq!(Terminator::ReplyPrefix.evaluate("something", "ATZ"), None);
    }

    #[test]
    fn test_cancel_handle() {
        let (command, handle, _rx) = Command::new(CommandSpec::new("AT"));
        assert!(!command.is_cancelled());
        handle.cancel();
        assert!(command.is_cancelled());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_reject_resolves_sequence() {
        let (sequence, _handle, rx) = CommandSequence::new(vec![CommandSpec::new("AT")], true);
        QueueItem::from(sequence).reject(ModemError::Cancelled);
        assert!(matches!(rx.await, Ok(Err(ModemError::Cancelled))));
    }
}

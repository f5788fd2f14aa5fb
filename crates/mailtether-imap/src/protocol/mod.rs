//! Sans-I/O protocol engine.
//!
//! [`Protocol`] holds everything about an IMAP conversation except the
//! socket: the tag generator, the in-flight command queue, bytes waiting
//! to be written, the negotiated capabilities and the session state. The
//! connection layer feeds it complete response units and writes out
//! whatever [`Protocol::poll_transmit`] yields, which keeps the engine
//! testable without a server.
//!
//! ```
//! use mailtether_imap::command::Command;
//! use mailtether_imap::protocol::{Protocol, ProtocolEvent};
//!
//! let mut protocol = Protocol::default();
//! let tag = protocol.enqueue(Command::Capability)?;
//!
//! let transmit = protocol.poll_transmit().unwrap();
//! assert_eq!(transmit.data, format!("{tag} CAPABILITY\r\n").into_bytes());
//!
//! let event = protocol.receive(format!("{tag} OK done\r\n").as_bytes())?;
//! assert!(matches!(event, ProtocolEvent::Completed(_)));
//! # Ok::<(), mailtether_imap::Error>(())
//! ```

mod state;

use std::collections::VecDeque;
use std::fmt;

use tracing::{debug, trace, warn};

pub use state::{SelectedMailbox, SessionState};

use crate::command::{Command, CommandOutcome, CommandQueue, QueuedCommand, TagGenerator};
use crate::error::{Error, Result};
use crate::parser::{Response, ResponseParser, UntaggedResponse};
use crate::types::{CapabilitySet, ResponseCode, Status};

/// Longest command line the engine will put on the wire. Longer lines
/// must be reformulated by the caller, typically by splitting the
/// message set across several commands.
pub const DEFAULT_MAX_COMMAND_LEN: usize = 8192;

/// Consecutive unusable responses tolerated before the connection is
/// declared poisoned.
pub const DEFAULT_VIOLATION_LIMIT: u32 = 3;

/// Bytes ready to be written to the server, one line or literal payload
/// per entry, terminators included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmit {
    /// Raw bytes to write.
    pub data: Vec<u8>,
}

impl Transmit {
    fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl AsRef<[u8]> for Transmit {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

/// What one response unit meant to the engine.
#[derive(Debug)]
pub enum ProtocolEvent {
    /// A tagged completion resolved an in-flight command.
    Completed(CommandOutcome),
    /// Untagged data. The caller applies it to its mailbox state, then
    /// hands it back through [`Protocol::absorb`] so it also rides along
    /// with the command being answered.
    Untagged(UntaggedResponse),
    /// The server granted a continuation and the waiting payload was
    /// queued for transmission.
    ContinuationSent,
    /// The server accepted IDLE. Unsolicited data may now arrive at any
    /// time until [`Protocol::done`] ends it.
    IdleStarted,
    /// The unit was unusable or answered nothing that was asked. It was
    /// logged and dropped.
    Ignored,
}

/// Pure IMAP conversation state, no I/O.
#[derive(Debug)]
pub struct Protocol {
    state: SessionState,
    tags: TagGenerator,
    queue: CommandQueue,
    outbound: VecDeque<Transmit>,
    capabilities: CapabilitySet,
    /// Tag of the open IDLE command, set once the server grants it.
    idle_tag: Option<String>,
    max_command_len: usize,
    violation_limit: u32,
    /// Consecutive unusable responses; any usable one resets it.
    violations: u32,
}

impl Default for Protocol {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_COMMAND_LEN, DEFAULT_VIOLATION_LIMIT)
    }
}

impl Protocol {
    /// Creates an engine with explicit wire limits.
    #[must_use]
    pub fn new(max_command_len: usize, violation_limit: u32) -> Self {
        Self {
            state: SessionState::Disconnected,
            tags: TagGenerator::default(),
            queue: CommandQueue::new(),
            outbound: VecDeque::new(),
            capabilities: CapabilitySet::new(),
            idle_tag: None,
            max_command_len,
            violation_limit: violation_limit.max(1),
            violations: 0,
        }
    }

    /// Current session state.
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Capabilities the server has advertised on this connection.
    #[must_use]
    pub const fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Whether an IDLE is open.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.idle_tag.is_some()
    }

    /// Number of commands awaiting completion.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.in_flight()
    }

    /// Whether any command is awaiting completion.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Records the server greeting, which arrives before any command.
    pub fn greeted(&mut self, status: Status) -> Result<()> {
        match status {
            Status::Ok => {
                self.state = SessionState::Connected;
                Ok(())
            }
            Status::PreAuth => {
                self.state = SessionState::Authenticated;
                Ok(())
            }
            Status::Bye => Err(Error::Bye("server refused the connection".to_string())),
            Status::No | Status::Bad => {
                Err(Error::Protocol(format!("unexpected {status} greeting")))
            }
        }
    }

    /// Queues a command, returning its tag.
    ///
    /// The serialized line is checked against the wire limit before
    /// anything is sent; an oversized command is rejected whole rather
    /// than truncated or split. Tags wrap, so a freshly issued tag that
    /// is somehow still in flight is skipped.
    pub fn enqueue(&mut self, command: Command) -> Result<String> {
        if matches!(command, Command::Done) {
            return Err(Error::InvalidState(
                "DONE is sent through Protocol::done".to_string(),
            ));
        }
        let mut tag = self.tags.next();
        while self.queue.contains(&tag) {
            tag = self.tags.next();
        }
        let line = command.serialize(&tag);
        if line.len() > self.max_command_len {
            return Err(Error::CommandTooLong {
                size: line.len(),
                limit: self.max_command_len,
            });
        }
        trace!(%tag, command = command.name(), bytes = line.len(), "queueing command");
        self.outbound.push_back(Transmit::new(line));
        self.queue.push(QueuedCommand::new(tag.clone(), command));
        Ok(tag)
    }

    /// Ends an open IDLE. The tagged completion for the original IDLE
    /// command follows on the wire.
    pub fn done(&mut self) -> Result<()> {
        if self.idle_tag.is_none() {
            return Err(Error::InvalidState("DONE without an open IDLE".to_string()));
        }
        self.outbound
            .push_back(Transmit::new(Command::Done.serialize("")));
        Ok(())
    }

    /// The next chunk of bytes to write, if any.
    pub fn poll_transmit(&mut self) -> Option<Transmit> {
        self.outbound.pop_front()
    }

    /// Interprets one complete response unit.
    ///
    /// Individually unusable units are tolerated and reported as
    /// [`ProtocolEvent::Ignored`]; once they recur past the configured
    /// limit without a usable unit in between, the stream is assumed to
    /// be desynchronized and an error poisons the connection.
    pub fn receive(&mut self, unit: &[u8]) -> Result<ProtocolEvent> {
        let response = match ResponseParser::parse(unit) {
            Ok(response) => response,
            Err(err) => return self.violation(format_args!("unparseable response: {err}")),
        };
        match response {
            Response::Tagged {
                tag,
                status,
                code,
                text,
            } => self.complete(&tag, status, code, text),
            Response::Untagged(row) => Ok(self.observe(row)),
            Response::Continuation { text } => self.grant(text.as_deref()),
        }
    }

    /// Files an untagged row with the oldest in-flight command, after
    /// the caller has applied it to its own mailbox state.
    pub fn absorb(&mut self, row: UntaggedResponse) {
        self.queue.absorb(row);
    }

    /// Forgets all connection-scoped state after the transport is lost.
    /// Returns the tags of commands that will never complete.
    pub fn reset(&mut self) -> Vec<String> {
        self.state = SessionState::Disconnected;
        self.idle_tag = None;
        self.outbound.clear();
        self.violations = 0;
        self.capabilities.clear();
        self.tags.reset();
        self.queue.fail_all()
    }

    fn complete(
        &mut self,
        tag: &str,
        status: Status,
        code: Option<ResponseCode>,
        text: String,
    ) -> Result<ProtocolEvent> {
        if let Some(ResponseCode::Capability(caps)) = &code {
            self.capabilities.replace(caps.iter().cloned());
        }
        let Some(outcome) = self.queue.resolve(tag, status, code, text) else {
            return self.violation(format_args!("completion for unknown tag {tag}"));
        };
        self.violations = 0;
        if self.idle_tag.as_deref() == Some(tag) {
            self.idle_tag = None;
        }
        self.transition(&outcome);
        debug!(
            %tag,
            command = outcome.command.name(),
            status = %outcome.status,
            "command complete"
        );
        Ok(ProtocolEvent::Completed(outcome))
    }

    fn observe(&mut self, row: UntaggedResponse) -> ProtocolEvent {
        self.violations = 0;
        match &row {
            UntaggedResponse::Capability(caps) => {
                self.capabilities.replace(caps.iter().cloned());
            }
            UntaggedResponse::Enabled(caps) => {
                self.capabilities.enable(caps.iter().cloned());
            }
            UntaggedResponse::Status {
                code: Some(ResponseCode::Capability(caps)),
                ..
            } => {
                self.capabilities.replace(caps.iter().cloned());
            }
            _ => {}
        }
        ProtocolEvent::Untagged(row)
    }

    fn grant(&mut self, prompt: Option<&str>) -> Result<ProtocolEvent> {
        let (tag, payload) = {
            let Some(cmd) = self.queue.next_awaiting_continuation() else {
                return self.violation(format_args!(
                    "continuation request with nothing waiting: {}",
                    prompt.unwrap_or("")
                ));
            };
            (cmd.tag().to_string(), cmd.command().continuation_payload())
        };
        self.violations = 0;
        self.queue.mark_sent(&tag);
        match payload {
            Some(payload) => {
                trace!(%tag, bytes = payload.len(), "continuation granted, sending payload");
                self.outbound.push_back(Transmit::new(payload));
                Ok(ProtocolEvent::ContinuationSent)
            }
            // IDLE sends nothing back; the server may now stream updates.
            None => {
                debug!(%tag, "idle accepted");
                self.idle_tag = Some(tag);
                Ok(ProtocolEvent::IdleStarted)
            }
        }
    }

    /// State transitions ride on command completions, per RFC 3501
    /// section 3: a failed SELECT leaves no mailbox open.
    fn transition(&mut self, outcome: &CommandOutcome) {
        if !outcome.is_ok() {
            if matches!(
                outcome.command,
                Command::Select { .. } | Command::Examine { .. }
            ) && self.state.is_selected()
            {
                self.state = SessionState::Authenticated;
            }
            return;
        }
        match &outcome.command {
            Command::Login { .. } | Command::Authenticate { .. } => {
                self.state = SessionState::Authenticated;
            }
            Command::Select { mailbox, .. } => {
                let read_only = matches!(outcome.code, Some(ResponseCode::ReadOnly));
                self.state = SessionState::Selected(SelectedMailbox {
                    mailbox: mailbox.clone(),
                    read_only,
                });
            }
            Command::Examine { mailbox, .. } => {
                self.state = SessionState::Selected(SelectedMailbox {
                    mailbox: mailbox.clone(),
                    read_only: true,
                });
            }
            Command::Close => {
                self.state = SessionState::Authenticated;
            }
            Command::Logout => {
                self.state = SessionState::Disconnected;
            }
            // The old capability list no longer applies once the
            // transport is upgraded; the caller re-requests it.
            Command::StartTls => {
                self.capabilities.clear();
            }
            _ => {}
        }
    }

    fn violation(&mut self, what: fmt::Arguments<'_>) -> Result<ProtocolEvent> {
        self.violations += 1;
        if self.violations >= self.violation_limit {
            return Err(Error::Protocol(format!(
                "giving up after {} consecutive unusable responses; last: {what}",
                self.violations
            )));
        }
        warn!(count = self.violations, "ignoring unusable response: {what}");
        Ok(ProtocolEvent::Ignored)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use crate::types::{Capability, Flags, Mailbox};

    fn completed(event: ProtocolEvent) -> CommandOutcome {
        match event {
            ProtocolEvent::Completed(outcome) => outcome,
            other => panic!("expected completion, got {other:?}"),
        }
    }

    fn drain(protocol: &mut Protocol) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        while let Some(t) = protocol.poll_transmit() {
            lines.push(t.data);
        }
        lines
    }

    mod lifecycle_tests {
        use super::*;

        #[test]
        fn greeting_then_login_reaches_authenticated() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::Ok).unwrap();
            assert_eq!(*protocol.state(), SessionState::Connected);

            let tag = protocol
                .enqueue(Command::Login {
                    username: "ana".to_string(),
                    password: "hunter2".to_string(),
                })
                .unwrap();
            assert_eq!(
                drain(&mut protocol),
                vec![format!("{tag} LOGIN ana hunter2\r\n").into_bytes()]
            );

            let event = protocol
                .receive(format!("{tag} OK LOGIN completed\r\n").as_bytes())
                .unwrap();
            assert!(completed(event).is_ok());
            assert!(protocol.state().is_authenticated());
        }

        #[test]
        fn preauth_greeting_skips_login() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();
            assert!(protocol.state().is_authenticated());
        }

        #[test]
        fn bye_greeting_is_an_error() {
            let mut protocol = Protocol::default();
            assert!(matches!(protocol.greeted(Status::Bye), Err(Error::Bye(_))));
        }

        #[test]
        fn select_moves_to_selected_and_close_back() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();

            let tag = protocol
                .enqueue(Command::Select {
                    mailbox: Mailbox::inbox(),
                    condstore: false,
                    qresync: None,
                })
                .unwrap();
            let event = protocol
                .receive(format!("{tag} OK [READ-WRITE] SELECT completed\r\n").as_bytes())
                .unwrap();
            completed(event);
            assert!(protocol.state().is_selected());
            assert!(!protocol.state().is_read_only());

            let tag = protocol.enqueue(Command::Close).unwrap();
            let event = protocol
                .receive(format!("{tag} OK CLOSE completed\r\n").as_bytes())
                .unwrap();
            completed(event);
            assert_eq!(*protocol.state(), SessionState::Authenticated);
        }

        #[test]
        fn examine_selects_read_only() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();
            let tag = protocol
                .enqueue(Command::Examine {
                    mailbox: Mailbox::new("Archive"),
                    condstore: false,
                    qresync: None,
                })
                .unwrap();
            protocol
                .receive(format!("{tag} OK [READ-ONLY] EXAMINE completed\r\n").as_bytes())
                .unwrap();
            assert!(protocol.state().is_read_only());
        }

        #[test]
        fn failed_select_leaves_no_mailbox_open() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();

            let tag = protocol
                .enqueue(Command::Select {
                    mailbox: Mailbox::inbox(),
                    condstore: false,
                    qresync: None,
                })
                .unwrap();
            protocol
                .receive(format!("{tag} OK SELECT completed\r\n").as_bytes())
                .unwrap();
            assert!(protocol.state().is_selected());

            let tag = protocol
                .enqueue(Command::Select {
                    mailbox: Mailbox::new("Missing"),
                    condstore: false,
                    qresync: None,
                })
                .unwrap();
            protocol
                .receive(format!("{tag} NO no such mailbox\r\n").as_bytes())
                .unwrap();
            assert_eq!(*protocol.state(), SessionState::Authenticated);
        }

        #[test]
        fn reset_drops_everything_in_flight() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();
            let tag = protocol.enqueue(Command::Noop).unwrap();
            drain(&mut protocol);

            let failed = protocol.reset();
            assert_eq!(failed, vec![tag]);
            assert_eq!(*protocol.state(), SessionState::Disconnected);
            assert!(protocol.poll_transmit().is_none());
            assert!(!protocol.has_pending());
        }
    }

    mod tag_tests {
        use super::*;

        #[test]
        fn oversized_command_is_rejected_before_send() {
            let mut protocol = Protocol::new(64, DEFAULT_VIOLATION_LIMIT);
            let err = protocol
                .enqueue(Command::Login {
                    username: "user".to_string(),
                    password: "p".repeat(100),
                })
                .unwrap_err();
            assert!(matches!(
                err,
                Error::CommandTooLong {
                    size: _,
                    limit: 64
                }
            ));
            assert!(protocol.poll_transmit().is_none());
            assert!(!protocol.has_pending());
        }

        #[test]
        fn wrapped_tag_still_in_flight_is_skipped() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();

            // First tag stays unresolved while the counter wraps all the
            // way around.
            let held = protocol.enqueue(Command::Noop).unwrap();
            assert_eq!(held, "a0000");
            for _ in 0..9_999 {
                let tag = protocol.enqueue(Command::Noop).unwrap();
                protocol
                    .receive(format!("{tag} OK NOOP completed\r\n").as_bytes())
                    .unwrap();
            }

            let next = protocol.enqueue(Command::Noop).unwrap();
            assert_eq!(next, "a0001");
            assert!(protocol.queue.contains("a0000"));
        }
    }

    mod data_tests {
        use super::*;

        #[test]
        fn untagged_rows_ride_with_the_oldest_command() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();
            let first = protocol.enqueue(Command::Noop).unwrap();
            let second = protocol.enqueue(Command::Noop).unwrap();

            let event = protocol.receive(b"* 7 EXISTS\r\n").unwrap();
            let ProtocolEvent::Untagged(row) = event else {
                panic!("expected untagged row");
            };
            protocol.absorb(row);

            let outcome = completed(
                protocol
                    .receive(format!("{first} OK done\r\n").as_bytes())
                    .unwrap(),
            );
            assert_eq!(outcome.data, vec![UntaggedResponse::Exists(7)]);

            let outcome = completed(
                protocol
                    .receive(format!("{second} OK done\r\n").as_bytes())
                    .unwrap(),
            );
            assert!(outcome.data.is_empty());
        }

        #[test]
        fn capabilities_track_untagged_and_coded_announcements() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::Ok).unwrap();

            protocol
                .receive(b"* CAPABILITY IMAP4rev1 IDLE STARTTLS\r\n")
                .unwrap();
            assert!(protocol.capabilities().has(&Capability::Idle));
            assert!(protocol.capabilities().has(&Capability::StartTls));

            let tag = protocol
                .enqueue(Command::Login {
                    username: "u".to_string(),
                    password: "p".to_string(),
                })
                .unwrap();
            protocol
                .receive(
                    format!("{tag} OK [CAPABILITY IMAP4rev1 IDLE CONDSTORE] done\r\n").as_bytes(),
                )
                .unwrap();
            assert!(protocol.capabilities().has(&Capability::CondStore));
            assert!(!protocol.capabilities().has(&Capability::StartTls));
        }

        #[test]
        fn starttls_acceptance_clears_stale_capabilities() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::Ok).unwrap();
            protocol
                .receive(b"* CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED\r\n")
                .unwrap();

            let tag = protocol.enqueue(Command::StartTls).unwrap();
            protocol
                .receive(format!("{tag} OK begin TLS now\r\n").as_bytes())
                .unwrap();
            assert!(protocol.capabilities().is_empty());
        }

        #[test]
        fn enabled_rows_mark_extensions_active() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();
            protocol.receive(b"* ENABLED QRESYNC\r\n").unwrap();
            assert!(protocol.capabilities().is_enabled(&Capability::QResync));
        }
    }

    mod continuation_tests {
        use super::*;

        #[test]
        fn append_payload_follows_the_grant() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();

            let tag = protocol
                .enqueue(Command::Append {
                    mailbox: Mailbox::new("Drafts"),
                    flags: Flags::new(),
                    internal_date: None,
                    message: b"From: a@b\r\n\r\nhi".to_vec(),
                })
                .unwrap();
            let lines = drain(&mut protocol);
            assert_eq!(lines, vec![format!("{tag} APPEND Drafts {{15}}\r\n").into_bytes()]);

            let event = protocol.receive(b"+ Ready for literal data\r\n").unwrap();
            assert!(matches!(event, ProtocolEvent::ContinuationSent));
            assert_eq!(drain(&mut protocol), vec![b"From: a@b\r\n\r\nhi\r\n".to_vec()]);

            let outcome = completed(
                protocol
                    .receive(format!("{tag} OK APPEND completed\r\n").as_bytes())
                    .unwrap(),
            );
            assert!(outcome.is_ok());
        }

        #[test]
        fn idle_grant_then_done_then_completion() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();

            assert!(protocol.done().is_err());

            let tag = protocol.enqueue(Command::Idle).unwrap();
            drain(&mut protocol);
            assert!(!protocol.is_idle());

            let event = protocol.receive(b"+ idling\r\n").unwrap();
            assert!(matches!(event, ProtocolEvent::IdleStarted));
            assert!(protocol.is_idle());

            protocol.done().unwrap();
            assert_eq!(drain(&mut protocol), vec![b"DONE\r\n".to_vec()]);
            assert!(protocol.is_idle());

            completed(
                protocol
                    .receive(format!("{tag} OK IDLE terminated\r\n").as_bytes())
                    .unwrap(),
            );
            assert!(!protocol.is_idle());
        }
    }

    mod violation_tests {
        use super::*;

        #[test]
        fn unexpected_continuations_poison_after_the_limit() {
            let mut protocol = Protocol::new(DEFAULT_MAX_COMMAND_LEN, 2);
            protocol.greeted(Status::PreAuth).unwrap();

            let event = protocol.receive(b"+ go ahead\r\n").unwrap();
            assert!(matches!(event, ProtocolEvent::Ignored));

            let err = protocol.receive(b"+ go ahead\r\n").unwrap_err();
            assert!(matches!(err, Error::Protocol(_)));
        }

        #[test]
        fn a_usable_response_resets_the_count() {
            let mut protocol = Protocol::new(DEFAULT_MAX_COMMAND_LEN, 2);
            protocol.greeted(Status::PreAuth).unwrap();

            assert!(matches!(
                protocol.receive(b"%% nonsense\r\n").unwrap(),
                ProtocolEvent::Ignored
            ));
            assert!(matches!(
                protocol.receive(b"* 3 EXISTS\r\n").unwrap(),
                ProtocolEvent::Untagged(_)
            ));
            assert!(matches!(
                protocol.receive(b"%% nonsense\r\n").unwrap(),
                ProtocolEvent::Ignored
            ));
        }

        #[test]
        fn unknown_tags_are_ignored_not_fatal() {
            let mut protocol = Protocol::default();
            protocol.greeted(Status::PreAuth).unwrap();
            let event = protocol.receive(b"zz99 OK stale\r\n").unwrap();
            assert!(matches!(event, ProtocolEvent::Ignored));
        }
    }
}

//! In-flight command bookkeeping.
//!
//! Commands may be pipelined, so several can be outstanding at once. The
//! server interleaves untagged data with completions; data rows attach to
//! the oldest unresolved command, which is the one the server is working
//! on, while completions are matched purely by tag since servers may
//! finish pipelined commands out of submission order.

use std::collections::VecDeque;

use crate::error::{Error, Result};
use crate::parser::UntaggedResponse;
use crate::types::{ResponseCode, Status};

use super::Command;

/// Lifecycle of one outstanding command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// The line has been sent (or queued to send); the server must answer
    /// with a continuation before the rest can go out.
    AwaitingContinuation,
    /// Everything has been sent; waiting for the tagged completion.
    AwaitingResponse,
}

/// One outstanding command and the untagged data collected for it.
#[derive(Debug)]
pub struct QueuedCommand {
    tag: String,
    command: Command,
    state: CommandState,
    data: Vec<UntaggedResponse>,
}

impl QueuedCommand {
    pub(crate) fn new(tag: String, command: Command) -> Self {
        let state = if command.expects_continuation() {
            CommandState::AwaitingContinuation
        } else {
            CommandState::AwaitingResponse
        };
        Self {
            tag,
            command,
            state,
            data: Vec::new(),
        }
    }

    /// The command's tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The command itself.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.command
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> CommandState {
        self.state
    }
}

/// Completion of a command, with everything collected on its behalf.
#[derive(Debug)]
pub struct CommandOutcome {
    /// Tag the server echoed.
    pub tag: String,
    /// The command that completed.
    pub command: Command,
    /// OK, NO or BAD.
    pub status: Status,
    /// Optional bracketed code from the completion line.
    pub code: Option<ResponseCode>,
    /// Completion text.
    pub text: String,
    /// Untagged rows attributed to this command, in arrival order.
    pub data: Vec<UntaggedResponse>,
}

impl CommandOutcome {
    /// Whether the server accepted the command.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.status.is_ok()
    }

    /// Converts a rejection into the matching error, yielding the
    /// collected data on success.
    pub fn into_data(self) -> Result<Vec<UntaggedResponse>> {
        match self.status {
            Status::Ok | Status::PreAuth => Ok(self.data),
            Status::No => Err(Error::No(self.text)),
            Status::Bad => Err(Error::Bad(self.text)),
            Status::Bye => Err(Error::Bye(self.text)),
        }
    }
}

/// The set of outstanding commands.
///
/// Grows as needed and never shrinks under its in-flight count; a slot is
/// freed only when its command resolves or the whole queue is failed.
#[derive(Debug, Default)]
pub struct CommandQueue {
    slots: VecDeque<QueuedCommand>,
}

impl CommandQueue {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: VecDeque::new(),
        }
    }

    /// Number of outstanding commands.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.slots.len()
    }

    /// True when nothing is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether a command with this tag is outstanding. Used to keep a
    /// wrapped tag from being reissued while its first user is live.
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.slots.iter().any(|cmd| cmd.tag == tag)
    }

    /// Appends a newly sent command.
    pub fn push(&mut self, command: QueuedCommand) {
        self.slots.push_back(command);
    }

    /// The oldest unresolved command; untagged data rows belong to it.
    #[must_use]
    pub fn current(&self) -> Option<&QueuedCommand> {
        self.slots.front()
    }

    /// Attaches a data row to the current command. Rows arriving with an
    /// empty queue are genuinely unsolicited and are dropped here; the
    /// session has already folded them into its mailbox state.
    pub fn absorb(&mut self, row: UntaggedResponse) {
        if let Some(current) = self.slots.front_mut() {
            current.data.push(row);
        }
    }

    /// The oldest command still waiting for a continuation grant.
    pub fn next_awaiting_continuation(&mut self) -> Option<&mut QueuedCommand> {
        self.slots
            .iter_mut()
            .find(|cmd| cmd.state == CommandState::AwaitingContinuation)
    }

    /// Marks a command as fully sent.
    pub fn mark_sent(&mut self, tag: &str) {
        if let Some(cmd) = self.slots.iter_mut().find(|cmd| cmd.tag == tag) {
            cmd.state = CommandState::AwaitingResponse;
        }
    }

    /// Resolves the command with this tag, detaching it from the queue
    /// together with everything collected for it. `None` when the tag is
    /// unknown (stale completion from a previous connection, or a server
    /// bug).
    pub fn resolve(
        &mut self,
        tag: &str,
        status: Status,
        code: Option<ResponseCode>,
        text: String,
    ) -> Option<CommandOutcome> {
        let position = self.slots.iter().position(|cmd| cmd.tag == tag)?;
        let cmd = self.slots.remove(position)?;
        Some(CommandOutcome {
            tag: cmd.tag,
            command: cmd.command,
            status,
            code,
            text,
            data: cmd.data,
        })
    }

    /// Drops every outstanding command, returning their tags. Used when
    /// the connection dies and nothing can complete.
    pub fn fail_all(&mut self) -> Vec<String> {
        self.slots.drain(..).map(|cmd| cmd.tag).collect()
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

    fn queued(tag: &str, command: Command) -> QueuedCommand {
        QueuedCommand::new(tag.to_string(), command)
    }

    #[test]
    fn data_attaches_to_the_oldest_command() {
        let mut queue = CommandQueue::new();
        queue.push(queued("a0001", Command::Noop));
        queue.push(queued("a0002", Command::Capability));

        queue.absorb(UntaggedResponse::Exists(12));

        let outcome = queue
            .resolve("a0001", Status::Ok, None, "done".to_string())
            .unwrap();
        assert_eq!(outcome.data, vec![UntaggedResponse::Exists(12)]);

        let outcome = queue
            .resolve("a0002", Status::Ok, None, "done".to_string())
            .unwrap();
        assert!(outcome.data.is_empty());
    }

    #[test]
    fn completions_resolve_by_tag_not_order() {
        let mut queue = CommandQueue::new();
        queue.push(queued("a0001", Command::Noop));
        queue.push(queued("a0002", Command::Expunge));

        let outcome = queue
            .resolve("a0002", Status::Ok, None, "done".to_string())
            .unwrap();
        assert_eq!(outcome.tag, "a0002");
        assert_eq!(queue.in_flight(), 1);
        assert!(queue.contains("a0001"));
    }

    #[test]
    fn unknown_tag_resolves_to_none() {
        let mut queue = CommandQueue::new();
        queue.push(queued("a0001", Command::Noop));
        assert!(
            queue
                .resolve("zz99", Status::Ok, None, String::new())
                .is_none()
        );
        assert_eq!(queue.in_flight(), 1);
    }

    #[test]
    fn rows_with_no_commands_outstanding_are_dropped() {
        let mut queue = CommandQueue::new();
        queue.absorb(UntaggedResponse::Recent(1));
        assert!(queue.is_empty());
    }

    #[test]
    fn continuation_commands_start_in_the_waiting_state() {
        let append = Command::Append {
            mailbox: crate::types::Mailbox::inbox(),
            flags: crate::types::Flags::new(),
            internal_date: None,
            message: b"x".to_vec(),
        };
        let cmd = queued("a0003", append);
        assert_eq!(cmd.state(), CommandState::AwaitingContinuation);

        let cmd = queued("a0004", Command::Idle);
        assert_eq!(cmd.state(), CommandState::AwaitingContinuation);

        let cmd = queued("a0005", Command::Noop);
        assert_eq!(cmd.state(), CommandState::AwaitingResponse);
    }

    #[test]
    fn fail_all_empties_the_queue() {
        let mut queue = CommandQueue::new();
        queue.push(queued("a0001", Command::Noop));
        queue.push(queued("a0002", Command::Noop));

        let tags = queue.fail_all();
        assert_eq!(tags, vec!["a0001".to_string(), "a0002".to_string()]);
        assert!(queue.is_empty());
    }

    #[test]
    fn rejection_surfaces_as_a_typed_error() {
        let mut queue = CommandQueue::new();
        queue.push(queued("a0001", Command::Expunge));
        let outcome = queue
            .resolve(
                "a0001",
                Status::No,
                None,
                "mailbox is read-only".to_string(),
            )
            .unwrap();
        match outcome.into_data() {
            Err(Error::No(text)) => assert_eq!(text, "mailbox is read-only"),
            other => panic!("expected NO error, got {other:?}"),
        }
    }
}

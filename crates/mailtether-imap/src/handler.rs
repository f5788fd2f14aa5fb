//! Observer hooks for unsolicited server traffic.
//!
//! A server may report mailbox changes at any time, not only in reply to
//! the command that is currently in flight. The session always folds such
//! traffic into its own synchronization state first, then forwards it to
//! a [`ResponseHandler`] so the owner can react (refresh a view, schedule
//! a body fetch, surface an alert).
//!
//! # Example
//!
//! ```ignore
//! use mailtether_imap::handler::ResponseHandler;
//!
//! struct Watcher {
//!     message_count: u32,
//! }
//!
//! impl ResponseHandler for Watcher {
//!     fn on_exists(&mut self, count: u32) {
//!         self.message_count = count;
//!     }
//! }
//! ```

use crate::parser::FetchData;
use crate::seqset::SequenceSet;
use crate::types::{Flags, SeqNum};

/// Handler for unsolicited server responses.
///
/// Every method has a no-op default, so implementors pick the events they
/// care about. The handler runs inline with response processing; keep the
/// callbacks short.
pub trait ResponseHandler: Send {
    /// Message count changed (EXISTS). Usually means new mail.
    fn on_exists(&mut self, count: u32) {
        let _ = count;
    }

    /// Recent count changed (RECENT).
    fn on_recent(&mut self, count: u32) {
        let _ = count;
    }

    /// A message was removed (EXPUNGE). The sequence number is the
    /// message's position before removal; later messages have already
    /// shifted down by the time this fires.
    fn on_expunge(&mut self, seq: SeqNum) {
        let _ = seq;
    }

    /// Messages were removed by UID (QRESYNC VANISHED).
    fn on_vanished(&mut self, earlier: bool, uids: &SequenceSet) {
        let _ = (earlier, uids);
    }

    /// Message metadata changed, typically flags set by another client.
    fn on_fetch(&mut self, seq: SeqNum, data: &FetchData) {
        let _ = (seq, data);
    }

    /// The mailbox's applicable flags changed.
    fn on_flags(&mut self, flags: &Flags) {
        let _ = flags;
    }

    /// The server is closing the connection. Nothing can be sent after
    /// this fires.
    fn on_bye(&mut self, text: &str) {
        let _ = text;
    }

    /// ALERT response code. The text must reach the user.
    fn on_alert(&mut self, text: &str) {
        let _ = text;
    }

    /// Untagged OK with informational text.
    fn on_info(&mut self, text: &str) {
        let _ = text;
    }

    /// Untagged NO or BAD; a warning that is not tied to a command.
    fn on_warning(&mut self, text: &str) {
        let _ = text;
    }
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl ResponseHandler for NoopHandler {}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl ResponseHandler for LoggingHandler {
    fn on_exists(&mut self, count: u32) {
        tracing::debug!(count, "EXISTS");
    }

    fn on_recent(&mut self, count: u32) {
        tracing::debug!(count, "RECENT");
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        tracing::debug!(seq = seq.get(), "EXPUNGE");
    }

    fn on_vanished(&mut self, earlier: bool, uids: &SequenceSet) {
        tracing::debug!(earlier, %uids, "VANISHED");
    }

    fn on_fetch(&mut self, seq: SeqNum, data: &FetchData) {
        tracing::debug!(seq = seq.get(), ?data, "FETCH");
    }

    fn on_flags(&mut self, flags: &Flags) {
        tracing::debug!(?flags, "FLAGS");
    }

    fn on_bye(&mut self, text: &str) {
        tracing::info!(text, "BYE");
    }

    fn on_alert(&mut self, text: &str) {
        tracing::warn!(text, "ALERT");
    }

    fn on_info(&mut self, text: &str) {
        tracing::trace!(text, "untagged OK");
    }

    fn on_warning(&mut self, text: &str) {
        tracing::warn!(text, "untagged NO/BAD");
    }
}

/// Collects events for later inspection. Used heavily in tests.
#[derive(Debug, Default, Clone)]
pub struct CollectingHandler {
    /// Collected events, oldest first.
    pub events: Vec<UnsolicitedEvent>,
}

impl CollectingHandler {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops all collected events.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Takes the collected events, leaving the collector empty.
    pub fn take(&mut self) -> Vec<UnsolicitedEvent> {
        std::mem::take(&mut self.events)
    }
}

impl ResponseHandler for CollectingHandler {
    fn on_exists(&mut self, count: u32) {
        self.events.push(UnsolicitedEvent::Exists(count));
    }

    fn on_recent(&mut self, count: u32) {
        self.events.push(UnsolicitedEvent::Recent(count));
    }

    fn on_expunge(&mut self, seq: SeqNum) {
        self.events.push(UnsolicitedEvent::Expunge(seq));
    }

    fn on_vanished(&mut self, earlier: bool, uids: &SequenceSet) {
        self.events.push(UnsolicitedEvent::Vanished {
            earlier,
            uids: uids.clone(),
        });
    }

    fn on_fetch(&mut self, seq: SeqNum, data: &FetchData) {
        self.events.push(UnsolicitedEvent::Fetch(seq, data.clone()));
    }

    fn on_flags(&mut self, flags: &Flags) {
        self.events.push(UnsolicitedEvent::Flags(flags.clone()));
    }

    fn on_bye(&mut self, text: &str) {
        self.events.push(UnsolicitedEvent::Bye(text.to_string()));
    }

    fn on_alert(&mut self, text: &str) {
        self.events.push(UnsolicitedEvent::Alert(text.to_string()));
    }
}

/// An event recorded by [`CollectingHandler`].
#[derive(Debug, Clone, PartialEq)]
pub enum UnsolicitedEvent {
    /// EXISTS count.
    Exists(u32),
    /// RECENT count.
    Recent(u32),
    /// EXPUNGE of one sequence number.
    Expunge(SeqNum),
    /// VANISHED UID set.
    Vanished {
        /// Whether the set covers pre-disconnect expunges.
        earlier: bool,
        /// The removed UIDs.
        uids: SequenceSet,
    },
    /// Unsolicited FETCH data.
    Fetch(SeqNum, FetchData),
    /// Applicable-flags change.
    Flags(Flags),
    /// Connection teardown notice.
    Bye(String),
    /// ALERT text.
    Alert(String),
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

    #[test]
    fn noop_handler_ignores_everything() {
        let mut handler = NoopHandler;
        handler.on_exists(100);
        handler.on_expunge(SeqNum::new(1).unwrap());
        handler.on_bye("goodbye");
        handler.on_alert("important!");
    }

    #[test]
    fn collecting_handler_records_in_order() {
        let mut handler = CollectingHandler::new();

        handler.on_exists(50);
        handler.on_recent(5);
        handler.on_alert("maintenance at noon");

        assert_eq!(handler.events.len(), 3);
        assert_eq!(handler.events[0], UnsolicitedEvent::Exists(50));
        assert_eq!(handler.events[1], UnsolicitedEvent::Recent(5));
        assert_eq!(
            handler.events[2],
            UnsolicitedEvent::Alert("maintenance at noon".to_string())
        );

        let taken = handler.take();
        assert_eq!(taken.len(), 3);
        assert!(handler.events.is_empty());
    }

    #[test]
    fn collecting_handler_keeps_vanished_sets() {
        let mut handler = CollectingHandler::new();
        let uids = SequenceSet::parse("300:310,405").unwrap();
        handler.on_vanished(true, &uids);

        match &handler.events[0] {
            UnsolicitedEvent::Vanished { earlier, uids } => {
                assert!(*earlier);
                assert_eq!(uids.iter(0).count(), 12);
            }
            other => panic!("expected vanished, got {other:?}"),
        }
    }

    #[test]
    fn clear_empties_the_collector() {
        let mut handler = CollectingHandler::new();
        handler.on_exists(10);
        handler.on_exists(20);
        assert_eq!(handler.events.len(), 2);

        handler.clear();
        assert!(handler.events.is_empty());
    }
}

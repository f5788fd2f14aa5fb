//! Session state machine.

use crate::types::Mailbox;

/// Details of the currently selected mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMailbox {
    /// The mailbox that was selected or examined.
    pub mailbox: Mailbox,
    /// Whether the server granted only read access, either because
    /// EXAMINE was used or because the completion carried `[READ-ONLY]`.
    pub read_only: bool,
}

/// Where the session stands in the connection lifecycle.
///
/// Transitions only move forward through successful commands: a greeting
/// makes the session [`Connected`](Self::Connected), authentication makes
/// it [`Authenticated`](Self::Authenticated), and a successful SELECT or
/// EXAMINE makes it [`Selected`](Self::Selected). CLOSE and a failed
/// SELECT fall back to `Authenticated`; losing the transport or LOGOUT
/// falls back to `Disconnected`. IDLE is not a state of its own, it is a
/// property of the command queue while the IDLE command is open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No usable transport.
    #[default]
    Disconnected,
    /// Greeting received, not yet authenticated.
    Connected,
    /// Logged in, no mailbox open.
    Authenticated,
    /// A mailbox is open.
    Selected(SelectedMailbox),
}

impl SessionState {
    /// Whether login has completed.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Selected(_))
    }

    /// Whether a mailbox is open.
    #[must_use]
    pub const fn is_selected(&self) -> bool {
        matches!(self, Self::Selected(_))
    }

    /// The open mailbox, if any.
    #[must_use]
    pub const fn selected(&self) -> Option<&SelectedMailbox> {
        match self {
            Self::Selected(sel) => Some(sel),
            _ => None,
        }
    }

    /// Whether the open mailbox refuses writes.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.selected().is_some_and(|sel| sel.read_only)
    }

    /// Short name for logging.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connected => "connected",
            Self::Authenticated => "authenticated",
            Self::Selected(_) => "selected",
        }
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

    #[test]
    fn defaults_to_disconnected() {
        let state = SessionState::default();
        assert_eq!(state, SessionState::Disconnected);
        assert!(!state.is_authenticated());
        assert!(!state.is_selected());
    }

    #[test]
    fn selected_implies_authenticated() {
        let state = SessionState::Selected(SelectedMailbox {
            mailbox: Mailbox::inbox(),
            read_only: false,
        });
        assert!(state.is_authenticated());
        assert!(state.is_selected());
        assert!(!state.is_read_only());
        assert_eq!(state.selected().unwrap().mailbox.as_str(), "INBOX");
    }

    #[test]
    fn examine_reports_read_only() {
        let state = SessionState::Selected(SelectedMailbox {
            mailbox: Mailbox::new("Archive"),
            read_only: true,
        });
        assert!(state.is_read_only());
    }
}

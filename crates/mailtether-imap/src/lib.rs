//! # mailtether-imap
//!
//! An IMAP4rev1 session engine (RFC 3501) with the extensions that make
//! mail synchronization practical: CONDSTORE and QRESYNC (RFC 7162),
//! UIDPLUS (RFC 4315), MOVE (RFC 6851), IDLE (RFC 2177), ENABLE
//! (RFC 5161) and SASL-IR (RFC 4959).
//!
//! ## Features
//!
//! - **Pipelined commands**: submit several commands, flush them in one
//!   write burst, and collect each completion by tag
//! - **Live mailbox index**: sequence-number/UID mapping kept valid
//!   through EXPUNGE and VANISHED, even mid-response
//! - **Quick resync**: SELECT with QRESYNC parameters restores a
//!   mailbox from a cached checkpoint instead of refetching it
//! - **Message cache**: flag records and bodies persisted per account
//!   and mailbox, keyed by UIDVALIDITY so stale epochs self-destruct
//! - **IDLE with fallback**: push notifications where supported,
//!   transparent NOOP polling everywhere else
//! - **TLS via rustls**: implicit TLS and STARTTLS, no OpenSSL
//! - **Sans-I/O core**: the protocol engine is pure state, driven by
//!   the session over any `AsyncRead + AsyncWrite` transport
//!
//! ## Quick start
//!
//! ```ignore
//! use std::time::Duration;
//!
//! use mailtether_imap::{
//!     AccountConfig, FetchItems, Mailbox, Security, SequenceSet, Session,
//! };
//!
//! #[tokio::main]
//! async fn main() -> mailtether_imap::Result<()> {
//!     let config = AccountConfig::builder("imap.example.com")
//!         .security(Security::Implicit)
//!         .build();
//!
//!     let mut session = Session::connect(config).await?;
//!     session.login("user@example.com", "password").await?;
//!     session.enable_extensions().await?;
//!
//!     let summary = session.open(&Mailbox::inbox(), false).await?;
//!     println!("{} messages", summary.exists);
//!
//!     // Pull flags for everything; records land in the session store.
//!     session
//!         .fetch(SequenceSet::all(), FetchItems::flag_sync(), false)
//!         .await?;
//!
//!     // Wait for the server to report changes.
//!     let mut handle = session.idle().await?;
//!     if handle.wait(Duration::from_secs(60)).await? {
//!         println!("mailbox changed");
//!     }
//!     handle.done().await?;
//!
//!     session.logout().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Session lifecycle
//!
//! ```text
//! Disconnected ── greeting ──▶ Connected ── LOGIN / AUTHENTICATE ──▶ Authenticated
//!                                                                        │
//!                                            CLOSE ◀── SELECT / EXAMINE ─┘
//!                                              │              │
//!                                              └──────▶ Selected
//! ```
//!
//! A `PREAUTH` greeting skips straight to `Authenticated`; `LOGOUT`
//! returns to `Disconnected` from anywhere.
//!
//! ## Modules
//!
//! - [`connection`]: transport, framing and the [`Session`] driver
//! - [`protocol`]: sans-I/O conversation state machine
//! - [`command`]: command types, serialization and the pending queue
//! - [`parser`]: response lexer and untagged-response parser
//! - [`sync`]: the per-mailbox sequence-number/UID index
//! - [`store`] and [`cache`]: message records, bodies and checkpoints
//! - [`types`]: flags, identifiers, capabilities and response codes

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod codec;
pub mod command;
pub mod connection;
mod error;
pub mod handler;
pub mod parser;
pub mod protocol;
pub mod seqset;
pub mod store;
pub mod sync;
pub mod time;
pub mod types;

pub use cache::{MessageCache, SyncCheckpoint};
pub use command::{
    Command, FetchAttribute, FetchItems, SearchCriteria, StatusAttribute, StoreAction, StoreMode,
    TagGenerator,
};
pub use connection::{
    AccountConfig, AccountConfigBuilder, ExecOptions, FramedStream, IdleHandle, Security,
    SelectSummary, Session, Transport,
};
pub use error::{Error, Result};
pub use handler::ResponseHandler;
pub use parser::{FetchData, UntaggedResponse};
pub use protocol::{Protocol, ProtocolEvent, SessionState};
pub use seqset::SequenceSet;
pub use store::{MessageRecord, RecordStore};
pub use sync::MailboxSync;
pub use types::{
    Capability, CapabilitySet, Flag, Flags, ListEntry, Mailbox, MailboxStatus, ModSeq,
    ResponseCode, SeqNum, Status, Uid, UidValidity,
};

/// IMAP protocol version this engine speaks.
pub const IMAP_VERSION: &str = "IMAP4rev1";

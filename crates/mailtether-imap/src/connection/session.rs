//! One conversation with a mail server, from greeting to logout.
//!
//! A [`Session`] owns the transport and layers the sans-I/O
//! [`Protocol`] engine on top of it. Every response the server sends
//! passes through [`Session::ingest`], which routes unsolicited data
//! into the per-mailbox index ([`MailboxSync`]), the record store and
//! the cache before the caller ever sees a command completion. That
//! ordering is what keeps sequence numbers valid: an EXPUNGE that
//! arrives in the middle of a FETCH response shifts the index before
//! the next FETCH row is applied.
//!
//! Commands run in two halves. [`Session::submit`] queues a command
//! without touching the socket, so several submissions coalesce into
//! one write burst when [`Session::finish`] flushes them. The common
//! case is wrapped by [`Session::execute`].

#![allow(clippy::missing_errors_doc)]

use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use super::config::{AccountConfig, Security};
use super::framed::{FramedStream, ProgressFn};
use super::stream::Transport;
use crate::cache::{MessageCache, SyncCheckpoint, namespace_dir};
use crate::command::{
    Command, CommandOutcome, FetchAttribute, FetchItems, SearchCriteria, StatusAttribute,
    StoreAction,
};
use crate::error::{Error, Result};
use crate::handler::{NoopHandler, ResponseHandler};
use crate::parser::{FetchData, UntaggedResponse};
use crate::protocol::{Protocol, ProtocolEvent, SessionState};
use crate::seqset::SequenceSet;
use crate::store::{MemoryStore, MessageRecord, RecordStore};
use crate::sync::MailboxSync;
use crate::time::{BoxClock, SystemClock};
use crate::types::{
    Capability, CapabilitySet, Flag, Flags, ListEntry, Mailbox, MailboxStatus, ModSeq,
    ResponseCode, SeqNum, Status, StatusRing, Uid, UidValidity,
};

/// Per-command execution switches.
///
/// The defaults suit almost every call: a NO completion becomes
/// [`Error::No`] and the command goes out immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    /// Return the outcome instead of an error when the server answers
    /// NO. BAD and BYE still fail.
    pub fail_is_ok: bool,
    /// Drain responses the server has already sent before this command
    /// goes out, so it runs against up-to-date mailbox state.
    pub poll_first: bool,
}

/// What a SELECT or EXAMINE reported about the mailbox.
#[derive(Debug, Clone)]
pub struct SelectSummary {
    /// The mailbox that is now open.
    pub mailbox: Mailbox,
    /// Number of messages present.
    pub exists: u32,
    /// Number of messages with the `\Recent` flag.
    pub recent: u32,
    /// Sequence number of the first unseen message, if reported.
    pub unseen: Option<SeqNum>,
    /// UID epoch of the mailbox.
    pub uid_validity: Option<UidValidity>,
    /// Next UID the server expects to assign.
    pub uid_next: Option<Uid>,
    /// Highest mod-sequence, when the server tracks them.
    pub highest_modseq: Option<ModSeq>,
    /// Whether the mailbox was opened without write access.
    pub read_only: bool,
}

/// What [`Session::ingest`] made of one response unit.
#[derive(Debug)]
pub(super) enum Ingested {
    /// A command finished; the outcome carries its collected data.
    Completed(CommandOutcome),
    /// Unsolicited data was folded into the session state.
    Row,
    /// Nothing the caller needs to react to.
    Quiet,
}

/// An authenticated IMAP session over any async byte stream.
///
/// The generic parameter exists so tests can drive a session over an
/// in-memory mock; production code uses [`Session<Transport>`] via
/// [`Session::connect`].
pub struct Session<S> {
    pub(super) config: AccountConfig,
    pub(super) framed: FramedStream<S>,
    pub(super) protocol: Protocol,
    pub(super) clock: BoxClock,
    sync: Option<MailboxSync>,
    store: Box<dyn RecordStore>,
    cache: MessageCache,
    statuses: StatusRing,
    handler: Box<dyn ResponseHandler>,
    /// Last moment any byte moved on the wire, in either direction.
    last_activity: Instant,
    /// Last moment the owner asked this session to do something.
    last_use: Instant,
    /// Completions read while waiting for a different tag.
    finished: VecDeque<CommandOutcome>,
    /// Set while LOGOUT is in flight; BYE is expected then.
    quitting: bool,
}

impl Session<Transport> {
    /// Connects to the configured server, upgrades to TLS when the
    /// account asks for STARTTLS, and consumes the greeting.
    ///
    /// Returns with the session in the connected (or, after a PREAUTH
    /// greeting, authenticated) state. No credentials are sent here;
    /// call [`Session::login`] or [`Session::authenticate_plain`].
    pub async fn connect(config: AccountConfig) -> Result<Self> {
        let transport = Transport::connect(&config).await?;
        let mut framed = FramedStream::new(transport);
        let mut protocol = Protocol::default();

        greet(&mut framed, &mut protocol, config.io_timeout).await?;

        if config.security == Security::StartTls && !framed.get_ref().is_tls() {
            if protocol.capabilities().is_empty() {
                run_command(
                    &mut framed,
                    &mut protocol,
                    Command::Capability,
                    config.io_timeout,
                )
                .await?;
            }
            if !protocol.capabilities().has(&Capability::StartTls) {
                return Err(Error::Protocol(
                    "server does not offer STARTTLS".to_string(),
                ));
            }
            run_command(
                &mut framed,
                &mut protocol,
                Command::StartTls,
                config.io_timeout,
            )
            .await?;
            // The engine wiped the capability list when STARTTLS
            // completed; nothing learned in plaintext can be trusted.
            let upgraded = framed.into_inner().upgrade_to_tls(&config.host).await?;
            framed = FramedStream::new(upgraded);
        }

        if protocol.capabilities().is_empty() {
            run_command(
                &mut framed,
                &mut protocol,
                Command::Capability,
                config.io_timeout,
            )
            .await?;
        }

        Ok(Self::assemble(framed, protocol, config))
    }
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Builds a session over an already-established stream and consumes
    /// the greeting. Capabilities are requested if the greeting did not
    /// announce them.
    pub async fn from_stream(stream: S, config: AccountConfig) -> Result<Self> {
        let mut framed = FramedStream::new(stream);
        let mut protocol = Protocol::default();
        greet(&mut framed, &mut protocol, config.io_timeout).await?;
        if protocol.capabilities().is_empty() {
            run_command(
                &mut framed,
                &mut protocol,
                Command::Capability,
                config.io_timeout,
            )
            .await?;
        }
        Ok(Self::assemble(framed, protocol, config))
    }

    fn assemble(framed: FramedStream<S>, protocol: Protocol, config: AccountConfig) -> Self {
        let clock: BoxClock = Box::new(SystemClock);
        let now = clock.now();
        Self {
            config,
            framed,
            protocol,
            clock,
            sync: None,
            store: Box::new(MemoryStore::new()),
            cache: MessageCache::in_memory(),
            statuses: StatusRing::new(),
            handler: Box::new(NoopHandler),
            last_activity: now,
            last_use: now,
            finished: VecDeque::new(),
            quitting: false,
        }
    }

    // ------------------------------------------------------------------
    // Wiring
    // ------------------------------------------------------------------

    /// Replaces the handler that observes unsolicited server data.
    pub fn set_handler(&mut self, handler: Box<dyn ResponseHandler>) {
        self.handler = handler;
    }

    /// Replaces the record store. Call before opening a mailbox.
    pub fn set_store(&mut self, store: Box<dyn RecordStore>) {
        self.store = store;
    }

    /// Replaces the clock that drives the keepalive timers.
    pub fn set_clock(&mut self, clock: BoxClock) {
        self.last_activity = clock.now();
        self.last_use = clock.now();
        self.clock = clock;
    }

    /// Installs a callback reporting literal download progress.
    pub fn set_progress(&mut self, progress: ProgressFn) {
        self.framed.set_progress(progress);
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// The account configuration this session was built from.
    pub const fn config(&self) -> &AccountConfig {
        &self.config
    }

    /// Capabilities the server has advertised.
    pub const fn capabilities(&self) -> &CapabilitySet {
        self.protocol.capabilities()
    }

    /// Where the session is in its lifecycle.
    pub const fn state(&self) -> &SessionState {
        self.protocol.state()
    }

    /// The mailbox currently open, if any.
    pub fn mailbox(&self) -> Option<&Mailbox> {
        self.sync.as_ref().map(MailboxSync::mailbox)
    }

    /// Live index of the open mailbox.
    pub const fn sync(&self) -> Option<&MailboxSync> {
        self.sync.as_ref()
    }

    /// Whether the index needs a full rebuild. Set when the server
    /// reports fewer messages than an expunge-accurate count allows.
    pub fn needs_resync(&self) -> bool {
        self.sync.as_ref().is_some_and(MailboxSync::needs_resync)
    }

    /// The flag and size record for a message, if one has been fetched.
    pub fn record(&self, uid: Uid) -> Option<&MessageRecord> {
        self.store.get(uid)
    }

    /// All records currently held for the open mailbox.
    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    /// Cached STATUS results, most recently queried mailboxes only.
    pub const fn statuses(&self) -> &StatusRing {
        &self.statuses
    }

    /// The cached STATUS of a mailbox, if one is held.
    pub fn cached_status(&self, mailbox: &Mailbox) -> Option<&MailboxStatus> {
        self.statuses.get(mailbox)
    }

    // ------------------------------------------------------------------
    // Command execution
    // ------------------------------------------------------------------

    /// Runs one command to completion.
    ///
    /// Unsolicited responses that arrive while waiting are applied to
    /// the session state as they are read; the returned outcome carries
    /// the data rows that belonged to this command.
    pub async fn execute(
        &mut self,
        command: Command,
        options: ExecOptions,
    ) -> Result<CommandOutcome> {
        self.touch_use();
        self.run(command, options).await
    }

    /// Queues a command without sending it.
    ///
    /// Consecutive submissions coalesce: nothing is written until
    /// [`Session::finish`] (or any other driving call) flushes the
    /// queue, at which point all pending lines go out back to back.
    pub fn submit(&mut self, command: Command) -> Result<String> {
        self.touch_use();
        self.protocol.enqueue(command)
    }

    /// Flushes all queued commands and waits for the one with `tag` to
    /// complete. Other completions read along the way are held for
    /// their own `finish` calls.
    ///
    /// A read or write failure here means the transport is gone: every
    /// in-flight command fails and the session is Disconnected.
    pub async fn finish(&mut self, tag: &str) -> Result<CommandOutcome> {
        let result = self.finish_pending(tag).await;
        result.map_err(|err| self.lose_transport(err))
    }

    async fn finish_pending(&mut self, tag: &str) -> Result<CommandOutcome> {
        self.flush().await?;
        if let Some(pos) = self.finished.iter().position(|o| o.tag == tag)
            && let Some(outcome) = self.finished.remove(pos)
        {
            return Ok(outcome);
        }
        loop {
            let unit = self.read_unit().await?;
            if let Ingested::Completed(outcome) = self.ingest(&unit).await? {
                if outcome.tag == tag {
                    return Ok(outcome);
                }
                self.stash(outcome);
            }
        }
    }

    /// Resets the session when the transport failed under it. Protocol
    /// errors have already been handled closer to the wire.
    fn lose_transport(&mut self, err: Error) -> Error {
        if matches!(err, Error::Io(_) | Error::Timeout(_)) {
            let orphaned = self.protocol.reset();
            if !orphaned.is_empty() {
                warn!(?orphaned, "failing in-flight commands on lost transport");
            }
        }
        err
    }

    pub(super) async fn run(
        &mut self,
        command: Command,
        options: ExecOptions,
    ) -> Result<CommandOutcome> {
        if options.poll_first {
            self.drain_ready().await?;
        }
        let tag = self.protocol.enqueue(command)?;
        let outcome = self.finish(&tag).await?;
        match outcome.status {
            Status::Ok | Status::PreAuth => Ok(outcome),
            Status::No if options.fail_is_ok => Ok(outcome),
            Status::No => Err(Error::No(outcome.text)),
            Status::Bad => Err(Error::Bad(outcome.text)),
            Status::Bye => Err(Error::Bye(outcome.text)),
        }
    }

    pub(super) fn stash(&mut self, outcome: CommandOutcome) {
        self.finished.push_back(outcome);
    }

    /// Applies everything the server has already sent without blocking
    /// for more.
    async fn drain_ready(&mut self) -> Result<()> {
        loop {
            while let Some(unit) = self.framed.try_read_unit()? {
                if let Ingested::Completed(outcome) = self.ingest(&unit).await? {
                    self.stash(outcome);
                }
            }
            // A zero timeout grants the read exactly one poll: data the
            // kernel already buffered comes through, a quiet socket
            // does not block us.
            match timeout(Duration::ZERO, self.framed.fill()).await {
                Ok(Ok(())) => self.last_activity = self.clock.now(),
                Ok(Err(err)) => return Err(err),
                Err(_) => return Ok(()),
            }
        }
    }

    pub(super) async fn read_unit(&mut self) -> Result<Vec<u8>> {
        let unit = timeout(self.config.io_timeout, self.framed.read_unit())
            .await
            .map_err(|_| Error::Timeout(self.config.io_timeout))??;
        self.touch_activity();
        trace!(bytes = unit.len(), "read response unit");
        Ok(unit)
    }

    pub(super) fn touch_activity(&mut self) {
        self.last_activity = self.clock.now();
    }

    pub(super) fn touch_use(&mut self) {
        self.last_use = self.clock.now();
    }

    pub(super) async fn flush(&mut self) -> Result<()> {
        while let Some(transmit) = self.protocol.poll_transmit() {
            timeout(
                self.config.io_timeout,
                self.framed.write_unit(&transmit.data),
            )
            .await
            .map_err(|_| Error::Timeout(self.config.io_timeout))??;
            self.last_activity = self.clock.now();
        }
        Ok(())
    }

    /// Feeds one response unit through the engine and applies whatever
    /// it announced.
    pub(super) async fn ingest(&mut self, unit: &[u8]) -> Result<Ingested> {
        let event = match self.protocol.receive(unit) {
            Ok(event) => event,
            Err(err) => {
                let orphaned = self.protocol.reset();
                if !orphaned.is_empty() {
                    warn!(?orphaned, "failing in-flight commands on unusable connection");
                }
                return Err(err);
            }
        };
        match event {
            ProtocolEvent::Completed(outcome) => {
                self.apply_completion(&outcome);
                Ok(Ingested::Completed(outcome))
            }
            ProtocolEvent::Untagged(row) => {
                self.apply_untagged(&row)?;
                self.protocol.absorb(row);
                Ok(Ingested::Row)
            }
            ProtocolEvent::ContinuationSent => {
                self.flush().await?;
                Ok(Ingested::Quiet)
            }
            ProtocolEvent::IdleStarted | ProtocolEvent::Ignored => Ok(Ingested::Quiet),
        }
    }

    /// Folds an unsolicited response into the index, store and cache,
    /// then notifies the handler. Runs before the row is absorbed into
    /// a pending command, so sequence numbers are interpreted against
    /// the state that existed when the server sent them.
    fn apply_untagged(&mut self, row: &UntaggedResponse) -> Result<()> {
        match row {
            UntaggedResponse::Exists(count) => {
                if let Some(sync) = &mut self.sync {
                    sync.set_exists(*count);
                }
                self.handler.on_exists(*count);
            }
            UntaggedResponse::Recent(count) => {
                if let Some(sync) = &mut self.sync {
                    sync.set_recent(*count);
                }
                self.handler.on_recent(*count);
            }
            UntaggedResponse::Expunge(seq) => {
                if let Some(sync) = &mut self.sync
                    && let Some(uid) = sync.expunge(*seq)
                {
                    self.store.remove(uid);
                    self.cache.remove(uid);
                }
                self.handler.on_expunge(*seq);
            }
            UntaggedResponse::Fetch { seq, data } => {
                if let Some(sync) = &mut self.sync
                    && let Some(uid) = sync.record_fetch(*seq, data)
                {
                    if self.store.apply(uid, data)
                        && let Some(record) = self.store.get(uid)
                    {
                        self.cache.put_record(record);
                    }
                    if let Some(body) = &data.body {
                        self.cache.put_body(uid, body);
                    }
                }
                self.handler.on_fetch(*seq, data);
            }
            UntaggedResponse::Vanished { earlier, uids } => {
                if let Some(sync) = &mut self.sync {
                    for id in uids.iter(0) {
                        if let Some(uid) = Uid::new(id) {
                            sync.vanish(uid, *earlier);
                            self.store.remove(uid);
                            self.cache.remove(uid);
                        }
                    }
                }
                self.handler.on_vanished(*earlier, uids);
            }
            UntaggedResponse::Flags(flags) => {
                if let Some(sync) = &mut self.sync {
                    sync.set_flags(flags.clone());
                }
                self.handler.on_flags(flags);
            }
            UntaggedResponse::StatusData(status) => {
                self.statuses.update(status.clone());
            }
            UntaggedResponse::Status { status, code, text } => {
                self.apply_status(*status, code.as_ref(), text)?;
            }
            // Capabilities and ENABLED are the engine's concern; LIST,
            // LSUB and SEARCH rows only mean something to the command
            // that asked for them.
            UntaggedResponse::Capability(_)
            | UntaggedResponse::Enabled(_)
            | UntaggedResponse::List(_)
            | UntaggedResponse::Lsub(_)
            | UntaggedResponse::Search(_) => {}
            UntaggedResponse::Unknown(line) => {
                trace!(line = %line, "unhandled untagged response");
            }
        }
        Ok(())
    }

    fn apply_status(
        &mut self,
        status: Status,
        code: Option<&ResponseCode>,
        text: &str,
    ) -> Result<()> {
        if let Some(code) = code {
            self.apply_code(code, text);
        }
        match status {
            Status::Ok | Status::PreAuth => {
                self.handler.on_info(text);
                Ok(())
            }
            Status::No | Status::Bad => {
                self.handler.on_warning(text);
                Ok(())
            }
            Status::Bye => {
                self.handler.on_bye(text);
                if self.quitting {
                    return Ok(());
                }
                let orphaned = self.protocol.reset();
                if !orphaned.is_empty() {
                    warn!(?orphaned, "commands orphaned by BYE");
                }
                Err(Error::Bye(text.to_string()))
            }
        }
    }

    /// Applies a response code wherever it arrived, in a completion or
    /// an untagged status line.
    fn apply_code(&mut self, code: &ResponseCode, text: &str) {
        if matches!(code, ResponseCode::Alert) {
            self.handler.on_alert(text);
            return;
        }
        let Some(sync) = &mut self.sync else { return };
        let epoch_changed = sync.apply_code(code);
        if let ResponseCode::UidValidity(validity) = code {
            if epoch_changed {
                debug!(%validity, "UID epoch changed, dropping every held record");
                self.store.clear();
            }
            self.cache.set_epoch(*validity);
        }
    }

    fn apply_completion(&mut self, outcome: &CommandOutcome) {
        if let Some(code) = &outcome.code {
            self.apply_code(code, &outcome.text);
        }
        if outcome.is_ok() {
            if matches!(outcome.command, Command::Close | Command::Logout) {
                self.sync = None;
            }
        } else if matches!(
            outcome.command,
            Command::Select { .. } | Command::Examine { .. }
        ) {
            // A failed open leaves no mailbox selected, whatever was
            // open before.
            self.sync = None;
        }
    }

    // ------------------------------------------------------------------
    // Login and capabilities
    // ------------------------------------------------------------------

    /// Authenticates with LOGIN. Refused locally when the server has
    /// announced LOGINDISABLED, so credentials never travel a channel
    /// the server considers unsafe.
    pub async fn login(&mut self, username: &str, password: &str) -> Result<()> {
        if self.protocol.capabilities().has(&Capability::LoginDisabled) {
            return Err(Error::Auth(
                "server has disabled LOGIN; negotiate TLS or use AUTHENTICATE".to_string(),
            ));
        }
        let command = Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        };
        let outcome = self.execute(command, ExecOptions::default()).await?;
        self.refresh_capabilities(&outcome).await
    }

    /// Authenticates with AUTHENTICATE PLAIN, inline when the server
    /// supports SASL-IR and via a continuation round trip otherwise.
    pub async fn authenticate_plain(&mut self, username: &str, password: &str) -> Result<()> {
        if !self.protocol.capabilities().has_auth("PLAIN") {
            return Err(Error::Auth(
                "server does not advertise AUTH=PLAIN".to_string(),
            ));
        }
        let response = BASE64.encode(format!("\0{username}\0{password}"));
        let initial = self.protocol.capabilities().has(&Capability::SaslIr);
        let command = Command::Authenticate {
            mechanism: "PLAIN".to_string(),
            response,
            initial,
        };
        let outcome = self.execute(command, ExecOptions::default()).await?;
        self.refresh_capabilities(&outcome).await
    }

    /// Re-requests capabilities unless the completion carried them.
    /// Servers commonly extend the advertised set once a connection is
    /// authenticated.
    async fn refresh_capabilities(&mut self, outcome: &CommandOutcome) -> Result<()> {
        if matches!(outcome.code, Some(ResponseCode::Capability(_))) {
            return Ok(());
        }
        self.run(Command::Capability, ExecOptions::default()).await?;
        Ok(())
    }

    /// Enables QRESYNC when the server offers it, else CONDSTORE, so
    /// later SELECTs can carry resync parameters. A server without
    /// ENABLE leaves the session as it is.
    pub async fn enable_extensions(&mut self) -> Result<()> {
        if !self.protocol.capabilities().has(&Capability::Enable) {
            return Ok(());
        }
        let wanted = if self.protocol.capabilities().has(&Capability::QResync) {
            vec![Capability::QResync]
        } else if self.protocol.capabilities().has(&Capability::CondStore) {
            vec![Capability::CondStore]
        } else {
            return Ok(());
        };
        self.execute(Command::Enable { capabilities: wanted }, ExecOptions::default())
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Mailbox lifecycle
    // ------------------------------------------------------------------

    /// Opens a mailbox with SELECT (or EXAMINE when `read_only`).
    ///
    /// When QRESYNC is enabled and a checkpoint from an earlier session
    /// exists, cached records are restored and the server is asked to
    /// replay only what changed since; otherwise the index starts
    /// empty. Opening a mailbox while another is open checkpoints the
    /// old one first.
    pub async fn open(&mut self, mailbox: &Mailbox, read_only: bool) -> Result<SelectSummary> {
        if self.sync.is_some() {
            self.save_checkpoint();
        }
        self.cache = self.cache_for(mailbox);
        self.store.clear();

        let mut sync = MailboxSync::new(mailbox.clone());

        let resume = if self.protocol.capabilities().is_enabled(&Capability::QResync) {
            self.cache.checkpoint().and_then(|cp| cp.to_params())
        } else {
            None
        };
        if let Some(params) = &resume {
            // Seed the index with the checkpoint epoch. If the server
            // answers with a different UIDVALIDITY, the normal epoch
            // change path purges everything restored here.
            sync.apply_code(&ResponseCode::UidValidity(params.uid_validity));
            self.cache.set_epoch(params.uid_validity);
            if let Some(known) = &params.known_uids {
                let mut restored = 0_usize;
                for id in known.iter(0) {
                    if let Some(uid) = Uid::new(id)
                        && let Some(record) = self.cache.record(uid)
                    {
                        self.store.insert(record);
                        restored += 1;
                    }
                }
                debug!(mailbox = %mailbox, restored, "warm-started records from cache");
            }
        }
        let condstore = resume.is_none() && self.protocol.capabilities().has(&Capability::CondStore);

        let command = if read_only {
            Command::Examine {
                mailbox: mailbox.clone(),
                condstore,
                qresync: resume,
            }
        } else {
            Command::Select {
                mailbox: mailbox.clone(),
                condstore,
                qresync: resume,
            }
        };

        self.sync = Some(sync);
        if let Err(err) = self.execute(command, ExecOptions::default()).await {
            self.sync = None;
            return Err(err);
        }

        let sync = self
            .sync
            .as_ref()
            .ok_or_else(|| Error::InvalidState("mailbox closed during open".to_string()))?;
        Ok(SelectSummary {
            mailbox: sync.mailbox().clone(),
            exists: sync.exists(),
            recent: sync.recent(),
            unseen: sync.unseen(),
            uid_validity: sync.uid_validity(),
            uid_next: sync.uid_next(),
            highest_modseq: sync.highest_modseq(),
            read_only: self.protocol.state().is_read_only(),
        })
    }

    /// Closes the open mailbox with CLOSE, checkpointing it first. The
    /// server expunges `\Deleted` messages without reporting them.
    pub async fn close(&mut self) -> Result<()> {
        if self.sync.is_none() {
            return Ok(());
        }
        self.save_checkpoint();
        self.execute(Command::Close, ExecOptions::default()).await?;
        self.sync = None;
        Ok(())
    }

    /// Ends the session with LOGOUT. The expected BYE is not an error
    /// here, and neither is the server hanging up early.
    pub async fn logout(&mut self) -> Result<()> {
        self.save_checkpoint();
        self.quitting = true;
        let result = self
            .execute(
                Command::Logout,
                ExecOptions {
                    fail_is_ok: true,
                    poll_first: false,
                },
            )
            .await;
        self.quitting = false;
        if let Err(err) = result {
            match err {
                Error::Bye(_) | Error::Io(_) | Error::Timeout(_) => {
                    debug!(error = %err, "connection dropped during logout");
                }
                other => return Err(other),
            }
        }
        self.sync = None;
        let orphaned = self.protocol.reset();
        if !orphaned.is_empty() {
            warn!(?orphaned, "commands still queued at logout");
        }
        Ok(())
    }

    fn save_checkpoint(&mut self) {
        let Some(params) = self.sync.as_ref().and_then(MailboxSync::checkpoint) else {
            return;
        };
        self.cache
            .put_checkpoint(&SyncCheckpoint::from_params(&params));
    }

    fn cache_for(&self, mailbox: &Mailbox) -> MessageCache {
        match &self.config.cache_dir {
            Some(root) => {
                MessageCache::on_disk(namespace_dir(root, &self.config.host, mailbox.as_str()))
            }
            None => MessageCache::in_memory(),
        }
    }

    // ------------------------------------------------------------------
    // Keepalive
    // ------------------------------------------------------------------

    /// Gives the session a heartbeat: applies anything the server has
    /// already sent, then sends NOOP if the line has been quiet past
    /// the poll interval.
    ///
    /// Returns `false` when the session closed itself because the owner
    /// has not used it within the configured idle timeout; the session
    /// is logged out and done at that point.
    pub async fn poll(&mut self) -> Result<bool> {
        if let Err(err) = self.drain_ready().await {
            return Err(self.lose_transport(err));
        }

        if self.clock.has_elapsed(self.last_use, self.config.idle_timeout) {
            debug!(
                unused_for = ?self.clock.elapsed(self.last_use),
                "closing session unused past its idle timeout"
            );
            if let Err(err) = self.logout().await {
                debug!(error = %err, "logout during idle shutdown failed");
            }
            return Ok(false);
        }

        if self
            .clock
            .has_elapsed(self.last_activity, self.config.poll_interval)
        {
            self.run(Command::Noop, ExecOptions::default()).await?;
        }

        Ok(true)
    }

    /// Sends NOOP, giving the server an opening to report changes.
    pub async fn noop(&mut self) -> Result<()> {
        self.execute(Command::Noop, ExecOptions::default()).await?;
        Ok(())
    }

    /// Sends CHECK, requesting a server-side checkpoint of the mailbox.
    pub async fn check(&mut self) -> Result<()> {
        self.execute(Command::Check, ExecOptions::default()).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Message operations
    // ------------------------------------------------------------------

    /// Fetches `items` for the given messages. Rows are applied to the
    /// session state as they arrive and returned for inspection.
    pub async fn fetch(
        &mut self,
        sequence: SequenceSet,
        items: FetchItems,
        uid: bool,
    ) -> Result<Vec<(SeqNum, FetchData)>> {
        let command = Command::Fetch {
            sequence,
            items,
            uid,
            changed_since: None,
            vanished: false,
        };
        let outcome = self.execute(command, ExecOptions::default()).await?;
        Ok(collect_fetches(outcome.data))
    }

    /// Fetches flag changes since `changed_since`, letting the server
    /// skip everything untouched. With QRESYNC enabled the reply also
    /// carries VANISHED rows for messages expunged in the meantime.
    pub async fn fetch_changed(
        &mut self,
        sequence: SequenceSet,
        changed_since: ModSeq,
    ) -> Result<Vec<(SeqNum, FetchData)>> {
        let vanished = self
            .protocol
            .capabilities()
            .is_enabled(&Capability::QResync);
        let command = Command::Fetch {
            sequence,
            items: FetchItems::flag_sync(),
            uid: true,
            changed_since: Some(changed_since),
            vanished,
        };
        let outcome = self.execute(command, ExecOptions::default()).await?;
        Ok(collect_fetches(outcome.data))
    }

    /// Fetches UID and flags for messages the index has not mapped yet.
    /// Useful after an EXISTS bump announced new mail.
    pub async fn fetch_new(&mut self, items: FetchItems) -> Result<Vec<(SeqNum, FetchData)>> {
        let unassigned = match &self.sync {
            Some(sync) => sync.unassigned(),
            None => return Err(Error::InvalidState("no mailbox is open".to_string())),
        };
        if unassigned.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch(unassigned, items, false).await
    }

    /// Returns a message body, from the cache when possible and via
    /// `UID FETCH BODY.PEEK[]` otherwise. A fetched body lands in the
    /// cache on its way through.
    pub async fn fetch_body(&mut self, uid: Uid) -> Result<Vec<u8>> {
        if let Some(body) = self.cache.body(uid) {
            trace!(%uid, bytes = body.len(), "body served from cache");
            return Ok(body);
        }
        let command = Command::Fetch {
            sequence: SequenceSet::from_uids([uid]),
            items: FetchItems::peek_body(),
            uid: true,
            changed_since: None,
            vanished: false,
        };
        self.execute(command, ExecOptions::default()).await?;
        self.cache
            .body(uid)
            .ok_or_else(|| Error::Protocol(format!("FETCH completed without a body for UID {uid}")))
    }

    /// Rebuilds the message index by refetching UID and flags for every
    /// message, then drops records and cache entries for messages that
    /// are no longer present.
    pub async fn resync(&mut self) -> Result<()> {
        let (exists, tracks_modseq) = match &self.sync {
            Some(sync) => (sync.exists(), sync.tracks_modseq()),
            None => return Err(Error::InvalidState("no mailbox is open".to_string())),
        };
        if exists > 0 {
            let sequence = SequenceSet::range(1, exists).unwrap_or_else(SequenceSet::all);
            let items = if tracks_modseq {
                FetchItems::flag_sync()
            } else {
                FetchItems::Items(vec![FetchAttribute::Uid, FetchAttribute::Flags])
            };
            let command = Command::Fetch {
                sequence,
                items,
                uid: false,
                changed_since: None,
                vanished: false,
            };
            self.execute(command, ExecOptions::default()).await?;
        }
        if let Some(sync) = &mut self.sync {
            sync.mark_clean();
        }
        if let Some(sync) = &self.sync {
            let live: BTreeSet<Uid> = sync.known_uids().iter(0).filter_map(Uid::new).collect();
            let stale: Vec<Uid> = self
                .store
                .uids()
                .into_iter()
                .filter(|uid| !live.contains(uid))
                .collect();
            for uid in stale {
                debug!(%uid, "dropping record for a message gone from the mailbox");
                self.store.remove(uid);
                self.cache.remove(uid);
            }
            self.cache.clean(&live);
        }
        Ok(())
    }

    /// Changes message flags. Returns the messages the server refused
    /// to touch when the action carried an UNCHANGEDSINCE guard.
    pub async fn store_flags(
        &mut self,
        sequence: SequenceSet,
        action: StoreAction,
        uid: bool,
    ) -> Result<Option<SequenceSet>> {
        let command = Command::Store {
            sequence,
            action,
            uid,
        };
        let outcome = self.execute(command, ExecOptions::default()).await?;
        match &outcome.code {
            Some(ResponseCode::Modified(set)) => Ok(Some(SequenceSet::parse(set)?)),
            _ => Ok(None),
        }
    }

    /// Expunges `\Deleted` messages, returning the sequence numbers the
    /// server reported as removed. The index, store and cache have
    /// already been updated when this returns.
    pub async fn expunge(&mut self) -> Result<Vec<SeqNum>> {
        let outcome = self
            .execute(Command::Expunge, ExecOptions::default())
            .await?;
        Ok(collect_expunges(outcome.data))
    }

    /// Expunges only the given UIDs where the server supports UIDPLUS,
    /// and falls back to a plain EXPUNGE (which removes every
    /// `\Deleted` message) where it does not.
    pub async fn uid_expunge(&mut self, uids: SequenceSet) -> Result<Vec<SeqNum>> {
        let command = if self.protocol.capabilities().has(&Capability::UidPlus) {
            Command::UidExpunge { uids }
        } else {
            debug!("UIDPLUS not available, expunging all deleted messages");
            Command::Expunge
        };
        let outcome = self.execute(command, ExecOptions::default()).await?;
        Ok(collect_expunges(outcome.data))
    }

    /// Runs a SEARCH and returns the matching message numbers (UIDs
    /// when `uid` is set).
    pub async fn search(&mut self, criteria: SearchCriteria, uid: bool) -> Result<Vec<u32>> {
        let outcome = self
            .execute(Command::Search { criteria, uid }, ExecOptions::default())
            .await?;
        let mut ids = Vec::new();
        for row in outcome.data {
            if let UntaggedResponse::Search(found) = row {
                ids.extend(found);
            }
        }
        Ok(ids)
    }

    /// Copies messages to another mailbox, creating it on TRYCREATE.
    /// Returns the COPYUID mapping when the server provides one.
    pub async fn copy(
        &mut self,
        sequence: SequenceSet,
        destination: &Mailbox,
        uid: bool,
    ) -> Result<Option<(UidValidity, SequenceSet, SequenceSet)>> {
        let command = Command::Copy {
            sequence,
            mailbox: destination.clone(),
            uid,
        };
        let outcome = self.execute_or_create(command, destination).await?;
        Ok(copied_uids(outcome.code.as_ref()))
    }

    /// Moves messages to another mailbox. Uses MOVE when advertised;
    /// otherwise copies, marks the sources `\Deleted` and expunges
    /// them.
    pub async fn move_messages(
        &mut self,
        sequence: SequenceSet,
        destination: &Mailbox,
        uid: bool,
    ) -> Result<()> {
        if self.protocol.capabilities().has(&Capability::Move) {
            let command = Command::Move {
                sequence,
                mailbox: destination.clone(),
                uid,
            };
            self.execute_or_create(command, destination).await?;
            return Ok(());
        }

        debug!(destination = %destination, "MOVE not available, using copy and expunge");
        self.copy(sequence.clone(), destination, uid).await?;
        let action = StoreAction::add(Flags::from_iter([Flag::Deleted])).silent();
        self.store_flags(sequence.clone(), action, uid).await?;
        if uid {
            self.uid_expunge(sequence).await?;
        } else {
            self.expunge().await?;
        }
        Ok(())
    }

    /// Appends a message, creating the mailbox on TRYCREATE. Returns
    /// the assigned UID when the server reports APPENDUID.
    ///
    /// `internal_date` is RFC 3501 date-time text, for example
    /// `05-Nov-2024 12:30:00 +0000`; when `None` the server stamps the
    /// arrival time.
    pub async fn append(
        &mut self,
        mailbox: &Mailbox,
        flags: Flags,
        internal_date: Option<&str>,
        message: Vec<u8>,
    ) -> Result<Option<(UidValidity, Uid)>> {
        let command = Command::Append {
            mailbox: mailbox.clone(),
            flags,
            internal_date: internal_date.map(ToOwned::to_owned),
            message,
        };
        let outcome = self.execute_or_create(command, mailbox).await?;
        if let Some(ResponseCode::AppendUid { uidvalidity, uid }) = outcome.code {
            Ok(Some((uidvalidity, uid)))
        } else {
            Ok(None)
        }
    }

    /// Runs a command that targets `destination`; on a NO [TRYCREATE]
    /// refusal, creates the mailbox and retries once.
    async fn execute_or_create(
        &mut self,
        command: Command,
        destination: &Mailbox,
    ) -> Result<CommandOutcome> {
        let retry = command.clone();
        let outcome = self
            .execute(
                command,
                ExecOptions {
                    fail_is_ok: true,
                    poll_first: false,
                },
            )
            .await?;
        if outcome.is_ok() {
            return Ok(outcome);
        }
        if matches!(outcome.code, Some(ResponseCode::TryCreate)) {
            debug!(mailbox = %destination, "destination missing, creating it and retrying");
            self.execute(
                Command::Create {
                    mailbox: destination.clone(),
                },
                ExecOptions::default(),
            )
            .await?;
            return self.execute(retry, ExecOptions::default()).await;
        }
        Err(Error::No(outcome.text))
    }

    // ------------------------------------------------------------------
    // Mailbox management
    // ------------------------------------------------------------------

    /// Lists mailboxes matching `pattern` under `reference`.
    pub async fn list(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let command = Command::List {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
        };
        let outcome = self.execute(command, ExecOptions::default()).await?;
        Ok(collect_listings(outcome.data))
    }

    /// Lists subscribed mailboxes matching `pattern` under `reference`.
    pub async fn lsub(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let command = Command::Lsub {
            reference: reference.to_string(),
            pattern: pattern.to_string(),
        };
        let outcome = self.execute(command, ExecOptions::default()).await?;
        Ok(collect_listings(outcome.data))
    }

    /// Queries a mailbox's counters without opening it. The result also
    /// lands in [`Session::statuses`].
    pub async fn status(
        &mut self,
        mailbox: &Mailbox,
        items: Vec<StatusAttribute>,
    ) -> Result<MailboxStatus> {
        let command = Command::Status {
            mailbox: mailbox.clone(),
            items,
        };
        let outcome = self.execute(command, ExecOptions::default()).await?;
        outcome
            .data
            .into_iter()
            .find_map(|row| match row {
                UntaggedResponse::StatusData(status) => Some(status),
                _ => None,
            })
            .ok_or_else(|| Error::Protocol("STATUS completed without a status row".to_string()))
    }

    /// Creates a mailbox.
    pub async fn create(&mut self, mailbox: &Mailbox) -> Result<()> {
        self.execute(
            Command::Create {
                mailbox: mailbox.clone(),
            },
            ExecOptions::default(),
        )
        .await?;
        Ok(())
    }

    /// Deletes a mailbox and forgets any cached STATUS for it.
    pub async fn delete(&mut self, mailbox: &Mailbox) -> Result<()> {
        self.execute(
            Command::Delete {
                mailbox: mailbox.clone(),
            },
            ExecOptions::default(),
        )
        .await?;
        self.statuses.remove(mailbox);
        Ok(())
    }

    /// Renames a mailbox and forgets any cached STATUS for the old
    /// name.
    pub async fn rename(&mut self, from: &Mailbox, to: &Mailbox) -> Result<()> {
        self.execute(
            Command::Rename {
                from: from.clone(),
                to: to.clone(),
            },
            ExecOptions::default(),
        )
        .await?;
        self.statuses.remove(from);
        Ok(())
    }

    /// Subscribes to a mailbox.
    pub async fn subscribe(&mut self, mailbox: &Mailbox) -> Result<()> {
        self.execute(
            Command::Subscribe {
                mailbox: mailbox.clone(),
            },
            ExecOptions::default(),
        )
        .await?;
        Ok(())
    }

    /// Unsubscribes from a mailbox.
    pub async fn unsubscribe(&mut self, mailbox: &Mailbox) -> Result<()> {
        self.execute(
            Command::Unsubscribe {
                mailbox: mailbox.clone(),
            },
            ExecOptions::default(),
        )
        .await?;
        Ok(())
    }
}

impl<S> fmt::Debug for Session<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.config.host)
            .field("state", self.protocol.state())
            .field(
                "mailbox",
                &self.sync.as_ref().map(MailboxSync::mailbox).map(Mailbox::as_str),
            )
            .finish_non_exhaustive()
    }
}

/// Reads and validates the greeting on a fresh connection.
async fn greet<S>(
    framed: &mut FramedStream<S>,
    protocol: &mut Protocol,
    wait: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let unit = timeout(wait, framed.read_unit())
        .await
        .map_err(|_| Error::Timeout(wait))??;
    match protocol.receive(&unit)? {
        ProtocolEvent::Untagged(UntaggedResponse::Status { status, .. }) => {
            protocol.greeted(status)
        }
        _ => Err(Error::Protocol("expected a server greeting".to_string())),
    }
}

/// Runs one command during connection bootstrap, before a [`Session`]
/// exists to do the bookkeeping.
async fn run_command<S>(
    framed: &mut FramedStream<S>,
    protocol: &mut Protocol,
    command: Command,
    wait: Duration,
) -> Result<CommandOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let tag = protocol.enqueue(command)?;
    while let Some(transmit) = protocol.poll_transmit() {
        timeout(wait, framed.write_unit(&transmit.data))
            .await
            .map_err(|_| Error::Timeout(wait))??;
    }
    loop {
        let unit = timeout(wait, framed.read_unit())
            .await
            .map_err(|_| Error::Timeout(wait))??;
        match protocol.receive(&unit)? {
            ProtocolEvent::Completed(outcome) if outcome.tag == tag => {
                return match outcome.status {
                    Status::Ok | Status::PreAuth => Ok(outcome),
                    Status::No => Err(Error::No(outcome.text)),
                    Status::Bad => Err(Error::Bad(outcome.text)),
                    Status::Bye => Err(Error::Bye(outcome.text)),
                };
            }
            ProtocolEvent::Untagged(UntaggedResponse::Status {
                status: Status::Bye,
                text,
                ..
            }) => return Err(Error::Bye(text)),
            ProtocolEvent::Untagged(row) => protocol.absorb(row),
            _ => {}
        }
    }
}

fn collect_fetches(rows: Vec<UntaggedResponse>) -> Vec<(SeqNum, FetchData)> {
    rows.into_iter()
        .filter_map(|row| match row {
            UntaggedResponse::Fetch { seq, data } => Some((seq, data)),
            _ => None,
        })
        .collect()
}

fn collect_expunges(rows: Vec<UntaggedResponse>) -> Vec<SeqNum> {
    rows.into_iter()
        .filter_map(|row| match row {
            UntaggedResponse::Expunge(seq) => Some(seq),
            _ => None,
        })
        .collect()
}

fn collect_listings(rows: Vec<UntaggedResponse>) -> Vec<ListEntry> {
    rows.into_iter()
        .filter_map(|row| match row {
            UntaggedResponse::List(entry) | UntaggedResponse::Lsub(entry) => Some(entry),
            _ => None,
        })
        .collect()
}

fn copied_uids(code: Option<&ResponseCode>) -> Option<(UidValidity, SequenceSet, SequenceSet)> {
    if let Some(ResponseCode::CopyUid {
        uidvalidity,
        source,
        dest,
    }) = code
    {
        let source = SequenceSet::parse(source).ok()?;
        let dest = SequenceSet::parse(dest).ok()?;
        Some((*uidvalidity, source, dest))
    } else {
        None
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
    use std::sync::Arc;

    use tokio_test::io::Builder;

    use super::*;
    use crate::time::MockClock;

    fn config() -> AccountConfig {
        AccountConfig::builder("mail.example.com")
            .security(Security::None)
            .build()
    }

    const GREETING: &[u8] =
        b"* OK [CAPABILITY IMAP4rev1 IDLE UIDPLUS MOVE CONDSTORE QRESYNC ENABLE AUTH=PLAIN SASL-IR] ready\r\n";

    mod bootstrap {
        use super::*;

        #[tokio::test]
        async fn greeting_capabilities_skip_the_round_trip() {
            let mock = Builder::new().read(GREETING).build();
            let session = Session::from_stream(mock, config()).await.unwrap();
            assert!(session.capabilities().has(&Capability::Imap4Rev1));
            assert!(session.capabilities().has(&Capability::Idle));
            assert_eq!(*session.state(), SessionState::Connected);
        }

        #[tokio::test]
        async fn bare_greeting_triggers_a_capability_request() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"a0000 CAPABILITY\r\n")
                .read(b"* CAPABILITY IMAP4rev1 UIDPLUS\r\n")
                .read(b"a0000 OK done\r\n")
                .build();
            let session = Session::from_stream(mock, config()).await.unwrap();
            assert!(session.capabilities().has(&Capability::UidPlus));
        }

        #[tokio::test]
        async fn preauth_greeting_lands_authenticated() {
            let mock = Builder::new()
                .read(b"* PREAUTH [CAPABILITY IMAP4rev1] welcome back\r\n")
                .build();
            let session = Session::from_stream(mock, config()).await.unwrap();
            assert_eq!(*session.state(), SessionState::Authenticated);
        }

        #[tokio::test]
        async fn bye_greeting_is_an_error() {
            let mock = Builder::new().read(b"* BYE overloaded\r\n").build();
            let err = Session::from_stream(mock, config()).await.unwrap_err();
            assert!(matches!(err, Error::Bye(_)));
        }
    }

    mod auth {
        use super::*;

        #[tokio::test]
        async fn login_reaches_authenticated() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 LOGIN ana secret\r\n")
                .read(b"a0000 OK [CAPABILITY IMAP4rev1 IDLE UNSELECT] done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            session.login("ana", "secret").await.unwrap();
            assert_eq!(*session.state(), SessionState::Authenticated);
            // The completion carried capabilities, so no extra request.
            assert!(session.capabilities().has(&Capability::Unselect));
        }

        #[tokio::test]
        async fn login_refused_while_disabled() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1 LOGINDISABLED] ready\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let err = session.login("ana", "secret").await.unwrap_err();
            assert!(matches!(err, Error::Auth(_)));
        }

        #[tokio::test]
        async fn plain_auth_goes_inline_with_sasl_ir() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 AUTHENTICATE PLAIN AGFuYQBzZWNyZXQ=\r\n")
                .read(b"a0000 OK [CAPABILITY IMAP4rev1 IDLE] done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            session.authenticate_plain("ana", "secret").await.unwrap();
            assert_eq!(*session.state(), SessionState::Authenticated);
        }

        #[tokio::test]
        async fn plain_auth_waits_for_the_continuation_without_sasl_ir() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n")
                .write(b"a0000 AUTHENTICATE PLAIN\r\n")
                .read(b"+ \r\n")
                .write(b"AGFuYQBzZWNyZXQ=\r\n")
                .read(b"a0000 OK [CAPABILITY IMAP4rev1] done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            session.authenticate_plain("ana", "secret").await.unwrap();
            assert_eq!(*session.state(), SessionState::Authenticated);
        }

        #[tokio::test]
        async fn failed_login_reports_the_server_text() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 LOGIN ana wrong\r\n")
                .read(b"a0000 NO [AUTHENTICATIONFAILED] bad credentials\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let err = session.login("ana", "wrong").await.unwrap_err();
            assert!(matches!(err, Error::No(text) if text.contains("bad credentials")));
        }
    }

    mod opening {
        use super::*;

        #[tokio::test]
        async fn select_summary_reflects_the_untagged_rows() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
                .write(b"a0000 SELECT INBOX\r\n")
                .read(b"* 3 EXISTS\r\n")
                .read(b"* 1 RECENT\r\n")
                .read(b"* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n")
                .read(b"* OK [UIDVALIDITY 3857529045] UIDs valid\r\n")
                .read(b"* OK [UIDNEXT 4392] predicted next\r\n")
                .read(b"* OK [UNSEEN 2] first unseen\r\n")
                .read(b"a0000 OK [READ-WRITE] SELECT completed\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let summary = session.open(&Mailbox::inbox(), false).await.unwrap();

            assert_eq!(summary.exists, 3);
            assert_eq!(summary.recent, 1);
            assert_eq!(summary.unseen, SeqNum::new(2));
            assert_eq!(summary.uid_validity, UidValidity::new(3857529045));
            assert_eq!(summary.uid_next, Uid::new(4392));
            assert!(!summary.read_only);
            assert!(session.state().is_selected());
            assert_eq!(session.mailbox(), Some(&Mailbox::inbox()));
        }

        #[tokio::test]
        async fn examine_is_read_only() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
                .write(b"a0000 EXAMINE Archive\r\n")
                .read(b"* 0 EXISTS\r\n")
                .read(b"* 0 RECENT\r\n")
                .read(b"a0000 OK [READ-ONLY] done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let summary = session.open(&Mailbox::new("Archive"), true).await.unwrap();
            assert!(summary.read_only);
        }

        #[tokio::test]
        async fn failed_select_leaves_nothing_open() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
                .write(b"a0000 SELECT Missing\r\n")
                .read(b"a0000 NO no such mailbox\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let err = session
                .open(&Mailbox::new("Missing"), false)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::No(_)));
            assert!(session.mailbox().is_none());
            assert!(!session.state().is_selected());
        }

        #[tokio::test]
        async fn condstore_is_requested_when_advertised() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1 CONDSTORE] ready\r\n")
                .write(b"a0000 SELECT INBOX (CONDSTORE)\r\n")
                .read(b"* 1 EXISTS\r\n")
                .read(b"* OK [HIGHESTMODSEQ 715194045007] tracked\r\n")
                .read(b"a0000 OK done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let summary = session.open(&Mailbox::inbox(), false).await.unwrap();
            assert_eq!(summary.highest_modseq, ModSeq::new(715194045007));
        }
    }

    mod messages {
        use super::*;

        async fn selected_session() -> Session<tokio_test::io::Mock> {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1 UIDPLUS] ready\r\n")
                .write(b"a0000 SELECT INBOX\r\n")
                .read(b"* 3 EXISTS\r\n")
                .read(b"* OK [UIDVALIDITY 99] valid\r\n")
                .read(b"a0000 OK done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            session.open(&Mailbox::inbox(), false).await.unwrap();
            session
        }

        /// Swaps in a fresh mock for the next exchange; the previous
        /// script must be fully consumed by now.
        fn rewire(session: &mut Session<tokio_test::io::Mock>, mock: tokio_test::io::Mock) {
            session.framed = FramedStream::new(mock);
        }

        #[tokio::test]
        async fn fetch_rows_land_in_the_store() {
            let mut session = selected_session().await;
            rewire(
                &mut session,
                Builder::new()
                    .write(b"a0001 FETCH 1:3 (UID FLAGS MODSEQ)\r\n")
                    .read(b"* 1 FETCH (UID 101 FLAGS (\\Seen))\r\n")
                    .read(b"* 2 FETCH (UID 102 FLAGS ())\r\n")
                    .read(b"* 3 FETCH (UID 103 FLAGS (\\Answered \\Seen))\r\n")
                    .read(b"a0001 OK done\r\n")
                    .build(),
            );
            let rows = session
                .fetch(
                    SequenceSet::range(1, 3).unwrap(),
                    FetchItems::flag_sync(),
                    false,
                )
                .await
                .unwrap();

            assert_eq!(rows.len(), 3);
            assert_eq!(session.store().len(), 3);
            let record = session.record(Uid::new(103).unwrap()).unwrap();
            assert!(record.flags.contains(&Flag::Answered));
            // The index can now translate both directions.
            let sync = session.sync().unwrap();
            assert_eq!(sync.uid_at(SeqNum::new(2).unwrap()), Uid::new(102));
            assert_eq!(sync.msn_of(Uid::new(101).unwrap()), SeqNum::new(1));
        }

        #[tokio::test]
        async fn expunge_during_fetch_shifts_the_index() {
            let mut session = selected_session().await;
            rewire(
                &mut session,
                Builder::new()
                    .write(b"a0001 FETCH 1:3 (UID FLAGS MODSEQ)\r\n")
                    .read(b"* 1 FETCH (UID 101 FLAGS ())\r\n")
                    .read(b"* 2 EXPUNGE\r\n")
                    .read(b"* 2 FETCH (UID 103 FLAGS (\\Seen))\r\n")
                    .read(b"a0001 OK done\r\n")
                    .build(),
            );
            session
                .fetch(
                    SequenceSet::range(1, 3).unwrap(),
                    FetchItems::flag_sync(),
                    false,
                )
                .await
                .unwrap();

            // Message 2 left mid-response; the second FETCH row's
            // sequence number 2 refers to what was message 3.
            let sync = session.sync().unwrap();
            assert_eq!(sync.exists(), 2);
            assert_eq!(sync.uid_at(SeqNum::new(1).unwrap()), Uid::new(101));
            assert_eq!(sync.uid_at(SeqNum::new(2).unwrap()), Uid::new(103));
        }

        #[tokio::test]
        async fn store_reports_the_modified_set() {
            let mut session = selected_session().await;
            rewire(
                &mut session,
                Builder::new()
                    .write(b"a0001 UID STORE 101:103 (UNCHANGEDSINCE 12345) FLAGS (\\Deleted)\r\n")
                    .read(b"* 1 FETCH (UID 101 FLAGS (\\Deleted) MODSEQ (12346))\r\n")
                    .read(b"a0001 OK [MODIFIED 102,103] conditional store done\r\n")
                    .build(),
            );
            let action = StoreAction::replace(Flags::from_iter([Flag::Deleted]))
                .unchanged_since(ModSeq::new(12345).unwrap());
            let modified = session
                .store_flags(SequenceSet::parse("101:103").unwrap(), action, true)
                .await
                .unwrap();
            assert_eq!(modified, Some(SequenceSet::parse("102,103").unwrap()));
        }

        #[tokio::test]
        async fn expunge_returns_removed_sequence_numbers() {
            let mut session = selected_session().await;
            rewire(
                &mut session,
                Builder::new()
                    .write(b"a0001 EXPUNGE\r\n")
                    .read(b"* 3 EXPUNGE\r\n")
                    .read(b"* 1 EXPUNGE\r\n")
                    .read(b"a0001 OK done\r\n")
                    .build(),
            );
            let removed = session.expunge().await.unwrap();
            assert_eq!(
                removed,
                vec![SeqNum::new(3).unwrap(), SeqNum::new(1).unwrap()]
            );
            assert_eq!(session.sync().unwrap().exists(), 1);
        }

        #[tokio::test]
        async fn append_returns_the_assigned_uid() {
            let mut session = selected_session().await;
            rewire(
                &mut session,
                Builder::new()
                    .write(b"a0001 APPEND Drafts (\\Draft) {14}\r\n")
                    .read(b"+ go ahead\r\n")
                    .write(b"From: a\r\n\r\nhi\r\n")
                    .read(b"a0001 OK [APPENDUID 99 4400] done\r\n")
                    .build(),
            );
            let assigned = session
                .append(
                    &Mailbox::new("Drafts"),
                    Flags::from_iter([Flag::Draft]),
                    None,
                    b"From: a\r\n\r\nhi".to_vec(),
                )
                .await
                .unwrap();
            assert_eq!(
                assigned,
                Some((UidValidity::new(99).unwrap(), Uid::new(4400).unwrap()))
            );
        }

        #[tokio::test]
        async fn copy_creates_the_destination_on_trycreate() {
            let mut session = selected_session().await;
            rewire(
                &mut session,
                Builder::new()
                    .write(b"a0001 UID COPY 101 Archive\r\n")
                    .read(b"a0001 NO [TRYCREATE] no such mailbox\r\n")
                    .write(b"a0002 CREATE Archive\r\n")
                    .read(b"a0002 OK created\r\n")
                    .write(b"a0003 UID COPY 101 Archive\r\n")
                    .read(b"a0003 OK [COPYUID 77 101 1] done\r\n")
                    .build(),
            );
            let mapping = session
                .copy(
                    SequenceSet::single(101).unwrap(),
                    &Mailbox::new("Archive"),
                    true,
                )
                .await
                .unwrap();
            let (validity, source, dest) = mapping.unwrap();
            assert_eq!(validity.get(), 77);
            assert_eq!(source.to_string(), "101");
            assert_eq!(dest.to_string(), "1");
        }

        #[tokio::test]
        async fn move_falls_back_to_copy_and_expunge() {
            // The capability list lacks MOVE on purpose.
            let mut session = selected_session().await;
            rewire(
                &mut session,
                Builder::new()
                    .write(b"a0001 UID COPY 101 Archive\r\n")
                    .read(b"a0001 OK done\r\n")
                    .write(b"a0002 UID STORE 101 +FLAGS.SILENT (\\Deleted)\r\n")
                    .read(b"a0002 OK done\r\n")
                    .write(b"a0003 UID EXPUNGE 101\r\n")
                    .read(b"a0003 OK done\r\n")
                    .build(),
            );
            session
                .move_messages(
                    SequenceSet::single(101).unwrap(),
                    &Mailbox::new("Archive"),
                    true,
                )
                .await
                .unwrap();
        }

        #[tokio::test]
        async fn fetched_bodies_come_from_cache_the_second_time() {
            let mut session = selected_session().await;
            rewire(
                &mut session,
                Builder::new()
                    .write(b"a0001 UID FETCH 101 (UID BODY.PEEK[])\r\n")
                    .read(b"* 1 FETCH (UID 101 BODY[] {11}\r\nhello there)\r\n")
                    .read(b"a0001 OK done\r\n")
                    .build(),
            );
            let uid = Uid::new(101).unwrap();
            let body = session.fetch_body(uid).await.unwrap();
            assert_eq!(body, b"hello there");
            // No further I/O is scripted; a second call must hit the
            // cache or panic the mock.
            let again = session.fetch_body(uid).await.unwrap();
            assert_eq!(again, b"hello there");
        }
    }

    mod queued {
        use super::*;

        #[tokio::test]
        async fn submissions_coalesce_until_finish() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 NOOP\r\n")
                .write(b"a0001 CHECK\r\n")
                .read(b"* 5 EXISTS\r\n")
                .read(b"a0000 OK noop done\r\n")
                .read(b"a0001 OK check done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();

            let first = session.submit(Command::Noop).unwrap();
            let second = session.submit(Command::Check).unwrap();

            // Finishing the later command first exercises the stash.
            let check = session.finish(&second).await.unwrap();
            assert!(check.is_ok());
            let noop = session.finish(&first).await.unwrap();
            assert!(noop.is_ok());
            // The EXISTS row belonged to the oldest in-flight command.
            assert_eq!(noop.data.len(), 1);
        }

        #[tokio::test]
        async fn fail_is_ok_returns_the_no_outcome() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 CHECK\r\n")
                .read(b"a0000 NO not now\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let outcome = session
                .execute(
                    Command::Check,
                    ExecOptions {
                        fail_is_ok: true,
                        poll_first: false,
                    },
                )
                .await
                .unwrap();
            assert_eq!(outcome.status, Status::No);
        }
    }

    mod lifecycle {
        use super::*;

        #[tokio::test]
        async fn logout_tolerates_the_bye() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 LOGOUT\r\n")
                .read(b"* BYE see you\r\n")
                .read(b"a0000 OK bye\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            session.logout().await.unwrap();
            assert_eq!(*session.state(), SessionState::Disconnected);
        }

        #[tokio::test]
        async fn unexpected_bye_fails_the_command() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 NOOP\r\n")
                .read(b"* BYE shutting down\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let err = session.noop().await.unwrap_err();
            assert!(matches!(err, Error::Bye(_)));
            assert_eq!(*session.state(), SessionState::Disconnected);
        }

        #[tokio::test]
        async fn poll_sends_noop_after_a_quiet_interval() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 NOOP\r\n")
                .read(b"* 2 EXISTS\r\n")
                .read(b"a0000 OK done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let clock = MockClock::shared();
            session.set_clock(Box::new(Arc::clone(&clock)));

            clock.advance(Duration::from_secs(61));
            assert!(session.poll().await.unwrap());
        }

        #[tokio::test]
        async fn poll_stays_quiet_inside_the_interval() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 NOOP\r\n")
                .read(b"a0000 OK done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let clock = MockClock::shared();
            session.set_clock(Box::new(Arc::clone(&clock)));

            // Inside the interval nothing is written; the mock would panic
            // if a NOOP went out early.
            clock.advance(Duration::from_secs(10));
            assert!(session.poll().await.unwrap());

            // Crossing the interval consumes the scripted NOOP.
            clock.advance(Duration::from_secs(51));
            assert!(session.poll().await.unwrap());
        }

        #[tokio::test]
        async fn poll_logs_out_an_unused_session() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 LOGOUT\r\n")
                .read(b"* BYE idle too long\r\n")
                .read(b"a0000 OK bye\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let clock = MockClock::shared();
            session.set_clock(Box::new(Arc::clone(&clock)));

            clock.advance(Duration::from_secs(1801));
            assert!(!session.poll().await.unwrap());
            assert_eq!(*session.state(), SessionState::Disconnected);
        }
    }

    mod listings {
        use super::*;

        #[tokio::test]
        async fn list_collects_entries() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 LIST \"\" \"*\"\r\n")
                .read(b"* LIST (\\HasNoChildren) \".\" INBOX\r\n")
                .read(b"* LIST (\\Noselect \\HasChildren) \".\" Archive\r\n")
                .read(b"a0000 OK done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let entries = session.list("", "*").await.unwrap();
            assert_eq!(entries.len(), 2);
            assert!(entries[0].selectable());
            assert!(!entries[1].selectable());
        }

        #[tokio::test]
        async fn status_feeds_the_ring() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 STATUS Archive (MESSAGES UIDNEXT)\r\n")
                .read(b"* STATUS Archive (MESSAGES 231 UIDNEXT 44292)\r\n")
                .read(b"a0000 OK done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let status = session
                .status(
                    &Mailbox::new("Archive"),
                    vec![StatusAttribute::Messages, StatusAttribute::UidNext],
                )
                .await
                .unwrap();
            assert_eq!(status.messages, 231);
            let cached = session.cached_status(&Mailbox::new("Archive")).unwrap();
            assert_eq!(cached.uid_next, Uid::new(44292));
        }

        #[tokio::test]
        async fn search_concatenates_result_rows() {
            let mock = Builder::new()
                .read(GREETING)
                .write(b"a0000 UID SEARCH UNSEEN\r\n")
                .read(b"* SEARCH 4 77 102\r\n")
                .read(b"a0000 OK done\r\n")
                .build();
            let mut session = Session::from_stream(mock, config()).await.unwrap();
            let found = session.search(SearchCriteria::Unseen, true).await.unwrap();
            assert_eq!(found, vec![4, 77, 102]);
        }
    }
}

//! Waiting for the server to speak first.
//!
//! [`Session::idle`] parks the connection in IDLE so mailbox changes
//! arrive the moment they happen. Servers without the extension get a
//! transparent fallback that sleeps and then asks with NOOP. Either
//! way the caller loops on [`IdleHandle::wait`] and reacts when it
//! reports activity.

use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tracing::debug;

use super::session::{ExecOptions, Ingested, Session};
use crate::command::Command;
use crate::error::Result;
use crate::types::Capability;

/// How long one IDLE is allowed to run before it is restarted. Servers
/// may drop a connection idle for 30 minutes, so RFC 2177 advises
/// finishing earlier than that.
const IDLE_REFRESH: Duration = Duration::from_secs(28 * 60);

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Starts waiting for server-initiated updates.
    ///
    /// Enters IDLE when the server advertises it; otherwise the
    /// returned handle polls with NOOP. The session is borrowed until
    /// the handle is dropped or finished with [`IdleHandle::done`].
    pub async fn idle(&mut self) -> Result<IdleHandle<'_, S>> {
        self.touch_use();
        let push = if self.protocol.capabilities().has(&Capability::Idle) {
            self.start_idle().await?
        } else {
            debug!("IDLE not advertised, polling with NOOP instead");
            false
        };
        let refreshed = self.clock.now();
        Ok(IdleHandle {
            session: self,
            push,
            refreshed,
        })
    }

    /// Issues IDLE and waits for the continuation that opens it.
    /// Returns `false` when the server answers with a completion
    /// instead, refusing to idle.
    async fn start_idle(&mut self) -> Result<bool> {
        let tag = self.protocol.enqueue(Command::Idle)?;
        self.flush().await?;
        loop {
            let unit = self.read_unit().await?;
            match self.ingest(&unit).await? {
                Ingested::Completed(outcome) if outcome.tag == tag => {
                    debug!(text = %outcome.text, "server refused IDLE");
                    return Ok(false);
                }
                Ingested::Completed(outcome) => self.stash(outcome),
                Ingested::Row | Ingested::Quiet => {}
            }
            if self.protocol.is_idle() {
                return Ok(true);
            }
        }
    }

    /// Sends DONE and reads until the IDLE command completes.
    async fn end_idle(&mut self) -> Result<()> {
        self.protocol.done()?;
        self.flush().await?;
        loop {
            let unit = self.read_unit().await?;
            match self.ingest(&unit).await? {
                Ingested::Completed(outcome) => {
                    if matches!(outcome.command, Command::Idle) {
                        return Ok(());
                    }
                    self.stash(outcome);
                }
                Ingested::Row | Ingested::Quiet => {}
            }
        }
    }

    /// Blocks until the idling server sends something worth waking
    /// for. No per-read deadline applies here; an idle line
    /// legitimately stays silent for minutes at a time.
    async fn idle_event(&mut self) -> Result<bool> {
        loop {
            let unit = self.framed.read_unit().await?;
            self.touch_activity();
            match self.ingest(&unit).await? {
                Ingested::Completed(outcome) => {
                    if !matches!(outcome.command, Command::Idle) {
                        self.stash(outcome);
                    }
                    return Ok(true);
                }
                Ingested::Row => return Ok(true),
                Ingested::Quiet => {}
            }
        }
    }
}

/// An in-progress wait for server updates. Borrows the session
/// exclusively; finish with [`IdleHandle::done`] before issuing other
/// commands.
#[derive(Debug)]
pub struct IdleHandle<'a, S> {
    session: &'a mut Session<S>,
    push: bool,
    refreshed: Instant,
}

impl<S> IdleHandle<'_, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Whether the server pushes updates (IDLE) rather than being
    /// polled with NOOP.
    pub const fn is_push(&self) -> bool {
        self.push
    }

    /// Waits up to `duration` for mailbox activity.
    ///
    /// Returns `true` when the server reported something; the change
    /// has already been applied to the session state, so the caller
    /// inspects [`Session::sync`] or reacts through its handler.
    /// Returns `false` when the wait lapsed quietly.
    ///
    /// In push mode the IDLE is restarted transparently whenever it has
    /// been running close to the server's drop window.
    pub async fn wait(&mut self, duration: Duration) -> Result<bool> {
        self.session.touch_use();

        if !self.push {
            tokio::time::sleep(duration).await;
            let outcome = self
                .session
                .run(Command::Noop, ExecOptions::default())
                .await?;
            return Ok(!outcome.data.is_empty());
        }

        if self
            .session
            .clock
            .has_elapsed(self.refreshed, IDLE_REFRESH)
        {
            debug!("restarting IDLE before the server drops it");
            self.session.end_idle().await?;
            if !self.session.start_idle().await? {
                self.push = false;
                return Ok(false);
            }
            self.refreshed = self.session.clock.now();
        }

        let woke = match timeout(duration, self.session.idle_event()).await {
            Ok(result) => result?,
            Err(_) => false,
        };
        // A completion for IDLE without our DONE means the server ended
        // it; stop pretending to be in push mode.
        if !self.session.protocol.is_idle() {
            self.push = false;
        }
        Ok(woke)
    }

    /// Ends the wait, terminating the IDLE if one is open, and releases
    /// the session.
    pub async fn done(self) -> Result<()> {
        if self.session.protocol.is_idle() {
            self.session.end_idle().await?;
        }
        Ok(())
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

    use super::super::config::{AccountConfig, Security};
    use super::*;
    use crate::time::MockClock;

    fn config() -> AccountConfig {
        AccountConfig::builder("mail.example.com")
            .security(Security::None)
            .build()
    }

    const GREETING: &[u8] = b"* OK [CAPABILITY IMAP4rev1 IDLE] ready\r\n";

    #[tokio::test]
    async fn idle_enters_push_mode() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"a0000 IDLE\r\n")
            .read(b"+ idling\r\n")
            .read(b"* 2 EXISTS\r\n")
            .write(b"DONE\r\n")
            .read(b"a0000 OK idle finished\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();

        let mut handle = session.idle().await.unwrap();
        assert!(handle.is_push());
        assert!(handle.wait(Duration::from_secs(60)).await.unwrap());
        handle.done().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn quiet_wait_lapses_without_an_event() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"a0000 IDLE\r\n")
            .read(b"+ idling\r\n")
            .write(b"DONE\r\n")
            .read(b"a0000 OK idle finished\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();

        let mut handle = session.idle().await.unwrap();
        assert!(!handle.wait(Duration::from_secs(300)).await.unwrap());
        handle.done().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn missing_capability_falls_back_to_noop_polling() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"a0000 NOOP\r\n")
            .read(b"* 7 EXISTS\r\n")
            .read(b"a0000 OK done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();

        let mut handle = session.idle().await.unwrap();
        assert!(!handle.is_push());
        assert!(handle.wait(Duration::from_secs(120)).await.unwrap());
        handle.done().await.unwrap();
    }

    #[tokio::test]
    async fn refused_idle_downgrades_to_polling() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"a0000 IDLE\r\n")
            .read(b"a0000 NO rate limited\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();

        let handle = session.idle().await.unwrap();
        assert!(!handle.is_push());
        handle.done().await.unwrap();
    }

    #[tokio::test]
    async fn idle_restarts_before_the_server_window_closes() {
        let mock = Builder::new()
            .read(GREETING)
            .write(b"a0000 IDLE\r\n")
            .read(b"+ idling\r\n")
            .write(b"DONE\r\n")
            .read(b"a0000 OK first idle done\r\n")
            .write(b"a0001 IDLE\r\n")
            .read(b"+ idling again\r\n")
            .read(b"* 4 EXISTS\r\n")
            .write(b"DONE\r\n")
            .read(b"a0001 OK second idle done\r\n")
            .build();
        let mut session = Session::from_stream(mock, config()).await.unwrap();
        let clock = MockClock::shared();
        session.set_clock(Box::new(Arc::clone(&clock)));

        let mut handle = session.idle().await.unwrap();
        clock.advance(Duration::from_secs(29 * 60));
        assert!(handle.wait(Duration::from_secs(60)).await.unwrap());
        handle.done().await.unwrap();
    }
}

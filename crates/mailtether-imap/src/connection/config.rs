//! Account connection configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Connection security mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// No encryption (port 143). **Not recommended for production.**
    None,
    /// Start with plaintext, upgrade with STARTTLS (port 143).
    StartTls,
    /// TLS from the start (port 993). **Recommended.**
    #[default]
    Implicit,
}

impl Security {
    /// Returns the default port for this security mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None | Self::StartTls => 143,
            Self::Implicit => 993,
        }
    }
}

/// Everything the session needs to know about one account's server.
///
/// Credentials are not part of the configuration; they go to the login
/// call directly and are never retained.
#[derive(Debug, Clone)]
pub struct AccountConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Security mode.
    pub security: Security,
    /// Time allowed for the TCP connect and TLS handshake.
    pub connect_timeout: Duration,
    /// Time allowed for any single read or write.
    pub io_timeout: Duration,
    /// How often [`poll`](super::Session::poll) sends a NOOP when the
    /// connection is otherwise quiet.
    pub poll_interval: Duration,
    /// How long the session may go without a caller-driven operation
    /// before [`poll`](super::Session::poll) closes it.
    pub idle_timeout: Duration,
    /// Directory for the per-mailbox message cache. `None` keeps the
    /// cache in memory only.
    pub cache_dir: Option<PathBuf>,
}

impl AccountConfig {
    /// Creates a configuration with implicit TLS on port 993.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self::builder(host).build()
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> AccountConfigBuilder {
        AccountConfigBuilder::new(host)
    }
}

/// The conventional cache location for this user, when the platform
/// reports one.
#[must_use]
pub fn default_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("mailtether"))
}

/// Builder for [`AccountConfig`].
#[derive(Debug, Clone)]
pub struct AccountConfigBuilder {
    host: String,
    port: Option<u16>,
    security: Security,
    connect_timeout: Duration,
    io_timeout: Duration,
    poll_interval: Duration,
    idle_timeout: Duration,
    cache_dir: Option<PathBuf>,
}

impl AccountConfigBuilder {
    /// Creates a builder with the given hostname and defaults.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            security: Security::Implicit,
            connect_timeout: Duration::from_secs(30),
            io_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(1800),
            cache_dir: None,
        }
    }

    /// Sets the port. Defaults to the security mode's standard port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the security mode.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.security = security;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-read/write timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Sets the quiet-connection NOOP cadence.
    #[must_use]
    pub const fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets how long an unused session stays open.
    #[must_use]
    pub const fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Persists the message cache under this directory.
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> AccountConfig {
        AccountConfig {
            host: self.host,
            port: self.port.unwrap_or_else(|| self.security.default_port()),
            security: self.security,
            connect_timeout: self.connect_timeout,
            io_timeout: self.io_timeout,
            poll_interval: self.poll_interval,
            idle_timeout: self.idle_timeout,
            cache_dir: self.cache_dir,
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
    fn default_ports_follow_the_security_mode() {
        assert_eq!(Security::None.default_port(), 143);
        assert_eq!(Security::StartTls.default_port(), 143);
        assert_eq!(Security::Implicit.default_port(), 993);
    }

    #[test]
    fn new_defaults_to_implicit_tls() {
        let config = AccountConfig::new("imap.example.com");
        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Implicit);
        assert!(config.cache_dir.is_none());
    }

    #[test]
    fn builder_overrides_stick() {
        let config = AccountConfig::builder("imap.example.com")
            .security(Security::StartTls)
            .connect_timeout(Duration::from_secs(10))
            .poll_interval(Duration::from_secs(5))
            .cache_dir("/tmp/mailtether-test")
            .build();

        assert_eq!(config.port, 143);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(
            config.cache_dir.as_deref(),
            Some(std::path::Path::new("/tmp/mailtether-test"))
        );
    }

    #[test]
    fn explicit_port_beats_the_default() {
        let config = AccountConfig::builder("localhost")
            .security(Security::None)
            .port(10143)
            .build();
        assert_eq!(config.port, 10143);
    }
}

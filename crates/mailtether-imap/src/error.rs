//! Error types for the IMAP engine.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while driving an IMAP session.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O failure on the underlying transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS configuration or handshake failure.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Server hostname is not a valid DNS name for TLS.
    #[error("invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// Malformed data received from the server.
    #[error("parse error at byte {position}: {message}")]
    Parse {
        /// Byte offset where parsing failed.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Authentication was rejected or is not possible.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Command completed with a tagged NO.
    #[error("server refused command: {0}")]
    No(String),

    /// Command completed with a tagged BAD.
    #[error("server rejected command as invalid: {0}")]
    Bad(String),

    /// Server announced it is closing the connection.
    #[error("server closed connection: {0}")]
    Bye(String),

    /// Operation did not complete within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Operation is not permitted in the current session state.
    #[error("invalid session state: {0}")]
    InvalidState(String),

    /// The response stream is desynchronized or otherwise unparseable.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Command line exceeds the wire limit and must be reformulated
    /// (typically by moving data into a literal).
    #[error("command line of {size} bytes exceeds the {limit}-byte limit")]
    CommandTooLong {
        /// Size of the rejected line in bytes.
        size: usize,
        /// Maximum allowed line size in bytes.
        limit: usize,
    },

    /// Persistent cache storage failure.
    #[error("cache error: {0}")]
    Cache(String),
}

impl Error {
    /// Whether the failed operation may succeed if retried on a fresh
    /// connection. Command rejections and parse errors are not retryable;
    /// transport-level failures are.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Timeout(_) | Self::Bye(_))
    }
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_retryable() {
        let err = Error::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn rejections_are_not_retryable() {
        assert!(!Error::No("mailbox does not exist".into()).is_retryable());
        assert!(!Error::Bad("unknown command".into()).is_retryable());
        assert!(
            !Error::Parse {
                position: 3,
                message: "expected atom".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn display_includes_limit() {
        let err = Error::CommandTooLong {
            size: 2000,
            limit: 1024,
        };
        let text = err.to_string();
        assert!(text.contains("2000"));
        assert!(text.contains("1024"));
    }
}

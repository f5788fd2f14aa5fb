//! Plain and TLS transport for a session.

#![allow(clippy::missing_errors_doc)]

use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;
use tracing::debug;

use super::config::{AccountConfig, Security};
use crate::{Error, Result};

/// The connection under a session, plaintext or TLS.
pub enum Transport {
    /// Plaintext TCP stream.
    Plain(TcpStream),
    /// TLS-encrypted stream (boxed to reduce enum size).
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// Opens a connection according to the account configuration.
    ///
    /// For [`Security::StartTls`] the returned transport is still
    /// plaintext; the session upgrades it after the STARTTLS exchange
    /// succeeds.
    pub async fn connect(config: &AccountConfig) -> Result<Self> {
        debug!(
            host = %config.host,
            port = config.port,
            security = ?config.security,
            "connecting"
        );

        let establish = async {
            let addr = format!("{}:{}", config.host, config.port);
            let tcp = TcpStream::connect(&addr).await?;

            match config.security {
                Security::None | Security::StartTls => Ok(Self::Plain(tcp)),
                Security::Implicit => {
                    let connector = create_tls_connector();
                    let server_name = ServerName::try_from(config.host.clone())?;
                    let tls = connector.connect(server_name, tcp).await?;
                    Ok(Self::Tls(Box::new(tls)))
                }
            }
        };

        tokio::time::timeout(config.connect_timeout, establish)
            .await
            .map_err(|_| Error::Timeout(config.connect_timeout))?
    }

    /// Upgrades a plaintext transport to TLS after STARTTLS.
    pub async fn upgrade_to_tls(self, host: &str) -> Result<Self> {
        match self {
            Self::Plain(tcp) => {
                let connector = create_tls_connector();
                let server_name = ServerName::try_from(host.to_string())?;
                let tls = connector.connect(server_name, tcp).await?;
                debug!(host, "upgraded to TLS");
                Ok(Self::Tls(Box::new(tls)))
            }
            Self::Tls(_) => Err(Error::InvalidState(
                "connection is already encrypted".to_string(),
            )),
        }
    }

    /// Returns true if the transport is TLS-encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }
}

impl AsyncRead for Transport {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Transport {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            Self::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_flush(cx),
            Self::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            Self::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

/// Creates a TLS connector with default root certificates.
#[must_use]
pub fn create_tls_connector() -> TlsConnector {
    let root_store = rustls::RootCertStore {
        roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
    };

    let config = rustls::ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();

    TlsConnector::from(Arc::new(config))
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
    fn test_create_tls_connector() {
        let _connector = create_tls_connector();
    }

    #[tokio::test]
    async fn connect_honors_the_timeout() {
        // 192.0.2.0/24 is TEST-NET-1 and never routed.
        let config = AccountConfig::builder("192.0.2.1")
            .port(993)
            .connect_timeout(std::time::Duration::from_millis(50))
            .build();
        let result = Transport::connect(&config).await;
        assert!(matches!(result, Err(Error::Timeout(_) | Error::Io(_))));
    }
}

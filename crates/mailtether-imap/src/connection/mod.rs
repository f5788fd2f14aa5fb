//! Connecting to a server and talking to it.
//!
//! [`AccountConfig`] says where and how to connect, [`Transport`]
//! carries the bytes (plaintext or TLS, with STARTTLS upgrades),
//! [`FramedStream`] cuts the byte stream into complete response units,
//! and [`Session`] runs the conversation. [`IdleHandle`] keeps a
//! session listening for server-initiated updates.

mod config;
mod framed;
mod idle;
mod session;
mod stream;

pub use config::{AccountConfig, AccountConfigBuilder, Security, default_cache_dir};
pub use framed::{FramedStream, ProgressFn};
pub use idle::IdleHandle;
pub use session::{ExecOptions, SelectSummary, Session};
pub use stream::{Transport, create_tls_connector};

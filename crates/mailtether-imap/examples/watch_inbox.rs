#![allow(clippy::expect_used, clippy::uninlined_format_args)]
//! Example: Watch an inbox for new mail
//!
//! Connects over implicit TLS, opens INBOX and waits for changes, over
//! IDLE when the server supports it and NOOP polling otherwise.
//!
//! ## Running
//!
//! ```bash
//! cargo run --package mailtether-imap --example watch_inbox -- imap.example.com you@example.com
//! ```
//!
//! The password is read from the terminal; for Gmail or Outlook use an
//! app password.

use std::env;
use std::io::{self, Write};
use std::time::Duration;

use mailtether_imap::{AccountConfig, Mailbox, Security, Session};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailtether_imap=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = env::args().skip(1);
    let host = args.next().expect("usage: watch_inbox <host> <email>");
    let email = args.next().expect("usage: watch_inbox <host> <email>");

    print!("Password for {}: ", email);
    io::stdout().flush()?;
    let mut password = String::new();
    io::stdin().read_line(&mut password)?;
    let password = password.trim();

    let config = AccountConfig::builder(&host)
        .security(Security::Implicit)
        .build();

    println!("\nConnecting to {}:{}...", config.host, config.port);
    let mut session = Session::connect(config).await?;
    println!("✓ Connected");

    session.login(&email, password).await?;
    println!("✓ Authenticated");

    session.enable_extensions().await?;

    let summary = session.open(&Mailbox::inbox(), false).await?;
    println!("✓ INBOX open: {} messages", summary.exists);

    let mut watch = session.idle().await?;
    if watch.is_push() {
        println!("Waiting for server pushes (Ctrl-C to stop)...");
    } else {
        println!("Server lacks IDLE, polling instead (Ctrl-C to stop)...");
    }

    loop {
        tokio::select! {
            woke = watch.wait(Duration::from_secs(300)) => {
                if woke? {
                    println!("✓ mailbox changed");
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    watch.done().await?;

    println!("\nDisconnecting...");
    session.logout().await?;
    println!("✓ Disconnected");

    Ok(())
}

//! Framed I/O for the IMAP wire protocol.
//!
//! The server speaks in CRLF-terminated lines, and a line may announce
//! a literal (`{n}` at the end) whose n raw bytes follow before the
//! line continues. One *unit* is a line plus every literal it carries,
//! up to the first line that carries none.
//!
//! All partial state lives in the read buffer, so a read future can be
//! dropped at any await point (a timeout, a select arm losing the
//! race) and the next call resumes exactly where the stream left off.

#![allow(clippy::missing_errors_doc)]

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{Error, Result};

/// Initial read buffer capacity.
const DEFAULT_BUFFER_SIZE: usize = 8192;

/// Maximum line length to prevent memory exhaustion.
const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Callback reporting literal download progress as (bytes so far, total).
pub type ProgressFn = Box<dyn FnMut(usize, usize) + Send>;

/// Result of scanning the buffer for a complete unit.
enum Scan {
    /// A complete unit of this many bytes sits at the buffer start.
    Complete(usize),
    /// More bytes are needed; mid-literal scans carry (have, total).
    Partial(Option<(usize, usize)>),
}

/// Buffered reader/writer that frames the stream into units.
pub struct FramedStream<S> {
    stream: S,
    buffer: BytesMut,
    progress: Option<ProgressFn>,
}

impl<S> std::fmt::Debug for FramedStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramedStream")
            .field("buffered", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl<S> FramedStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new framed stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(DEFAULT_BUFFER_SIZE),
            progress: None,
        }
    }

    /// Installs a progress callback for literal downloads.
    pub fn set_progress(&mut self, report: ProgressFn) {
        self.progress = Some(report);
    }

    /// Removes the progress callback.
    pub fn clear_progress(&mut self) {
        self.progress = None;
    }

    /// Reads one complete unit, filling the buffer as needed.
    ///
    /// Cancel-safe: dropping the returned future never discards bytes.
    pub async fn read_unit(&mut self) -> Result<Vec<u8>> {
        loop {
            match self.scan_unit()? {
                Scan::Complete(len) => {
                    let unit = self.buffer.split_to(len);
                    return Ok(unit.to_vec());
                }
                Scan::Partial(literal) => {
                    if let (Some(report), Some((have, total))) =
                        (self.progress.as_mut(), literal)
                    {
                        report(have, total);
                    }
                    self.fill().await?;
                }
            }
        }
    }

    /// Returns one complete unit if the buffer already holds it,
    /// without touching the stream.
    pub fn try_read_unit(&mut self) -> Result<Option<Vec<u8>>> {
        match self.scan_unit()? {
            Scan::Complete(len) => {
                let unit = self.buffer.split_to(len);
                Ok(Some(unit.to_vec()))
            }
            Scan::Partial(_) => Ok(None),
        }
    }

    /// Reads more bytes from the stream into the buffer.
    ///
    /// A closed connection is an error: the protocol ends with a BYE
    /// and a clean close only after it, so bare EOF is always abnormal.
    pub async fn fill(&mut self) -> Result<()> {
        let n = self.stream.read_buf(&mut self.buffer).await?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed",
            )));
        }
        Ok(())
    }

    /// Scans the buffer for one complete unit starting at offset zero.
    fn scan_unit(&self) -> Result<Scan> {
        let buf = &self.buffer[..];
        let mut cursor = 0;

        loop {
            let Some(eol) = find_crlf(&buf[cursor..]) else {
                if buf.len() - cursor > MAX_LINE_LENGTH {
                    return Err(Error::Protocol("line too long".to_string()));
                }
                return Ok(Scan::Partial(None));
            };

            let line_end = cursor + eol + 2;
            let line = &buf[cursor..line_end];

            match parse_literal_length(line) {
                Some(n) if n > MAX_LITERAL_SIZE => {
                    return Err(Error::Protocol(format!(
                        "literal too large: {n} bytes (max {MAX_LITERAL_SIZE})"
                    )));
                }
                Some(n) => {
                    let literal_end = line_end + n;
                    if buf.len() < literal_end {
                        return Ok(Scan::Partial(Some((buf.len() - line_end, n))));
                    }
                    cursor = literal_end;
                }
                None => return Ok(Scan::Complete(line_end)),
            }
        }
    }

    /// Writes data to the stream and flushes it.
    pub async fn write_unit(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Gets a reference to the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Gets a mutable reference to the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consumes the framed stream and returns the inner stream.
    ///
    /// Any buffered read data is lost; call this only at a protocol
    /// point where the server cannot have sent more, such as after the
    /// STARTTLS acknowledgment.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Finds the position of CRLF in a buffer.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parses a literal length from the end of a line.
///
/// Matches `{123}\r\n` and the non-synchronizing form `{123+}\r\n`.
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    if !line.ends_with(b"\r\n") {
        return None;
    }

    let line = &line[..line.len() - 2];
    let open = line.iter().rposition(|&b| b == b'{')?;

    if !line.ends_with(b"}") {
        return None;
    }

    let num_start = open + 1;
    let num_end = if line.ends_with(b"+}") {
        line.len() - 2
    } else {
        line.len() - 1
    };

    let num_str = std::str::from_utf8(line.get(num_start..num_end)?).ok()?;
    num_str.parse().ok()
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
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"hello\r\n"), Some(5));
        assert_eq!(find_crlf(b"\r\n"), Some(0));
        assert_eq!(find_crlf(b"no newline"), None);
        assert_eq!(find_crlf(b"just\n"), None);
        assert_eq!(find_crlf(b"just\r"), None);
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"BODY {123}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"BODY {123+}\r\n"), Some(123));
        assert_eq!(parse_literal_length(b"{0}\r\n"), Some(0));
        assert_eq!(parse_literal_length(b"{999999}\r\n"), Some(999_999));
        assert_eq!(parse_literal_length(b"no literal\r\n"), None);
        assert_eq!(parse_literal_length(b"incomplete {123"), None);
        assert_eq!(parse_literal_length(b"wrong {abc}\r\n"), None);
    }

    mod reading {
        use super::*;
        use tokio_test::io::Builder;

        #[tokio::test]
        async fn simple_line() {
            let mock = Builder::new().read(b"* OK ready\r\n").build();
            let mut framed = FramedStream::new(mock);

            let unit = framed.read_unit().await.unwrap();
            assert_eq!(unit, b"* OK ready\r\n");
        }

        #[tokio::test]
        async fn line_with_literal() {
            let mock = Builder::new()
                .read(b"* 1 FETCH (BODY {5}\r\n")
                .read(b"hello)\r\n")
                .build();
            let mut framed = FramedStream::new(mock);

            let unit = framed.read_unit().await.unwrap();
            assert_eq!(unit, b"* 1 FETCH (BODY {5}\r\nhello)\r\n");
        }

        #[tokio::test]
        async fn literal_split_across_reads() {
            let mock = Builder::new()
                .read(b"* 1 FETCH (BODY {10}\r\n")
                .read(b"abcd")
                .read(b"efghij)\r\n")
                .build();
            let mut framed = FramedStream::new(mock);

            let unit = framed.read_unit().await.unwrap();
            assert_eq!(unit, b"* 1 FETCH (BODY {10}\r\nabcdefghij)\r\n");
        }

        #[tokio::test]
        async fn two_units_in_one_read() {
            let mock = Builder::new()
                .read(b"* 1 EXISTS\r\n* 1 RECENT\r\n")
                .build();
            let mut framed = FramedStream::new(mock);

            assert_eq!(framed.read_unit().await.unwrap(), b"* 1 EXISTS\r\n");
            assert_eq!(framed.read_unit().await.unwrap(), b"* 1 RECENT\r\n");
        }

        #[tokio::test]
        async fn try_read_drains_without_io() {
            let mock = Builder::new().read(b"* 3 EXISTS\r\n* 1 REC").build();
            let mut framed = FramedStream::new(mock);

            // Nothing buffered yet.
            assert!(framed.try_read_unit().unwrap().is_none());

            framed.fill().await.unwrap();
            assert_eq!(
                framed.try_read_unit().unwrap().as_deref(),
                Some(b"* 3 EXISTS\r\n".as_slice())
            );
            // The partial line stays buffered.
            assert!(framed.try_read_unit().unwrap().is_none());
        }

        #[tokio::test]
        async fn eof_mid_unit_is_an_error() {
            let mock = Builder::new().read(b"* OK no terminator").build();
            let mut framed = FramedStream::new(mock);

            let result = framed.read_unit().await;
            assert!(matches!(result, Err(Error::Io(_))));
        }

        #[tokio::test]
        async fn oversized_literal_is_rejected() {
            let size = MAX_LITERAL_SIZE + 1;
            let header = format!("* 1 FETCH (BODY {{{size}}}\r\n");
            let mock = Builder::new().read(header.as_bytes()).build();
            let mut framed = FramedStream::new(mock);

            let result = framed.read_unit().await;
            assert!(
                result
                    .unwrap_err()
                    .to_string()
                    .contains("literal too large")
            );
        }

        #[tokio::test]
        async fn overlong_line_is_rejected() {
            let long_line = "A".repeat(MAX_LINE_LENGTH + 100);
            let mock = Builder::new().read(long_line.as_bytes()).build();
            let mut framed = FramedStream::new(mock);

            let result = framed.read_unit().await;
            assert!(result.unwrap_err().to_string().contains("line too long"));
        }
    }

    mod writing {
        use super::*;
        use tokio_test::io::Builder;

        #[tokio::test]
        async fn write_flushes() {
            let mock = Builder::new().write(b"A001 NOOP\r\n").build();
            let mut framed = FramedStream::new(mock);

            framed.write_unit(b"A001 NOOP\r\n").await.unwrap();
        }
    }

    mod progress {
        use super::*;
        use std::sync::{Arc, Mutex};
        use tokio_test::io::Builder;

        #[tokio::test]
        async fn reports_literal_bytes() {
            let mock = Builder::new()
                .read(b"* 1 FETCH (BODY {10}\r\n")
                .read(b"abcd")
                .read(b"efghij)\r\n")
                .build();
            let mut framed = FramedStream::new(mock);

            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            framed.set_progress(Box::new(move |have, total| {
                sink.lock().unwrap().push((have, total));
            }));

            framed.read_unit().await.unwrap();
            assert_eq!(*seen.lock().unwrap(), vec![(0, 10), (4, 10)]);
        }
    }
}

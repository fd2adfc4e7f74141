//! Line Reader and Sender
//!
//! The transport is a byte stream; IRC is a sequence of CRLF-terminated
//! lines. [`LineReader`] accumulates bytes in a `BytesMut` buffer and hands
//! out one line at a time. [`LineSender`] writes whole lines and is shared
//! by every handler task, so each `send` holds the writer lock for the full
//! write-and-flush.

use crate::connection::handler::{ConnectionError, ConnectionStats};
use crate::protocol::{Message, CRLF};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::trace;

/// Maximum size for the read buffer (64 KB)
pub const MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Reads CRLF (or bare LF) terminated lines from a byte stream.
pub struct LineReader<R> {
    inner: R,
    buffer: BytesMut,
    stats: Arc<ConnectionStats>,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(inner: R, stats: Arc<ConnectionStats>) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            stats,
        }
    }

    /// Reads the next line, without its terminator.
    ///
    /// Returns `Ok(None)` at end of stream. A final line that arrives
    /// without a terminator is still returned before that.
    pub async fn read_line(&mut self) -> Result<Option<String>, ConnectionError> {
        loop {
            if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                let raw = self.buffer.split_to(pos + 1);
                return Ok(Some(decode(&raw)));
            }

            if self.buffer.len() >= MAX_BUFFER_SIZE {
                return Err(ConnectionError::BufferFull);
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.inner.read_buf(&mut self.buffer).await?;
            if n == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                let raw = self.buffer.split();
                return Ok(Some(decode(&raw)));
            }

            self.stats.bytes_read(n);
            trace!(bytes = n, buffered = self.buffer.len(), "Read data");
        }
    }
}

fn decode(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(&['\r', '\n'][..])
        .to_string()
}

type BoxedWriter = BufWriter<Box<dyn AsyncWrite + Send + Unpin>>;

/// Writes whole lines to the transport. Cheap to clone; all clones share
/// one writer.
#[derive(Clone)]
pub struct LineSender {
    writer: Arc<Mutex<Option<BoxedWriter>>>,
    stats: Arc<ConnectionStats>,
}

impl LineSender {
    pub fn new<W>(writer: W, stats: Arc<ConnectionStats>) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let boxed: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);
        Self {
            writer: Arc::new(Mutex::new(Some(BufWriter::new(boxed)))),
            stats,
        }
    }

    /// Writes `text` as one line and flushes it.
    ///
    /// A trailing terminator in `text` is dropped and CRLF appended. Any
    /// other CR or LF becomes a space, so one call is always one line on
    /// the wire. Concurrent calls never interleave within a line.
    pub async fn send(&self, text: &str) -> Result<(), ConnectionError> {
        let line = encode_line(text);

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ConnectionError::NotConnected)?;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;

        self.stats.line_sent(line.len());
        trace!(line = %text.trim_end(), "Sent line");
        Ok(())
    }

    /// Serializes and sends a message.
    pub async fn send_message(&self, message: &Message) -> Result<(), ConnectionError> {
        self.send(&message.to_line()).await
    }

    /// Shuts the writer down. Later sends fail with `NotConnected`.
    pub async fn close(&self) {
        let mut guard = self.writer.lock().await;
        if let Some(mut writer) = guard.take() {
            // The peer may already be gone
            let _ = writer.shutdown().await;
        }
    }

    /// Returns true once `close` has run.
    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}

fn encode_line(text: &str) -> String {
    let body = text.trim_end_matches(is_line_break);
    let mut line = String::with_capacity(body.len() + CRLF.len());
    line.extend(body.chars().map(|c| if is_line_break(c) { ' ' } else { c }));
    line.push_str(CRLF);
    line
}

fn is_line_break(c: char) -> bool {
    c == '\r' || c == '\n'
}

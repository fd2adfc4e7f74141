//! Connection Manager
//!
//! This module owns the bot's single connection to the IRC server: it
//! connects, registers, joins a channel and then runs the read loop until
//! the server goes away.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! Disconnected
//!      │ connect()
//!      ▼
//! Connecting ──── transport failure ───> Disconnected (fatal)
//!      │
//!      ▼
//! Registering    NICK + USER, no wait for the server's answer
//!      │ join()
//!      ▼
//! Joined         JOIN sent
//!      │
//!      ▼
//! Running ──┐    read line -> parse -> submit dispatch to the worker pool
//!      ▲    │
//!      └────┘
//!      │ end of stream / read error / disconnect()
//!      ▼
//! Disconnected
//! ```
//!
//! A nickname collision is noticed only when the server answers with 433,
//! which the dispatcher handles like any other line.

use crate::commands::CommandHandler;
use crate::connection::lines::{LineReader, LineSender};
use crate::connection::pool::{WorkerPool, DEFAULT_WORKERS};
use crate::protocol::{parse_line, Message};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Registering,
    Joined,
    Running,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Registering => "registering",
            ConnectionState::Joined => "joined",
            ConnectionState::Running => "running",
        };
        f.write_str(name)
    }
}

/// Statistics for the connection
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Lines read from the server
    pub lines_read: AtomicU64,
    /// Lines written to the server
    pub lines_sent: AtomicU64,
    /// Lines dropped because they failed to parse
    pub malformed_lines: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

/// A point-in-time copy of [`ConnectionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub lines_read: u64,
    pub lines_sent: u64,
    pub malformed_lines: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn line_read(&self) {
        self.lines_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn line_sent(&self, bytes: usize) {
        self.lines_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn malformed_line(&self) {
        self.malformed_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            lines_read: self.lines_read.load(Ordering::Relaxed),
            lines_sent: self.lines_sent.load(Ordering::Relaxed),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
        }
    }
}

/// Errors that can occur on the connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The transport could not be established
    #[error("unable to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error (network issue)
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// A line grew past the read buffer limit
    #[error("Buffer size limit exceeded")]
    BufferFull,

    /// Tried to use the connection without a transport
    #[error("Not connected")]
    NotConnected,
}

/// Settings the connection needs beyond server and port.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// Concurrent handler tasks
    pub workers: usize,
    /// Real name sent with USER
    pub realname: String,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            realname: "orderbot".to_string(),
        }
    }
}

/// The bot's connection to one IRC server.
pub struct Connection {
    state: ConnectionState,
    /// `host:port`, set by `connect`
    addr: Option<String>,
    reader: Option<LineReader<OwnedReadHalf>>,
    sender: Option<LineSender>,
    pool: Option<WorkerPool>,
    handler: Arc<CommandHandler>,
    options: ConnectionOptions,
    stats: Arc<ConnectionStats>,
}

impl Connection {
    /// Creates a disconnected connection that will dispatch through `handler`.
    pub fn new(handler: Arc<CommandHandler>, options: ConnectionOptions) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            addr: None,
            reader: None,
            sender: None,
            pool: None,
            handler,
            options,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    /// The dispatcher lines are handed to.
    pub fn handler(&self) -> &Arc<CommandHandler> {
        &self.handler
    }

    fn transition(&mut self, next: ConnectionState) {
        debug!(from = %self.state, to = %next, "Connection state change");
        self.state = next;
    }

    /// Opens the transport and registers with NICK and USER.
    ///
    /// A transport failure leaves the connection `Disconnected`; callers
    /// are expected to treat it as fatal.
    pub async fn connect(&mut self, server: &str, port: u16) -> Result<(), ConnectionError> {
        let addr = format!("{}:{}", server, port);
        self.transition(ConnectionState::Connecting);
        info!(addr = %addr, "Connecting");

        let stream = match TcpStream::connect((server, port)).await {
            Ok(stream) => stream,
            Err(source) => {
                self.transition(ConnectionState::Disconnected);
                return Err(ConnectionError::Connect { addr, source });
            }
        };

        let (read_half, write_half) = stream.into_split();
        self.reader = Some(LineReader::new(read_half, Arc::clone(&self.stats)));
        self.sender = Some(LineSender::new(write_half, Arc::clone(&self.stats)));
        self.addr = Some(addr);

        self.transition(ConnectionState::Registering);
        self.register().await
    }

    async fn register(&mut self) -> Result<(), ConnectionError> {
        let nick = self.handler.nickname().current();
        info!(nick = %nick, "Registering nick");
        self.send_message(&Message::nick(&nick)).await?;

        info!(nick = %nick, "Authing");
        let user = Message::user(&nick, &self.options.realname);
        self.send_message(&user).await
    }

    /// Sends one line. Fails with `NotConnected` before `connect`.
    pub async fn send(&self, text: &str) -> Result<(), ConnectionError> {
        self.sender
            .as_ref()
            .ok_or(ConnectionError::NotConnected)?
            .send(text)
            .await
    }

    /// Serializes and sends a message.
    pub async fn send_message(&self, message: &Message) -> Result<(), ConnectionError> {
        self.send(&message.to_line()).await
    }

    /// Sends `text` to a channel or user.
    pub async fn respond(&self, target: &str, text: &str) -> Result<(), ConnectionError> {
        self.send_message(&Message::privmsg(target, text)).await
    }

    /// Leaves a channel.
    pub async fn part(&self, channel: &str) -> Result<(), ConnectionError> {
        let part = Message::part(channel);
        debug!(channel = %part.params[0], "Leaving channel");
        self.send_message(&part).await
    }

    /// Joins `channel` (adding `#` if missing) and runs the read loop.
    ///
    /// Returns when the server closes the connection.
    pub async fn join(&mut self, channel: &str) -> Result<(), ConnectionError> {
        let join = Message::join(channel);
        debug!(channel = %join.params[0], "Joining channel");
        self.send_message(&join).await?;
        self.transition(ConnectionState::Joined);

        self.run().await
    }

    /// The read loop.
    ///
    /// Lines are read and parsed in order. Dispatch happens on the worker
    /// pool, so handlers for different lines may finish in any order. A
    /// failed write is logged and the loop keeps reading. End of stream
    /// and read errors both end the loop and disconnect; replies of
    /// handlers still running at that point are never sent.
    pub async fn run(&mut self) -> Result<(), ConnectionError> {
        let mut reader = self.reader.take().ok_or(ConnectionError::NotConnected)?;
        let sender = self.sender.clone().ok_or(ConnectionError::NotConnected)?;
        let mut pool = WorkerPool::new(self.options.workers);

        self.transition(ConnectionState::Running);
        info!(addr = ?self.addr, workers = pool.size(), "Entering read loop");

        loop {
            let line = match reader.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Server closed the connection");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Read failed, closing connection");
                    break;
                }
            };
            self.stats.line_read();
            trace!(line = %line, "Handle");

            let message = match parse_line(&line) {
                Ok(message) => message,
                Err(e) => {
                    self.stats.malformed_line();
                    warn!(error = %e, "Dropping line");
                    continue;
                }
            };

            let handler = Arc::clone(&self.handler);
            let sender = sender.clone();
            pool.submit(async move {
                // Order handlers may block on their own I/O
                let dispatched =
                    tokio::task::spawn_blocking(move || handler.dispatch(&message)).await;
                let replies = match dispatched {
                    Ok(replies) => replies,
                    Err(e) => {
                        warn!(error = %e, "Dispatch task failed");
                        return;
                    }
                };

                for reply in replies {
                    if let Err(e) = sender.send_message(&reply).await {
                        warn!(error = %e, command = %reply.command, "Write failed");
                    }
                }
            })
            .await;
        }

        self.pool = Some(pool);
        self.disconnect().await;
        Ok(())
    }

    /// Cancels outstanding handler work, then closes the transport.
    ///
    /// Safe to call more than once.
    pub async fn disconnect(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            pool.shutdown().await;
        }
        if let Some(sender) = self.sender.take() {
            sender.close().await;
            info!(addr = ?self.addr, "Disconnected");
        }
        self.reader = None;
        self.transition(ConnectionState::Disconnected);
    }
}

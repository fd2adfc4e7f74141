//! Connection Module
//!
//! This module manages the bot's connection to the IRC server.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Connection                             │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐      │
//! │  │ LineReader  │───>│ parse_line  │───>│ WorkerPool  │      │
//! │  └─────────────┘    └─────────────┘    └──────┬──────┘      │
//! │                                               │             │
//! │                                               ▼             │
//! │                                      ┌────────────────┐     │
//! │                                      │ CommandHandler │     │
//! │                                      └───────┬────────┘     │
//! │                                              │              │
//! │                                              ▼              │
//! │                                      ┌────────────────┐     │
//! │                                      │  LineSender    │     │
//! │                                      │ (shared, lock) │     │
//! │                                      └────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use orderbot::commands::{CommandHandler, Nickname, OrderRegistry};
//! use orderbot::connection::{Connection, ConnectionOptions};
//! use std::sync::Arc;
//!
//! let handler = CommandHandler::new(
//!     Arc::new(Nickname::new("orderbot")),
//!     Arc::new(OrderRegistry::new()),
//! );
//! let mut conn = Connection::new(Arc::new(handler), ConnectionOptions::default());
//! conn.connect("irc.example.net", 6667).await?;
//! conn.join("#orderbot").await?;
//! ```

pub mod handler;
pub mod lines;
pub mod pool;

// Re-export commonly used types
pub use handler::{
    Connection, ConnectionError, ConnectionOptions, ConnectionState, ConnectionStats,
    StatsSnapshot,
};
pub use lines::{LineReader, LineSender, MAX_BUFFER_SIZE};
pub use pool::{WorkerPool, DEFAULT_WORKERS};

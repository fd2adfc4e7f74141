//! # orderbot - An IRC Bot Engine
//!
//! orderbot keeps one connection to an IRC server, parses every line it
//! receives, dispatches it to a protocol handler, and lets add-ons answer
//! user "orders" matched by regular expression.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              orderbot                                   │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │ Connection  │───>│ Line Parser │───>│ Worker Pool │                  │
//! │  │ (read loop) │    │             │    │ (bounded)   │                  │
//! │  └──────▲──────┘    └─────────────┘    └──────┬──────┘                  │
//! │         │                                     │                         │
//! │         │ replies                             ▼                         │
//! │         │                          ┌──────────────────────┐             │
//! │         └──────────────────────────│   CommandHandler     │             │
//! │                                    │ PING / 433 / PRIVMSG │             │
//! │                                    └──────────┬───────────┘             │
//! │                                               │ orders                  │
//! │                                               ▼                         │
//! │                                    ┌──────────────────────┐             │
//! │                                    │   OrderRegistry      │             │
//! │                                    │ pattern -> handler   │             │
//! │                                    └──────────────────────┘             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use orderbot::commands::{CommandHandler, Nickname, Order, OrderRegistry};
//! use orderbot::connection::{Connection, ConnectionOptions};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut orders = OrderRegistry::new();
//!     orders.register([Order::build("^hello", "hello - say hi", |inv| {
//!         Ok(format!("Hi, {}", inv.sender).into())
//!     })?])?;
//!
//!     let handler = CommandHandler::new(
//!         Arc::new(Nickname::new("orderbot")),
//!         Arc::new(orders),
//!     );
//!
//!     let mut conn = Connection::new(Arc::new(handler), ConnectionOptions::default());
//!     conn.connect("irc.example.net", 6667).await?;
//!     conn.join("orderbot").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: line parser and message type
//! - [`commands`]: protocol dispatcher and order registry
//! - [`connection`]: connection lifecycle, read loop and worker pool
//! - [`storage`]: TTL cache for add-ons
//! - [`config`]: TOML file and command-line configuration
//! - [`logging`]: tracing subscriber setup

pub mod commands;
pub mod config;
pub mod connection;
pub mod logging;
pub mod protocol;
pub mod storage;

// Re-export commonly used types for convenience
pub use commands::{CommandHandler, Nickname, Order, OrderRegistry, Reply};
pub use config::Config;
pub use connection::{Connection, ConnectionOptions};
pub use protocol::{parse_line, Message, ParseError};
pub use storage::{Cache, TtlCache};

/// Version of orderbot
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

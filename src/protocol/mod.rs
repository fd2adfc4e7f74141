//! IRC Protocol Implementation
//!
//! This module provides the line-level protocol layer: turning raw lines
//! into structured messages and messages back into lines.
//!
//! ## Modules
//!
//! - `types`: Defines the `Message` struct and its serialization
//! - `parser`: Parser for incoming protocol lines
//!
//! ## Example
//!
//! ```
//! use orderbot::protocol::{parse_line, Message};
//!
//! // Parsing an incoming line
//! let msg = parse_line("PING :irc.example.net").unwrap();
//! assert_eq!(msg.command, "PING");
//!
//! // Creating a reply
//! let reply = Message::pong("irc.example.net");
//! assert_eq!(reply.to_line(), "PONG irc.example.net");
//! ```

pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use parser::{parse_line, ParseError, ParseResult};
pub use types::{is_channel, normalize_channel, Message, CRLF};

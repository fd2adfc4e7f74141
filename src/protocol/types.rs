//! IRC Message Type
//!
//! This module defines the structured form of a single protocol line, used
//! both for lines received from the server and for lines the bot sends.
//!
//! ## Line Format
//!
//! ```text
//! [:prefix] COMMAND [param ...] [:trailing]
//! ```
//!
//! - The prefix identifies the origin (`nick!user@host` or a server name)
//! - The command is a textual verb (`PRIVMSG`) or a numeric reply (`433`)
//! - The trailing parameter is the only one allowed to contain spaces
//!
//! All lines are terminated with CRLF (`\r\n`) on the wire.

use std::fmt;

/// The CRLF terminator used on the wire
pub const CRLF: &str = "\r\n";

/// A parsed (or to-be-sent) protocol line.
///
/// Inbound messages are produced once per line by the parser and consumed
/// by the dispatcher. Outbound messages are built with the constructors
/// below and serialized with [`Message::to_line`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Message {
    /// Origin of the message, empty when the line had no prefix
    pub prefix: String,
    /// The command verb or numeric code, exactly as received
    pub command: String,
    /// Ordered parameters; a trailing parameter is always last
    pub params: Vec<String>,
}

impl Message {
    /// Creates a message without a prefix.
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            prefix: String::new(),
            command: command.into(),
            params,
        }
    }

    /// `NICK <nick>`
    pub fn nick(nick: &str) -> Self {
        Self::new("NICK", vec![nick.to_string()])
    }

    /// `USER <nick> 0 * :<realname>` (RFC 2812 section 3.1.3)
    pub fn user(nick: &str, realname: &str) -> Self {
        Self::new(
            "USER",
            vec![
                nick.to_string(),
                "0".to_string(),
                "*".to_string(),
                realname.to_string(),
            ],
        )
    }

    /// `JOIN <#channel>`
    pub fn join(channel: &str) -> Self {
        Self::new("JOIN", vec![normalize_channel(channel)])
    }

    /// `PART <#channel>`
    pub fn part(channel: &str) -> Self {
        Self::new("PART", vec![normalize_channel(channel)])
    }

    /// `PONG :<payload>`
    pub fn pong(payload: &str) -> Self {
        Self::new("PONG", vec![payload.to_string()])
    }

    /// `PRIVMSG <target> :<text>`
    pub fn privmsg(target: &str, text: &str) -> Self {
        Self::new("PRIVMSG", vec![target.to_string(), text.to_string()])
    }

    /// Returns the nickname portion of a `nick!user@host` prefix.
    ///
    /// Server prefixes have no `!`, so the whole prefix is returned.
    pub fn source_nick(&self) -> &str {
        match self.prefix.find('!') {
            Some(pos) => &self.prefix[..pos],
            None => &self.prefix,
        }
    }

    /// Returns the parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// Serializes the message into a wire line without the terminator.
    ///
    /// The last parameter is written as a trailing parameter (`:`-prefixed)
    /// when it is empty, contains a space, or itself starts with `:`.
    pub fn to_line(&self) -> String {
        let mut line = String::with_capacity(64);

        if !self.prefix.is_empty() {
            line.push(':');
            line.push_str(&self.prefix);
            line.push(' ');
        }

        line.push_str(&self.command);

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                line.push(' ');
                line.push_str(param);
            }
            line.push(' ');
            if last.is_empty() || last.contains(' ') || last.starts_with(':') {
                line.push(':');
            }
            line.push_str(last);
        }

        line
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_line())
    }
}

/// Prefixes a channel name with `#` if it has no channel sigil yet.
pub fn normalize_channel(channel: &str) -> String {
    if channel.starts_with('#') {
        channel.to_string()
    } else {
        format!("#{}", channel)
    }
}

/// Returns true when `target` names a channel rather than a user.
pub fn is_channel(target: &str) -> bool {
    target.starts_with('#') || target.starts_with('&')
}

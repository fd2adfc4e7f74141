//! IRC Line Parser
//!
//! This module turns a single raw protocol line into a [`Message`], following
//! the subset of RFC 2812 section 2.3.1 the bot needs.
//!
//! ## How the Parser Works
//!
//! 1. A leading `:` introduces the prefix, which runs up to the first space.
//! 2. The first `" :"` in the remainder starts the trailing parameter. It is
//!    taken verbatim, spaces included, and appended as the last parameter.
//! 3. Everything before it is split on whitespace.
//! 4. The first token is the command, the rest are the parameters.
//!
//! The parser is a pure function. It does not normalize the command's case
//! and does not check that the command is a known verb; both are the
//! dispatcher's business.

use crate::protocol::types::Message;
use thiserror::Error;

/// Errors that can occur during line parsing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line is empty or carries no command token
    #[error("malformed message: {0}")]
    MalformedMessage(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Parses one protocol line (without its CRLF terminator).
///
/// # Example
///
/// ```
/// use orderbot::protocol::parse_line;
///
/// let msg = parse_line(":nick!u@h PRIVMSG #ch :hello there").unwrap();
/// assert_eq!(msg.prefix, "nick!u@h");
/// assert_eq!(msg.command, "PRIVMSG");
/// assert_eq!(msg.params, vec!["#ch", "hello there"]);
/// ```
pub fn parse_line(line: &str) -> ParseResult<Message> {
    if line.is_empty() {
        return Err(ParseError::MalformedMessage("empty line".to_string()));
    }

    let (prefix, remainder) = match line.strip_prefix(':') {
        Some(rest) => match rest.split_once(' ') {
            Some((prefix, remainder)) => (prefix, remainder),
            None => (rest, ""),
        },
        None => ("", line),
    };

    let mut tokens: Vec<String> = match remainder.split_once(" :") {
        Some((head, trailing)) => {
            let mut tokens: Vec<String> = head.split_whitespace().map(str::to_string).collect();
            tokens.push(trailing.to_string());
            tokens
        }
        None => remainder.split_whitespace().map(str::to_string).collect(),
    };

    if tokens.is_empty() {
        return Err(ParseError::MalformedMessage(format!(
            "no command in line: {:?}",
            line
        )));
    }

    let command = tokens.remove(0);

    Ok(Message {
        prefix: prefix.to_string(),
        command,
        params: tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_privmsg_with_trailing() {
        let msg = parse_line(":nick!u@h PRIVMSG #ch :hello there").unwrap();
        assert_eq!(msg.prefix, "nick!u@h");
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["#ch".to_string(), "hello there".to_string()]);
    }

    #[test]
    fn test_parse_without_prefix() {
        let msg = parse_line("PING :irc.example.net").unwrap();
        assert_eq!(msg.prefix, "");
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["irc.example.net".to_string()]);
    }

    #[test]
    fn test_parse_without_trailing() {
        let msg = parse_line(":alice!a@h JOIN #rust").unwrap();
        assert_eq!(msg.command, "JOIN");
        assert_eq!(msg.params, vec!["#rust".to_string()]);

        // No " :" means no empty trailing slot
        let msg = parse_line("MODE orderbot +i").unwrap();
        assert_eq!(msg.params, vec!["orderbot".to_string(), "+i".to_string()]);
    }

    #[test]
    fn test_trailing_split_at_first_marker_only() {
        let msg = parse_line(":a!b@c PRIVMSG bot :git projects :all of them").unwrap();
        assert_eq!(
            msg.params,
            vec!["bot".to_string(), "git projects :all of them".to_string()]
        );
    }

    #[test]
    fn test_empty_trailing() {
        let msg = parse_line(":a!b@c PRIVMSG bot :").unwrap();
        assert_eq!(msg.params, vec!["bot".to_string(), "".to_string()]);
    }

    #[test]
    fn test_numeric_command_is_kept_verbatim() {
        let msg = parse_line(":irc.example.net 433 * orderbot :Nickname is already in use").unwrap();
        assert_eq!(msg.prefix, "irc.example.net");
        assert_eq!(msg.command, "433");
        assert_eq!(
            msg.params,
            vec![
                "*".to_string(),
                "orderbot".to_string(),
                "Nickname is already in use".to_string()
            ]
        );
    }

    #[test]
    fn test_command_case_untouched() {
        let msg = parse_line("privmsg bot :hi").unwrap();
        assert_eq!(msg.command, "privmsg");
    }

    #[test]
    fn test_unknown_verb_parses() {
        let msg = parse_line("FROBNICATE a b").unwrap();
        assert_eq!(msg.command, "FROBNICATE");
    }

    #[test]
    fn test_empty_line_is_malformed() {
        assert!(matches!(parse_line(""), Err(ParseError::MalformedMessage(_))));
    }

    #[test]
    fn test_no_command_is_malformed() {
        assert!(matches!(parse_line("   "), Err(ParseError::MalformedMessage(_))));
        assert!(matches!(
            parse_line(":irc.example.net"),
            Err(ParseError::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_extra_whitespace_between_params() {
        let msg = parse_line(":a!b@c  PRIVMSG   bot   :x  y").unwrap();
        assert_eq!(msg.prefix, "a!b@c");
        assert_eq!(msg.command, "PRIVMSG");
        assert_eq!(msg.params, vec!["bot".to_string(), "x  y".to_string()]);
    }
}

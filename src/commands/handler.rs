//! Protocol Command Handler
//!
//! This module maps each parsed protocol message to exactly one handler.
//!
//! ## Dispatch Steps
//!
//! ```text
//! Message.command
//!       │
//!       ▼
//! ┌──────────────────┐   all digits?   ┌──────────────────────────┐
//! │  resolve()       │ ──────────────> │ alias table              │
//! │                  │                 │ 433 -> NICKINUSE         │
//! │                  │                 │ ??? -> IGNORECMD         │
//! └────────┬─────────┘                 └──────────────────────────┘
//!          │ upper-cased name
//!          ▼
//! ┌──────────────────┐   missing       ┌──────────────────────────┐
//! │  handler table   │ ──────────────> │ unknown-command handler  │
//! └────────┬─────────┘                 └──────────────────────────┘
//!          │
//!          ▼
//!   Result<Vec<Message>, DispatchError>
//!          │ Err: logged and dropped
//!          ▼
//!   outbound messages
//! ```
//!
//! Handlers never write to the connection themselves. They return the
//! messages to send, and the connection writes them out.
//!
//! ## Built-in Handlers
//!
//! - `PING` - answers with `PONG`
//! - `NICKINUSE` - picks a new nickname derived from the base nickname
//! - `IGNORECMD` - numeric replies nobody cares about
//! - `WELCOME` - registration completed
//! - `PRIVMSG` - hands orders addressed to the bot to the [`OrderRegistry`]
//! - `NICK`, `JOIN`, `PART`, `QUIT` - notify event listeners

use crate::commands::orders::OrderRegistry;
use crate::protocol::{is_channel, Message};
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Logical name of the nickname-in-use reply.
pub const NICKINUSE: &str = "NICKINUSE";

/// Logical name for numeric replies without a handler.
pub const IGNORECMD: &str = "IGNORECMD";

/// Logical name of the registration-complete reply.
pub const WELCOME: &str = "WELCOME";

/// Upper bound of the random nickname suffix.
const NICK_SUFFIX_MAX: u32 = 1000;

/// Errors a protocol handler can report.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No handler is registered for the command
    #[error("unhandled command: {0}")]
    UnhandledCommand(String),

    /// The server sent a PING carrying a prefix
    #[error("PING with unexpected prefix '{0}'")]
    PrefixedPing(String),

    /// A required parameter is absent
    #[error("{command}: missing parameter #{index}")]
    MissingParameter { command: String, index: usize },

    /// A message that needs a sender arrived without a prefix
    #[error("{0}: missing prefix")]
    MissingPrefix(String),
}

/// Result of running one protocol handler.
pub type HandlerResult = Result<Vec<Message>, DispatchError>;

/// A protocol handler: the dispatcher itself plus the message.
pub type ProtocolFn = fn(&CommandHandler, &Message) -> HandlerResult;

/// Membership and nickname changes observed on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NickChanged { old: String, new: String },
    Joined { nick: String, channel: String },
    Parted { nick: String, channel: String },
    Quit { nick: String, reason: Option<String> },
}

/// Something that wants to hear about [`Event`]s.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> EventListener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// The bot's nickname: the configured base and the one currently in use.
#[derive(Debug)]
pub struct Nickname {
    base: String,
    current: RwLock<String>,
}

impl Nickname {
    pub fn new(base: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            current: RwLock::new(base.clone()),
            base,
        }
    }

    /// The nickname from the configuration. Never changes.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The nickname currently in use.
    pub fn current(&self) -> String {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the current nickname, returning the old one.
    pub fn set(&self, nick: impl Into<String>) -> String {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *current, nick.into())
    }

    /// Switches to `<base>_<n>` with a random `n`, returning `(old, new)`.
    ///
    /// The suffix always goes on the base nickname, so repeated collisions
    /// never stack suffixes.
    pub fn rotate(&self) -> (String, String) {
        let suffix = rand::thread_rng().gen_range(1..=NICK_SUFFIX_MAX);
        let new = format!("{}_{}", self.base, suffix);
        let old = self.set(new.clone());
        (old, new)
    }
}

/// Dispatches protocol messages to their handlers.
pub struct CommandHandler {
    /// Upper-case command name -> handler
    handlers: HashMap<String, ProtocolFn>,
    /// Numeric code -> logical command name
    aliases: HashMap<String, String>,
    /// Fallback for commands without a handler
    unknown: ProtocolFn,
    nickname: Arc<Nickname>,
    orders: Arc<OrderRegistry>,
    listeners: Vec<Arc<dyn EventListener>>,
    /// Handler failures swallowed so far
    failures: AtomicU64,
}

impl CommandHandler {
    /// Creates a dispatcher with the built-in handlers and alias table.
    pub fn new(nickname: Arc<Nickname>, orders: Arc<OrderRegistry>) -> Self {
        let mut handlers: HashMap<String, ProtocolFn> = HashMap::new();
        handlers.insert("PING".to_string(), Self::handle_ping);
        handlers.insert(NICKINUSE.to_string(), Self::handle_nick_in_use);
        handlers.insert(IGNORECMD.to_string(), Self::handle_ignore);
        handlers.insert(WELCOME.to_string(), Self::handle_welcome);
        handlers.insert("PRIVMSG".to_string(), Self::handle_privmsg);
        handlers.insert("NICK".to_string(), Self::handle_nick);
        handlers.insert("JOIN".to_string(), Self::handle_join);
        handlers.insert("PART".to_string(), Self::handle_part);
        handlers.insert("QUIT".to_string(), Self::handle_quit);

        let mut aliases = HashMap::new();
        aliases.insert("001".to_string(), WELCOME.to_string());
        aliases.insert("433".to_string(), NICKINUSE.to_string());

        Self {
            handlers,
            aliases,
            unknown: Self::handle_unknown,
            nickname,
            orders,
            listeners: Vec::new(),
            failures: AtomicU64::new(0),
        }
    }

    /// Installs (or replaces) the handler for `command`.
    pub fn with_handler(mut self, command: &str, handler: ProtocolFn) -> Self {
        self.handlers.insert(command.to_ascii_uppercase(), handler);
        self
    }

    /// Replaces the unknown-command fallback.
    pub fn with_unknown_handler(mut self, handler: ProtocolFn) -> Self {
        self.unknown = handler;
        self
    }

    /// Adds an event listener.
    pub fn with_listener(mut self, listener: Arc<dyn EventListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Maps a numeric reply code to a logical command name.
    pub fn add_alias(&mut self, code: &str, command: &str) {
        self.aliases
            .insert(code.to_string(), command.to_ascii_uppercase());
    }

    /// The bot's nickname state.
    pub fn nickname(&self) -> &Arc<Nickname> {
        &self.nickname
    }

    /// The order registry PRIVMSG hands orders to.
    pub fn orders(&self) -> &Arc<OrderRegistry> {
        &self.orders
    }

    /// Number of handler failures swallowed so far.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Resolves a raw command to the name used in the handler table.
    pub fn resolve(&self, command: &str) -> String {
        if !command.is_empty() && command.bytes().all(|b| b.is_ascii_digit()) {
            return self
                .aliases
                .get(command)
                .cloned()
                .unwrap_or_else(|| IGNORECMD.to_string());
        }
        command.to_ascii_uppercase()
    }

    /// Runs exactly one handler for `message` and returns its result.
    pub fn try_dispatch(&self, message: &Message) -> HandlerResult {
        let name = self.resolve(&message.command);
        let handler = self.handlers.get(&name).copied().unwrap_or(self.unknown);
        handler(self, message)
    }

    /// Runs exactly one handler for `message`.
    ///
    /// Handler errors are logged and dropped here; they never reach the
    /// read loop.
    pub fn dispatch(&self, message: &Message) -> Vec<Message> {
        match self.try_dispatch(message) {
            Ok(out) => out,
            Err(DispatchError::UnhandledCommand(command)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(command = %command, "Unhandled command");
                Vec::new()
            }
            Err(e) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                warn!(command = %message.command, error = %e, "Handler failed");
                Vec::new()
            }
        }
    }

    fn notify(&self, event: Event) {
        debug!(event = ?event, listeners = self.listeners.len(), "Notifying listeners");
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }

    // ========================================================================
    // Built-in handlers
    // ========================================================================

    fn handle_unknown(&self, message: &Message) -> HandlerResult {
        Err(DispatchError::UnhandledCommand(message.command.clone()))
    }

    fn handle_ping(&self, message: &Message) -> HandlerResult {
        if !message.prefix.is_empty() {
            return Err(DispatchError::PrefixedPing(message.prefix.clone()));
        }
        if message.params.is_empty() {
            return Err(missing(message, 0));
        }

        let payload = message.params.join(" ");
        info!(payload = %payload, "Server ping");
        Ok(vec![Message::pong(&payload)])
    }

    fn handle_nick_in_use(&self, _message: &Message) -> HandlerResult {
        let (old, new) = self.nickname.rotate();
        warn!(old = %old, new = %new, "Nick already taken, trying another");
        self.notify(Event::NickChanged {
            old,
            new: new.clone(),
        });
        Ok(vec![Message::nick(&new)])
    }

    fn handle_ignore(&self, message: &Message) -> HandlerResult {
        debug!(command = %message.command, "Ignoring reply");
        Ok(Vec::new())
    }

    fn handle_welcome(&self, message: &Message) -> HandlerResult {
        info!(
            server = %message.prefix,
            nick = %self.nickname.current(),
            "Registered with server"
        );
        Ok(Vec::new())
    }

    fn handle_privmsg(&self, message: &Message) -> HandlerResult {
        let sender = message.source_nick();
        if sender.is_empty() {
            return Err(DispatchError::MissingPrefix(message.command.clone()));
        }
        let recipient = message.param(0).ok_or_else(|| missing(message, 0))?;
        let body = message.param(1).ok_or_else(|| missing(message, 1))?;
        let current = self.nickname.current();

        if is_channel(recipient) {
            return match addressed_to(body, &current) {
                Some(order) => {
                    debug!(sender = %sender, channel = %recipient, order = %order, "Channel order");
                    Ok(self.reply_all(sender, self.orders.serve(sender, order)))
                }
                None => {
                    debug!(sender = %sender, channel = %recipient, "Channel chatter ignored");
                    Ok(Vec::new())
                }
            };
        }

        if !recipient.eq_ignore_ascii_case(&current) {
            debug!(sender = %sender, recipient = %recipient, "Message not addressed to us");
            let canned = format!("Sorry, I am {}, not {}.", current, recipient);
            return Ok(vec![Message::privmsg(sender, &canned)]);
        }

        debug!(sender = %sender, order = %body, "Private order");
        Ok(self.reply_all(sender, self.orders.serve(sender, body)))
    }

    fn handle_nick(&self, message: &Message) -> HandlerResult {
        let old = message.source_nick();
        if old.is_empty() {
            return Err(DispatchError::MissingPrefix(message.command.clone()));
        }
        let new = message.param(0).ok_or_else(|| missing(message, 0))?;

        if old.eq_ignore_ascii_case(&self.nickname.current()) {
            info!(old = %old, new = %new, "Server changed our nick");
            self.nickname.set(new);
        }

        self.notify(Event::NickChanged {
            old: old.to_string(),
            new: new.to_string(),
        });
        Ok(Vec::new())
    }

    fn handle_join(&self, message: &Message) -> HandlerResult {
        let channel = message.param(0).ok_or_else(|| missing(message, 0))?;
        self.notify(Event::Joined {
            nick: message.source_nick().to_string(),
            channel: channel.to_string(),
        });
        Ok(Vec::new())
    }

    fn handle_part(&self, message: &Message) -> HandlerResult {
        let channel = message.param(0).ok_or_else(|| missing(message, 0))?;
        self.notify(Event::Parted {
            nick: message.source_nick().to_string(),
            channel: channel.to_string(),
        });
        Ok(Vec::new())
    }

    fn handle_quit(&self, message: &Message) -> HandlerResult {
        self.notify(Event::Quit {
            nick: message.source_nick().to_string(),
            reason: message.param(0).map(str::to_string),
        });
        Ok(Vec::new())
    }

    fn reply_all(&self, target: &str, lines: Vec<String>) -> Vec<Message> {
        lines
            .iter()
            .map(|line| Message::privmsg(target, line))
            .collect()
    }
}

fn missing(message: &Message, index: usize) -> DispatchError {
    DispatchError::MissingParameter {
        command: message.command.clone(),
        index,
    }
}

/// Strips a leading `<nick>:` or `<nick>,` from a channel message.
fn addressed_to<'a>(body: &'a str, nick: &str) -> Option<&'a str> {
    let head = body.get(..nick.len())?;
    if !head.eq_ignore_ascii_case(nick) {
        return None;
    }
    let rest = &body[nick.len()..];
    let rest = rest.strip_prefix(':').or_else(|| rest.strip_prefix(','))?;
    Some(rest.trim_start())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::orders::Order;
    use crate::protocol::parse_line;
    use std::sync::Mutex;

    fn handler_with_orders() -> CommandHandler {
        let mut registry = OrderRegistry::new();
        registry
            .register([
                Order::build("^hello", "hello - say hi", |inv| {
                    Ok(format!("Hi, {}", inv.sender).into())
                })
                .unwrap(),
                Order::build("^weather", "weather - current weather", |_| Ok("sunny".into()))
                    .unwrap(),
            ])
            .unwrap();

        CommandHandler::new(Arc::new(Nickname::new("orderbot")), Arc::new(registry))
    }

    fn dispatch_line(handler: &CommandHandler, line: &str) -> Vec<String> {
        handler
            .dispatch(&parse_line(line).unwrap())
            .iter()
            .map(Message::to_line)
            .collect()
    }

    fn boom(_: &CommandHandler, _: &Message) -> HandlerResult {
        Err(DispatchError::MissingParameter {
            command: "BOOM".to_string(),
            index: 7,
        })
    }

    #[test]
    fn test_resolve() {
        let handler = handler_with_orders();
        assert_eq!(handler.resolve("433"), NICKINUSE);
        assert_eq!(handler.resolve("001"), WELCOME);
        assert_eq!(handler.resolve("372"), IGNORECMD);
        assert_eq!(handler.resolve("privmsg"), "PRIVMSG");
    }

    #[test]
    fn test_ping_pong() {
        let handler = handler_with_orders();
        assert_eq!(
            dispatch_line(&handler, "PING :irc.example.net"),
            vec!["PONG irc.example.net"]
        );
        assert_eq!(
            dispatch_line(&handler, "PING :two words"),
            vec!["PONG :two words"]
        );
    }

    #[test]
    fn test_prefixed_ping_is_violation() {
        let handler = handler_with_orders();
        let msg = parse_line(":evil.example PING :x").unwrap();
        assert_eq!(
            handler.try_dispatch(&msg),
            Err(DispatchError::PrefixedPing("evil.example".to_string()))
        );
        assert!(handler.dispatch(&msg).is_empty());
        assert_eq!(handler.failures(), 1);
    }

    #[test]
    fn test_numeric_433_runs_collision_handler() {
        let handler = handler_with_orders();
        let out = dispatch_line(
            &handler,
            ":irc.example.net 433 * orderbot :Nickname is already in use",
        );

        let current = handler.nickname().current();
        assert!(current.starts_with("orderbot_"));
        assert_eq!(out, vec![format!("NICK {}", current)]);
        assert_eq!(handler.failures(), 0);
    }

    #[test]
    fn test_repeated_collisions_derive_from_base() {
        let handler = handler_with_orders();
        let line = ":irc.example.net 433 * orderbot :Nickname is already in use";

        for _ in 0..2 {
            dispatch_line(&handler, line);
            let current = handler.nickname().current();
            let suffix = current.strip_prefix("orderbot_").unwrap();
            assert!(suffix.parse::<u32>().is_ok(), "doubly suffixed: {}", current);
        }
        assert_eq!(handler.nickname().base(), "orderbot");
    }

    #[test]
    fn test_collision_notifies_listeners() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = handler_with_orders().with_listener(Arc::new(move |event: &Event| {
            sink.lock().unwrap().push(event.clone());
        }));

        dispatch_line(&handler, ":srv 433 * orderbot :in use");

        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Event::NickChanged { old, .. } if old == "orderbot"));
    }

    #[test]
    fn test_unmapped_numeric_is_ignored() {
        let handler = handler_with_orders();
        let msg = parse_line(":srv 372 orderbot :- message of the day").unwrap();
        assert_eq!(handler.try_dispatch(&msg), Ok(Vec::new()));
    }

    #[test]
    fn test_unknown_command() {
        let handler = handler_with_orders();
        let msg = parse_line(":srv FROBNICATE x").unwrap();
        assert_eq!(
            handler.try_dispatch(&msg),
            Err(DispatchError::UnhandledCommand("FROBNICATE".to_string()))
        );
        assert!(handler.dispatch(&msg).is_empty());
    }

    #[test]
    fn test_unknown_handler_override() {
        fn shrug(_: &CommandHandler, _: &Message) -> HandlerResult {
            Ok(Vec::new())
        }
        let handler = handler_with_orders().with_unknown_handler(shrug);
        let msg = parse_line("FROBNICATE").unwrap();
        assert_eq!(handler.try_dispatch(&msg), Ok(Vec::new()));
    }

    #[test]
    fn test_failing_handler_does_not_stop_dispatch() {
        let handler = handler_with_orders().with_handler("boom", boom);

        assert!(dispatch_line(&handler, "BOOM").is_empty());
        assert!(dispatch_line(&handler, "boom again").is_empty());
        assert_eq!(handler.failures(), 2);

        assert_eq!(dispatch_line(&handler, "PING :still"), vec!["PONG still"]);
    }

    #[test]
    fn test_custom_alias() {
        let mut handler = handler_with_orders().with_handler("boom", boom);
        handler.add_alias("999", "boom");
        assert_eq!(handler.resolve("999"), "BOOM");
    }

    #[test]
    fn test_private_order() {
        let handler = handler_with_orders();
        assert_eq!(
            dispatch_line(&handler, ":alice!~alice@host PRIVMSG orderbot :hello"),
            vec!["PRIVMSG alice :Hi, alice"]
        );
    }

    #[test]
    fn test_private_order_without_match_sends_help() {
        let handler = handler_with_orders();
        assert_eq!(
            dispatch_line(&handler, ":alice!~alice@host PRIVMSG orderbot :dance"),
            vec![
                "PRIVMSG alice :hello - say hi",
                "PRIVMSG alice :weather - current weather"
            ]
        );
    }

    #[test]
    fn test_message_for_someone_else_gets_canned_reply() {
        let handler = handler_with_orders();
        assert_eq!(
            dispatch_line(&handler, ":alice!~alice@host PRIVMSG otherbot :hello"),
            vec!["PRIVMSG alice :Sorry, I am orderbot, not otherbot."]
        );
    }

    #[test]
    fn test_channel_order_addressed_to_bot() {
        let handler = handler_with_orders();
        assert_eq!(
            dispatch_line(&handler, ":bob!b@h PRIVMSG #rust :orderbot: weather"),
            vec!["PRIVMSG bob sunny"]
        );
        assert_eq!(
            dispatch_line(&handler, ":bob!b@h PRIVMSG #rust :OrderBot, hello"),
            vec!["PRIVMSG bob :Hi, bob"]
        );
    }

    #[test]
    fn test_channel_help_listing_goes_to_sender() {
        let handler = handler_with_orders();
        assert_eq!(
            dispatch_line(&handler, ":bob!b@h PRIVMSG #rust :orderbot: dance"),
            vec![
                "PRIVMSG bob :hello - say hi",
                "PRIVMSG bob :weather - current weather"
            ]
        );
    }

    #[test]
    fn test_multiline_order_reply_becomes_separate_privmsgs() {
        let mut registry = OrderRegistry::new();
        registry
            .register([Order::build("^git projects", "git projects", |_| {
                Ok("project name: web\r\nQUIT :pwned".into())
            })
            .unwrap()])
            .unwrap();
        let handler = CommandHandler::new(Arc::new(Nickname::new("orderbot")), Arc::new(registry));

        assert_eq!(
            dispatch_line(&handler, ":alice!a@h PRIVMSG orderbot :git projects"),
            vec![
                "PRIVMSG alice :project name: web",
                "PRIVMSG alice :QUIT :pwned"
            ]
        );
    }

    #[test]
    fn test_channel_chatter_ignored() {
        let handler = handler_with_orders();
        assert!(dispatch_line(&handler, ":bob!b@h PRIVMSG #rust :hello everyone").is_empty());
        assert!(dispatch_line(&handler, ":bob!b@h PRIVMSG #rust :orderbotx: hi").is_empty());
    }

    #[test]
    fn test_privmsg_missing_params() {
        let handler = handler_with_orders();
        let msg = parse_line(":bob!b@h PRIVMSG orderbot").unwrap();
        assert_eq!(
            handler.try_dispatch(&msg),
            Err(DispatchError::MissingParameter {
                command: "PRIVMSG".to_string(),
                index: 1
            })
        );
    }

    #[test]
    fn test_sender_required() {
        let handler = handler_with_orders();
        for line in ["PRIVMSG orderbot :hello", "NICK :someone"] {
            let msg = parse_line(line).unwrap();
            assert_eq!(
                handler.try_dispatch(&msg),
                Err(DispatchError::MissingPrefix(msg.command.clone()))
            );
        }
    }

    #[test]
    fn test_server_nick_change_updates_current() {
        let handler = handler_with_orders();
        dispatch_line(&handler, ":orderbot!u@h NICK :orderbot2");
        assert_eq!(handler.nickname().current(), "orderbot2");

        // Someone else's change leaves ours alone
        dispatch_line(&handler, ":alice!u@h NICK :alicia");
        assert_eq!(handler.nickname().current(), "orderbot2");
    }

    #[test]
    fn test_membership_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = handler_with_orders().with_listener(Arc::new(move |event: &Event| {
            sink.lock().unwrap().push(event.clone());
        }));

        dispatch_line(&handler, ":alice!a@h JOIN #rust");
        dispatch_line(&handler, ":alice!a@h PART #rust");
        dispatch_line(&handler, ":alice!a@h QUIT :bye");

        let events = seen.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                Event::Joined {
                    nick: "alice".to_string(),
                    channel: "#rust".to_string()
                },
                Event::Parted {
                    nick: "alice".to_string(),
                    channel: "#rust".to_string()
                },
                Event::Quit {
                    nick: "alice".to_string(),
                    reason: Some("bye".to_string())
                },
            ]
        );
    }

    #[test]
    fn test_addressed_to() {
        assert_eq!(addressed_to("orderbot: hello", "orderbot"), Some("hello"));
        assert_eq!(addressed_to("orderbot,hello", "orderbot"), Some("hello"));
        assert_eq!(addressed_to("orderbot hello", "orderbot"), None);
        assert_eq!(addressed_to("order", "orderbot"), None);
    }
}

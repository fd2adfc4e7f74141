//! Order Registry
//!
//! Orders are the application-level commands a user sends to the bot in a
//! private message, such as `hello` or `git projects`. Each order is a
//! (pattern, handler, help text) triple registered once at startup.
//!
//! ## Matching
//!
//! `serve` runs the order text against every pattern in registration order.
//! Every matching order runs, not just the first, and the replies are
//! concatenated in registration order. When nothing matches, the caller
//! gets the full list of help texts back instead.
//!
//! Patterns see the literal text the user typed. Use `(?i)` in a pattern
//! to make it case-insensitive.

use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while registering orders.
///
/// These are configuration errors and should abort startup.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A pattern with the same source is already registered
    #[error("duplicate order pattern: {0}")]
    DuplicateOrder(String),

    /// The triple is unusable
    #[error("invalid order '{pattern}': {reason}")]
    InvalidOrder { pattern: String, reason: String },

    /// The pattern does not compile
    #[error("invalid order pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// What an order handler sends back: one line or several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    One(String),
    Many(Vec<String>),
}

impl Reply {
    /// Flattens the reply into `out`, one entry per line.
    ///
    /// Text containing CR or LF is split there, and empty pieces are
    /// skipped, so no entry can carry a second protocol line.
    fn flatten_into(self, out: &mut Vec<String>) {
        let lines = match self {
            Reply::One(line) => vec![line],
            Reply::Many(lines) => lines,
        };
        for line in lines {
            out.extend(
                line.split(|c| c == '\r' || c == '\n')
                    .filter(|piece| !piece.is_empty())
                    .map(str::to_string),
            );
        }
    }
}

impl From<String> for Reply {
    fn from(line: String) -> Self {
        Reply::One(line)
    }
}

impl From<&str> for Reply {
    fn from(line: &str) -> Self {
        Reply::One(line.to_string())
    }
}

impl From<Vec<String>> for Reply {
    fn from(lines: Vec<String>) -> Self {
        Reply::Many(lines)
    }
}

/// Everything a handler learns about the order that triggered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Nickname of the user who sent the order
    pub sender: String,
    /// The order text as typed
    pub text: String,
    /// Named capture groups of the matching pattern
    pub captures: HashMap<String, String>,
}

impl Invocation {
    /// Returns the named capture `name`, if the group participated in the match.
    pub fn capture(&self, name: &str) -> Option<&str> {
        self.captures.get(name).map(String::as_str)
    }
}

/// Signature of an order handler.
pub type OrderFn = dyn Fn(&Invocation) -> anyhow::Result<Reply> + Send + Sync;

/// A user-invocable (pattern, handler, help text) triple.
#[derive(Clone)]
pub struct Order {
    pattern: Regex,
    handler: Arc<OrderFn>,
    help: String,
}

impl Order {
    /// Creates an order from an already compiled pattern.
    pub fn new<F>(pattern: Regex, help: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&Invocation) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        Self {
            pattern,
            handler: Arc::new(handler),
            help: help.into(),
        }
    }

    /// Compiles `pattern` and creates an order from it.
    pub fn build<F>(pattern: &str, help: impl Into<String>, handler: F) -> Result<Self, RegistryError>
    where
        F: Fn(&Invocation) -> anyhow::Result<Reply> + Send + Sync + 'static,
    {
        Ok(Self::new(Regex::new(pattern)?, help, handler))
    }

    /// The pattern source.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// The help text shown in listings.
    pub fn help(&self) -> &str {
        &self.help
    }

    fn invocation(&self, sender: &str, text: &str) -> Option<Invocation> {
        let caps = self.pattern.captures(text)?;
        let captures = self
            .pattern
            .capture_names()
            .flatten()
            .filter_map(|name| caps.name(name).map(|m| (name.to_string(), m.as_str().to_string())))
            .collect();

        Some(Invocation {
            sender: sender.to_string(),
            text: text.to_string(),
            captures,
        })
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Order")
            .field("pattern", &self.pattern.as_str())
            .field("help", &self.help)
            .finish_non_exhaustive()
    }
}

/// The ordered set of registered orders.
///
/// Orders are never removed. Build the registry at startup, then share it
/// read-only (usually behind an `Arc`).
#[derive(Debug, Default, Clone)]
pub struct OrderRegistry {
    orders: Vec<Order>,
}

impl OrderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a batch of orders.
    ///
    /// The whole batch is validated first, so a rejected batch adds nothing.
    pub fn register(&mut self, orders: impl IntoIterator<Item = Order>) -> Result<(), RegistryError> {
        let batch: Vec<Order> = orders.into_iter().collect();

        for (i, order) in batch.iter().enumerate() {
            if order.help.trim().is_empty() {
                return Err(RegistryError::InvalidOrder {
                    pattern: order.pattern().to_string(),
                    reason: "help text is empty".to_string(),
                });
            }

            let mut seen_before = self.orders.iter().chain(&batch[..i]);
            if seen_before.any(|o| o.pattern() == order.pattern()) {
                return Err(RegistryError::DuplicateOrder(order.pattern().to_string()));
            }
        }

        for order in &batch {
            debug!(pattern = %order.pattern(), "Registered order");
        }
        self.orders.extend(batch);
        Ok(())
    }

    /// Serves an order sent by `sender`.
    ///
    /// Returns the concatenated replies of every matching order, or all help
    /// texts when no pattern matches. A failing handler is logged and
    /// contributes nothing; the other matching orders still run.
    pub fn serve(&self, sender: &str, text: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut matched = false;

        for order in &self.orders {
            let Some(invocation) = order.invocation(sender, text) else {
                continue;
            };
            matched = true;

            match (order.handler)(&invocation) {
                Ok(reply) => reply.flatten_into(&mut out),
                Err(e) => {
                    warn!(
                        sender = %sender,
                        pattern = %order.pattern(),
                        error = %e,
                        "Order handler failed"
                    );
                }
            }
        }

        if !matched {
            debug!(sender = %sender, text = %text, "No order matched, sending help");
            return self.help_texts();
        }

        out
    }

    /// Help texts of all orders, in registration order.
    pub fn help_texts(&self) -> Vec<String> {
        self.orders.iter().map(|o| o.help.clone()).collect()
    }

    /// Number of registered orders.
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    /// Returns true if no order is registered.
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Builds the `help` order, listing every order registered so far plus itself.
///
/// Register it last so the listing is complete.
pub fn help_order(
    registry: &OrderRegistry,
    pattern: &str,
    help: &str,
) -> Result<Order, RegistryError> {
    let mut listing = Vec::with_capacity(registry.len() + 3);
    listing.push("**** available commands ****".to_string());
    listing.extend(registry.help_texts());
    listing.push(help.to_string());
    listing.push("**** End of help ****".to_string());

    Order::build(pattern, help, move |_| Ok(Reply::Many(listing.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn greet() -> Order {
        Order::build("^hello", "hello - say hi", |inv| {
            Ok(format!("Hi, {}", inv.sender).into())
        })
        .unwrap()
    }

    #[test]
    fn test_serve_single_match() {
        let mut registry = OrderRegistry::new();
        registry.register([greet()]).unwrap();

        assert_eq!(registry.serve("alice", "hello"), vec!["Hi, alice"]);
    }

    #[test]
    fn test_named_captures_reach_handler() {
        let mut registry = OrderRegistry::new();
        let order = Order::build(
            r"^git (?P<action>\w+)(?: (?P<target>\S+))?",
            "git <action> [target]",
            |inv| {
                Ok(format!(
                    "{} on {}",
                    inv.capture("action").unwrap_or("?"),
                    inv.capture("target").unwrap_or("everything")
                )
                .into())
            },
        )
        .unwrap();
        registry.register([order]).unwrap();

        assert_eq!(registry.serve("bob", "git projects"), vec!["projects on everything"]);
        assert_eq!(registry.serve("bob", "git issues web"), vec!["issues on web"]);
    }

    #[test]
    fn test_all_matching_orders_run_in_order() {
        let mut registry = OrderRegistry::new();
        registry
            .register([
                Order::build("^git", "git - first", |_| Ok("first".into())).unwrap(),
                Order::build("^weather", "weather", |_| Ok("sunny".into())).unwrap(),
                Order::build("projects$", "projects - second", |_| {
                    Ok(vec!["second-a".to_string(), "second-b".to_string()].into())
                })
                .unwrap(),
            ])
            .unwrap();

        assert_eq!(
            registry.serve("carol", "git projects"),
            vec!["first", "second-a", "second-b"]
        );
    }

    #[test]
    fn test_no_match_returns_help_texts() {
        let mut registry = OrderRegistry::new();
        registry
            .register([
                greet(),
                Order::build("^weather", "weather - current weather", |_| Ok("sunny".into())).unwrap(),
            ])
            .unwrap();

        assert_eq!(
            registry.serve("alice", "what?"),
            vec!["hello - say hi", "weather - current weather"]
        );
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let mut registry = OrderRegistry::new();
        registry.register([greet()]).unwrap();

        assert_eq!(registry.serve("alice", "HELLO"), vec!["hello - say hi"]);
    }

    #[test]
    fn test_duplicate_pattern_rejected() {
        let mut registry = OrderRegistry::new();
        registry.register([greet()]).unwrap();

        let err = registry.register([greet()]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateOrder(p) if p == "^hello"));
    }

    #[test]
    fn test_duplicate_within_batch_rejected_atomically() {
        let mut registry = OrderRegistry::new();
        let weather = Order::build("^weather", "weather", |_| Ok("sunny".into())).unwrap();

        let err = registry.register([weather, greet(), greet()]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateOrder(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_blank_help_rejected() {
        let mut registry = OrderRegistry::new();
        let empty = Order::build("^a", "", |_| Ok("a".into())).unwrap();
        let blank = Order::build("^b", "   ", |_| Ok("b".into())).unwrap();

        assert!(matches!(
            registry.register([empty]),
            Err(RegistryError::InvalidOrder { .. })
        ));
        assert!(matches!(
            registry.register([blank]),
            Err(RegistryError::InvalidOrder { .. })
        ));
    }

    #[test]
    fn test_bad_pattern_rejected() {
        let err = Order::build("^(unclosed", "broken", |_| Ok("x".into())).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidPattern(_)));
    }

    #[test]
    fn test_failing_handler_is_isolated() {
        let mut registry = OrderRegistry::new();
        registry
            .register([
                Order::build("^git", "git - broken", |_| Err(anyhow::anyhow!("401 Unauthorized")))
                    .unwrap(),
                Order::build("^git ", "git - works", |_| Ok("still here".into())).unwrap(),
            ])
            .unwrap();

        assert_eq!(registry.serve("dave", "git projects"), vec!["still here"]);
    }

    #[test]
    fn test_empty_replies_dropped() {
        let mut registry = OrderRegistry::new();
        registry
            .register([Order::build("^quiet", "quiet", |_| {
                Ok(vec![String::new(), "only".to_string()].into())
            })
            .unwrap()])
            .unwrap();

        assert_eq!(registry.serve("eve", "quiet"), vec!["only"]);
    }

    #[test]
    fn test_multiline_reply_split_into_lines() {
        let mut registry = OrderRegistry::new();
        registry
            .register([
                Order::build("^git projects", "git projects", |_| {
                    Ok("project name: web\r\nQUIT :pwned".into())
                })
                .unwrap(),
                Order::build("projects$", "projects", |_| {
                    Ok(vec!["a\n\nb".to_string(), "\r\n".to_string()].into())
                })
                .unwrap(),
            ])
            .unwrap();

        let lines = registry.serve("alice", "git projects");
        assert_eq!(lines, vec!["project name: web", "QUIT :pwned", "a", "b"]);
        assert!(lines.iter().all(|l| !l.contains(&['\r', '\n'][..])));
    }

    #[test]
    fn test_help_order_lists_everything() {
        let mut registry = OrderRegistry::new();
        registry.register([greet()]).unwrap();
        let help = help_order(&registry, "^help", "help - this listing").unwrap();
        registry.register([help]).unwrap();

        assert_eq!(
            registry.serve("alice", "help"),
            vec![
                "**** available commands ****",
                "hello - say hi",
                "help - this listing",
                "**** End of help ****",
            ]
        );
    }
}

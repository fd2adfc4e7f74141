//! Command Dispatch Module
//!
//! This module implements the two dispatch tiers of the bot.
//!
//! ## Architecture
//!
//! ```text
//! Server line
//!       │
//!       ▼
//! ┌─────────────────┐
//! │  Line Parser    │  (protocol module)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ CommandHandler  │  protocol tier: PING, 433, PRIVMSG, ...
//! └────────┬────────┘
//!          │ PRIVMSG addressed to the bot
//!          ▼
//! ┌─────────────────┐
//! │ OrderRegistry   │  order tier: regex pattern -> handler
//! └─────────────────┘
//! ```

pub mod handler;
pub mod orders;

pub use handler::{
    CommandHandler, DispatchError, Event, EventListener, HandlerResult, Nickname, ProtocolFn,
    IGNORECMD, NICKINUSE, WELCOME,
};
pub use orders::{help_order, Invocation, Order, OrderRegistry, RegistryError, Reply};

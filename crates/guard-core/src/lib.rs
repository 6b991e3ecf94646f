//! Core moderation engine for the group guard bot.
//!
//! This crate is intentionally framework-agnostic. Telegram lives behind ports
//! (traits) implemented in the adapter crate; everything that decides whether a
//! message is suppressed, and every piece of persisted escalation state, lives here.

pub mod backup;
pub mod config;
pub mod content;
pub mod domain;
pub mod duration;
pub mod errors;
pub mod escalation;
pub mod flood;
pub mod formatting;
pub mod gate;
pub mod ledger;
pub mod locks;
pub mod logging;
pub mod messaging;
pub mod notices;
pub mod policy;
pub mod ports;
pub mod registry;
pub mod sanctions;
pub mod store;
pub mod subscription;

#[cfg(test)]
pub(crate) mod test_support;

pub use errors::{Error, Result};

//! modbot - pluggable command dispatcher for guild-based chat platforms.
//!
//! Feature modules declare capabilities (commands, webhooks, reactions,
//! quotes, persistence) and the dispatcher routes platform events and HTTP
//! webhook requests to them, enforcing per-guild prefixes and per-role
//! permissions on the way.

pub mod bot;
pub mod config;
pub mod error;
pub mod http;
pub mod metrics;
pub mod modules;
pub mod persistence;
pub mod platform;
pub mod telemetry;

pub use bot::{Bot, BotBuilder, BotContext, Dispatcher, MessageOutcome};
pub use config::Config;
pub use error::{BotError, LoadError, ModuleError, ModuleResult, PersistenceError, PlatformError};

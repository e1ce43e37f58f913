//! Integration test common infrastructure.
//!
//! Provides a booted bot over the local platform plus a handful of fixture
//! modules covering each capability.

pub mod fixtures;
pub mod harness;

#[allow(unused_imports)]
pub use fixtures::{BrokenHook, LabelHook, PingModule, Recorder, Seen};
#[allow(unused_imports)]
pub use harness::{
    BOT_USER, GUILD, MEMBER, MOD_ROLE, OWNER, TestBot, direct_message, guild_message,
};

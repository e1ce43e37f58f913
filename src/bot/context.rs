//! Shared context handed to every module call.

use super::guild::GuildContexts;
use super::registry::ModuleRegistry;
use crate::config::Config;
use crate::error::ModuleResult;
use crate::persistence::Storage;
use crate::platform::{GuildId, IncomingMessage, Platform};
use std::sync::Arc;

/// Everything a module may touch. Built once by
/// [`BotBuilder::init_persistence`](super::lifecycle::BotBuilder::init_persistence),
/// after which the registry is frozen.
pub struct BotContext {
    pub config: Arc<Config>,
    pub platform: Arc<dyn Platform>,
    pub modules: Arc<ModuleRegistry>,
    pub guilds: GuildContexts,
    pub storage: Storage,
}

impl BotContext {
    /// Send `text` to the channel `message` arrived on.
    pub async fn reply(&self, message: &IncomingMessage, text: &str) -> ModuleResult {
        self.platform.send_text(&message.channel, text).await?;
        Ok(())
    }

    /// Effective prefix for a guild, or the fallback outside one.
    pub fn prefix_for(&self, guild: Option<&GuildId>) -> String {
        self.guilds.prefix_for(guild)
    }
}

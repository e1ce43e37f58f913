//! Guild configuration commands.

use crate::bot::context::BotContext;
use crate::bot::module::{CommandModule, Module, ModuleDescriptor, RoleClass};
use crate::error::{ModuleError, ModuleResult};
use crate::platform::IncomingMessage;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

pub struct ConfigModule {
    descriptor: ModuleDescriptor,
}

impl Default for ConfigModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigModule {
    pub const NAME: &'static str = "Configuration";

    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new(Self::NAME, "Per-guild bot settings")
                .command("config", RoleClass::Owner),
        }
    }

    fn help(prefix: &str) -> String {
        format!(
            "```\nCommands:\n    {prefix}config prefix \"[prefix]\"\n        - set prefix used to access the bot\n```"
        )
    }

    async fn set_prefix(
        &self,
        ctx: &BotContext,
        raw: &str,
        message: &IncomingMessage,
    ) -> ModuleResult {
        let Some(guild) = message.guild_id() else {
            return Ok(());
        };
        // The argument must be double-quoted so prefixes may contain spaces.
        let Some(prefix) = raw
            .strip_prefix('"')
            .and_then(|p| p.strip_suffix('"'))
        else {
            return Err(ModuleError::InvalidArgument(format!(
                "prefix {raw} is not double-quoted"
            )));
        };
        if prefix.is_empty() {
            return ctx.reply(message, "The prefix cannot be empty.").await;
        }

        ctx.guilds.ensure(guild).await;
        ctx.guilds.set_prefix(guild, Some(prefix.to_string()));
        info!(guild = %guild, prefix = %prefix, "Guild prefix changed");

        let fallback = ctx.guilds.default_prefix();
        ctx.reply(
            message,
            &format!(
                "\"{prefix}[command]\" can now be used to access the bot.\n\"{fallback}[command]\" will still work as a fallback."
            ),
        )
        .await
    }
}

#[async_trait]
impl Module for ConfigModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn into_command(self: Arc<Self>) -> Option<Arc<dyn CommandModule>> {
        Some(self)
    }
}

#[async_trait]
impl CommandModule for ConfigModule {
    async fn on_command(
        &self,
        ctx: &BotContext,
        command: &[String],
        message: &IncomingMessage,
    ) -> ModuleResult {
        match command {
            [_, setting, value @ ..] if setting == "prefix" && !value.is_empty() => {
                self.set_prefix(ctx, &value.join(" "), message).await
            }
            [_, setting] if setting == "prefix" => Err(ModuleError::NeedMoreArgs),
            [] | [_] => {
                let prefix = ctx.prefix_for(message.guild_id());
                ctx.reply(message, &Self::help(&prefix)).await
            }
            _ => Ok(()),
        }
    }
}

//! Bot bootstrap for integration tests.
//!
//! Boots a bot over a [`LocalPlatform`] with a single guild and a memory
//! persistence backend, running every startup step.

#![allow(dead_code)]

use modbot::bot::{Bot, Dispatcher, Module};
use modbot::persistence::MemoryPersistence;
use modbot::platform::{Author, GuildRef, IncomingMessage, LocalPlatform, RoleId};
use modbot::{BotBuilder, Config, MessageOutcome};
use std::sync::Arc;

pub const GUILD: &str = "g-test";
pub const CHANNEL: &str = "c-general";
pub const OWNER: &str = "u-owner";
pub const MEMBER: &str = "u-member";
pub const BOT_USER: &str = "u-bot";
pub const MOD_ROLE: &str = "r-mod";

pub struct TestBot {
    pub bot: Bot,
    pub platform: Arc<LocalPlatform>,
    pub store: Arc<MemoryPersistence>,
}

impl TestBot {
    /// Boot with the given extra modules, in registration order.
    pub async fn start(modules: Vec<Arc<dyn Module>>) -> Self {
        let platform = Arc::new(
            LocalPlatform::new(Some(BOT_USER.into()))
                .with_guild(GUILD)
                .with_role(GUILD, "Moderators", MOD_ROLE),
        );
        let store = Arc::new(MemoryPersistence::new());

        let mut builder = BotBuilder::new(Config::default(), platform.clone());
        builder.register(store.clone());
        for module in modules {
            builder.register(module);
        }
        let bot = builder
            .load_default_modules()
            .init_persistence()
            .await
            .expect("persistence init");
        bot.load_global_config().await.expect("global config");
        bot.init_all_modules().await.expect("module init");

        Self {
            bot,
            platform,
            store,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        self.bot.dispatcher()
    }

    /// Send `content` as `author` holding `roles` in the test guild.
    pub async fn say(&self, author: &str, roles: &[&str], content: &str) -> MessageOutcome {
        self.dispatcher()
            .handle_message(&guild_message(author, roles, content))
            .await
    }

    /// Texts sent by the bot so far.
    pub fn replies(&self) -> Vec<String> {
        self.platform
            .sent_messages()
            .into_iter()
            .map(|m| m.text)
            .collect()
    }

    pub fn last_reply(&self) -> Option<String> {
        self.replies().pop()
    }
}

pub fn guild_message(author: &str, roles: &[&str], content: &str) -> IncomingMessage {
    IncomingMessage {
        channel: CHANNEL.into(),
        guild: Some(GuildRef {
            id: GUILD.into(),
            owner: OWNER.into(),
        }),
        author: Author {
            id: author.into(),
            roles: roles.iter().map(|r| RoleId::from(*r)).collect(),
        },
        content: content.to_string(),
    }
}

pub fn direct_message(author: &str, content: &str) -> IncomingMessage {
    IncomingMessage {
        channel: "c-dm".into(),
        guild: None,
        author: Author {
            id: author.into(),
            roles: Vec::new(),
        },
        content: content.to_string(),
    }
}

//! Chat platform abstraction.
//!
//! The dispatcher never talks to a gateway directly. It consumes
//! [`PlatformEvent`]s and calls back through the [`Platform`] trait for the
//! few things it needs: its own identity, the guild list, role lookups,
//! completion of partially-loaded reaction data, and sending text.

pub mod local;

pub use local::LocalPlatform;

use crate::error::PlatformError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Guild (server) identifier.
    GuildId
);
id_type!(
    /// User identifier.
    UserId
);
id_type!(
    /// Role identifier. The literal `*` is reserved as the wildcard role.
    RoleId
);
id_type!(
    /// Text channel identifier.
    ChannelId
);

/// Guild a message was posted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildRef {
    pub id: GuildId,
    pub owner: UserId,
}

/// Author of a message, with the roles they hold in the guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    pub id: UserId,
    pub roles: Vec<RoleId>,
}

/// A text message received from the platform.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub channel: ChannelId,
    /// `None` for direct messages.
    pub guild: Option<GuildRef>,
    pub author: Author,
    pub content: String,
}

impl IncomingMessage {
    /// Who is asking, as seen by the permission resolver.
    pub fn requester(&self) -> Requester {
        Requester {
            guild: self.guild.as_ref().map(|g| g.id.clone()),
            is_owner: self
                .guild
                .as_ref()
                .is_some_and(|g| g.owner == self.author.id),
            roles: self.author.roles.clone(),
        }
    }

    pub fn guild_id(&self) -> Option<&GuildId> {
        self.guild.as_ref().map(|g| &g.id)
    }
}

/// Authorization subject for a command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Requester {
    pub guild: Option<GuildId>,
    pub is_owner: bool,
    pub roles: Vec<RoleId>,
}

/// A reaction added to a message. `partial` is set when the platform only
/// delivered identifiers and the rest must be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: String,
    pub message_id: String,
    pub channel: ChannelId,
    pub guild: Option<GuildId>,
    pub partial: bool,
}

/// The user who added a reaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactingUser {
    pub id: UserId,
    pub name: Option<String>,
    pub partial: bool,
}

/// Inbound events from the platform connection.
#[derive(Debug, Clone)]
pub enum PlatformEvent {
    Message(IncomingMessage),
    Reaction {
        reaction: Reaction,
        user: ReactingUser,
    },
    GuildJoined(GuildId),
}

/// Outbound side of the chat platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// The bot's own user id, once logged in.
    fn current_user(&self) -> Option<UserId>;

    /// Guilds the bot is a member of at startup.
    async fn guilds(&self) -> Result<Vec<GuildId>, PlatformError>;

    /// Send plain text to a channel.
    async fn send_text(&self, channel: &ChannelId, text: &str) -> Result<(), PlatformError>;

    /// Look up a guild role by its display name.
    async fn resolve_role(
        &self,
        guild: &GuildId,
        name: &str,
    ) -> Result<Option<RoleId>, PlatformError>;

    /// Fill in a partially-delivered reaction.
    async fn complete_reaction(&self, reaction: &mut Reaction) -> Result<(), PlatformError>;

    /// Fill in a partially-delivered user.
    async fn complete_user(&self, user: &mut ReactingUser) -> Result<(), PlatformError>;

    /// Release the connection. Called last during shutdown.
    async fn disconnect(&self) {}
}

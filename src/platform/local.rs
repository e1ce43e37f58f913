//! In-process platform.
//!
//! Used by the binary when no remote gateway is attached, and by tests.
//! Outbound text is logged and kept in memory; guilds and roles are whatever
//! the caller seeds.

use super::{ChannelId, GuildId, Platform, ReactingUser, Reaction, RoleId, UserId};
use crate::error::PlatformError;
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::info;

/// A message sent through [`LocalPlatform::send_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel: ChannelId,
    pub text: String,
}

pub struct LocalPlatform {
    self_id: Option<UserId>,
    guilds: Mutex<Vec<GuildId>>,
    /// guild -> (role name, role id)
    roles: DashMap<GuildId, Vec<(String, RoleId)>>,
    sent: Mutex<Vec<SentMessage>>,
    fetches: AtomicUsize,
    connected: AtomicBool,
}

impl LocalPlatform {
    pub fn new(self_id: Option<UserId>) -> Self {
        Self {
            self_id,
            guilds: Mutex::new(Vec::new()),
            roles: DashMap::new(),
            sent: Mutex::new(Vec::new()),
            fetches: AtomicUsize::new(0),
            connected: AtomicBool::new(true),
        }
    }

    pub fn with_guild(self, guild: impl Into<GuildId>) -> Self {
        self.guilds.lock().push(guild.into());
        self
    }

    pub fn with_role(self, guild: impl Into<GuildId>, name: &str, id: impl Into<RoleId>) -> Self {
        self.roles
            .entry(guild.into())
            .or_default()
            .push((name.to_string(), id.into()));
        self
    }

    /// Snapshot of everything sent so far.
    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Number of completion fetches performed.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

impl Default for LocalPlatform {
    fn default() -> Self {
        Self::new(None)
    }
}

#[async_trait]
impl Platform for LocalPlatform {
    fn current_user(&self) -> Option<UserId> {
        self.self_id.clone()
    }

    async fn guilds(&self) -> Result<Vec<GuildId>, PlatformError> {
        Ok(self.guilds.lock().clone())
    }

    async fn send_text(&self, channel: &ChannelId, text: &str) -> Result<(), PlatformError> {
        if !self.is_connected() {
            return Err(PlatformError::NotConnected);
        }
        info!(channel = %channel, text = %text, "Outbound message");
        self.sent.lock().push(SentMessage {
            channel: channel.clone(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn resolve_role(
        &self,
        guild: &GuildId,
        name: &str,
    ) -> Result<Option<RoleId>, PlatformError> {
        Ok(self.roles.get(guild).and_then(|roles| {
            roles
                .iter()
                .find(|(role_name, _)| role_name == name)
                .map(|(_, id)| id.clone())
        }))
    }

    async fn complete_reaction(&self, reaction: &mut Reaction) -> Result<(), PlatformError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        reaction.partial = false;
        Ok(())
    }

    async fn complete_user(&self, user: &mut ReactingUser) -> Result<(), PlatformError> {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        if user.name.is_none() {
            user.name = Some(user.id.to_string());
        }
        user.partial = false;
        Ok(())
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
        info!("Platform connection released");
    }
}

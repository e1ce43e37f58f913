//! Per-guild context cache.
//!
//! Holds each guild's persisted settings for the life of the process, plus a
//! lazily compiled prefix matcher. The settings record stays open from
//! creation until [`GuildContexts::persist_all`] commits it at shutdown.
//! Writing a prefix clears the cached matcher in the same call.

use crate::error::PersistenceResult;
use crate::metrics;
use crate::persistence::{Storage, Transaction};
use crate::platform::GuildId;
use dashmap::DashMap;
use futures_util::future::join_all;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Record key of the per-guild settings.
pub const CONFIG_KEY: &str = "config";

/// Persisted guild settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Anchored matcher for one literal prefix.
#[derive(Debug)]
pub struct PrefixMatcher {
    prefix: String,
    pattern: Regex,
}

/// A message that started with the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixMatch<'t> {
    /// Non-whitespace run right after the prefix; may be empty.
    pub token: &'t str,
    /// Everything after the token.
    pub rest: &'t str,
}

impl PrefixMatcher {
    pub fn new(prefix: &str) -> Result<Self, regex::Error> {
        let pattern = Regex::new(&format!(r"^{}(\S*)", regex::escape(prefix)))?;
        Ok(Self {
            prefix: prefix.to_string(),
            pattern,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn matches<'t>(&self, text: &'t str) -> Option<PrefixMatch<'t>> {
        let token = self.pattern.captures(text)?.get(1)?;
        Some(PrefixMatch {
            token: token.as_str(),
            rest: &text[token.end()..],
        })
    }
}

struct GuildContext {
    settings: RwLock<GuildSettings>,
    matcher: RwLock<Option<Arc<PrefixMatcher>>>,
    record: Mutex<Option<Transaction<GuildSettings>>>,
}

pub struct GuildContexts {
    default_matcher: Arc<PrefixMatcher>,
    storage: Storage,
    contexts: DashMap<GuildId, Arc<GuildContext>>,
    creating: Mutex<()>,
}

impl GuildContexts {
    pub fn new(default_prefix: &str, storage: Storage) -> Result<Self, regex::Error> {
        Ok(Self {
            default_matcher: Arc::new(PrefixMatcher::new(default_prefix)?),
            storage,
            contexts: DashMap::new(),
            creating: Mutex::new(()),
        })
    }

    pub fn default_prefix(&self) -> &str {
        self.default_matcher.prefix()
    }

    pub fn default_matcher(&self) -> Arc<PrefixMatcher> {
        Arc::clone(&self.default_matcher)
    }

    /// Create the context for `guild` if it does not exist yet. Returns
    /// `true` when this call created it.
    ///
    /// Concurrent calls for the same guild open the settings record once.
    pub async fn ensure(&self, guild: &GuildId) -> bool {
        if self.contexts.contains_key(guild) {
            return false;
        }
        let _creating = self.creating.lock().await;
        if self.contexts.contains_key(guild) {
            return false;
        }

        let record = match self.storage.guild::<GuildSettings>(guild, CONFIG_KEY).await {
            Ok(record) => record,
            Err(e) => {
                warn!(guild = %guild, error = %e, "Could not open guild settings, using defaults");
                Storage::noop(CONFIG_KEY)
            }
        };
        let settings = GuildSettings::clone(&record);
        debug!(guild = %guild, prefix = ?settings.prefix, "Guild context created");

        self.contexts.insert(
            guild.clone(),
            Arc::new(GuildContext {
                settings: RwLock::new(settings),
                matcher: RwLock::new(None),
                record: Mutex::new(Some(record)),
            }),
        );
        metrics::set_guild_contexts(self.contexts.len());
        true
    }

    fn get(&self, guild: &GuildId) -> Option<Arc<GuildContext>> {
        self.contexts.get(guild).map(|c| Arc::clone(c.value()))
    }

    pub fn contains(&self, guild: &GuildId) -> bool {
        self.contexts.contains_key(guild)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn settings(&self, guild: &GuildId) -> Option<GuildSettings> {
        self.get(guild).map(|ctx| ctx.settings.read().clone())
    }

    /// The guild's own prefix, else the fallback.
    pub fn prefix_for(&self, guild: Option<&GuildId>) -> String {
        guild
            .and_then(|g| self.get(g))
            .and_then(|ctx| ctx.settings.read().prefix.clone())
            .unwrap_or_else(|| self.default_prefix().to_string())
    }

    /// Matcher for the guild's effective prefix, compiled on first use.
    pub fn prefix_matcher_for(&self, guild: Option<&GuildId>) -> Arc<PrefixMatcher> {
        let Some(ctx) = guild.and_then(|g| self.get(g)) else {
            return self.default_matcher();
        };
        if let Some(matcher) = ctx.matcher.read().as_ref() {
            return Arc::clone(matcher);
        }

        // Lock order: matcher, then settings.
        let mut cached = ctx.matcher.write();
        if let Some(matcher) = cached.as_ref() {
            return Arc::clone(matcher);
        }
        let Some(prefix) = ctx.settings.read().prefix.clone() else {
            return self.default_matcher();
        };
        match PrefixMatcher::new(&prefix) {
            Ok(matcher) => {
                let matcher = Arc::new(matcher);
                *cached = Some(Arc::clone(&matcher));
                matcher
            }
            Err(e) => {
                warn!(prefix = %prefix, error = %e, "Guild prefix did not compile, using fallback");
                self.default_matcher()
            }
        }
    }

    /// Whether a compiled matcher is cached for the guild.
    pub fn has_cached_matcher(&self, guild: &GuildId) -> bool {
        self.get(guild)
            .is_some_and(|ctx| ctx.matcher.read().is_some())
    }

    /// Store a new prefix and drop the cached matcher. Returns `false` for an
    /// unknown guild.
    pub fn set_prefix(&self, guild: &GuildId, prefix: Option<String>) -> bool {
        let Some(ctx) = self.get(guild) else {
            return false;
        };
        let mut cached = ctx.matcher.write();
        ctx.settings.write().prefix = prefix;
        *cached = None;
        true
    }

    /// Commit every open settings record. Each record is committed at most
    /// once; later calls report nothing for it.
    pub async fn persist_all(&self) -> Vec<(GuildId, PersistenceResult)> {
        let contexts: Vec<(GuildId, Arc<GuildContext>)> = self
            .contexts
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let commits = contexts.into_iter().map(|(guild, ctx)| async move {
            let record = ctx.record.lock().await.take();
            let mut record = record?;
            *record = ctx.settings.read().clone();
            Some((guild, record.commit().await))
        });

        let results: Vec<_> = join_all(commits).await.into_iter().flatten().collect();
        info!(guilds = results.len(), "Guild settings persisted");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::{MemoryPersistence, RecordKey};
    use std::sync::Arc;

    fn contexts(store: Arc<MemoryPersistence>) -> GuildContexts {
        GuildContexts::new(".", Storage::new(store)).unwrap()
    }

    #[test]
    fn matcher_captures_token_and_rest() {
        let m = PrefixMatcher::new("!").unwrap();
        let hit = m.matches("!echo hello world").unwrap();
        assert_eq!(hit.token, "echo");
        assert_eq!(hit.rest, " hello world");
        assert!(m.matches("echo").is_none());
        assert!(m.matches(" !echo").is_none());
    }

    #[test]
    fn matcher_escapes_regex_metacharacters() {
        let m = PrefixMatcher::new(".").unwrap();
        assert!(m.matches("xping").is_none());
        assert_eq!(m.matches(".ping").unwrap().token, "ping");

        let m = PrefixMatcher::new("$(").unwrap();
        assert_eq!(m.matches("$(ping").unwrap().token, "ping");
    }

    #[test]
    fn bare_prefix_yields_empty_token() {
        let m = PrefixMatcher::new("!").unwrap();
        assert_eq!(m.matches("!").unwrap().token, "");
        assert_eq!(m.matches("! ping").unwrap().token, "");
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let guilds = contexts(Arc::new(MemoryPersistence::new()));
        let g = GuildId::from("g1");
        assert!(guilds.ensure(&g).await);
        assert!(!guilds.ensure(&g).await);
        assert_eq!(guilds.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_ensure_creates_once() {
        let guilds = Arc::new(contexts(Arc::new(MemoryPersistence::new())));
        let g = GuildId::from("g1");
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let guilds = Arc::clone(&guilds);
                let g = g.clone();
                tokio::spawn(async move { guilds.ensure(&g).await })
            })
            .collect();
        let created = join_all(tasks)
            .await
            .into_iter()
            .filter(|r| matches!(r, Ok(true)))
            .count();
        assert_eq!(created, 1);
    }

    #[tokio::test]
    async fn unknown_guild_uses_fallback() {
        let guilds = contexts(Arc::new(MemoryPersistence::new()));
        assert_eq!(guilds.prefix_for(None), ".");
        assert_eq!(guilds.prefix_for(Some(&"nope".into())), ".");
        assert!(!guilds.set_prefix(&"nope".into(), Some("!".into())));
    }

    #[tokio::test]
    async fn prefix_change_takes_effect_immediately() {
        let guilds = contexts(Arc::new(MemoryPersistence::new()));
        let g = GuildId::from("g1");
        guilds.ensure(&g).await;

        assert!(guilds.set_prefix(&g, Some("!".into())));
        assert!(guilds.prefix_matcher_for(Some(&g)).matches("!ping").is_some());
        assert!(guilds.has_cached_matcher(&g));

        guilds.set_prefix(&g, Some("?".into()));
        assert!(!guilds.has_cached_matcher(&g));
        let matcher = guilds.prefix_matcher_for(Some(&g));
        assert!(matcher.matches("?ping").is_some());
        assert!(matcher.matches("!ping").is_none());
    }

    #[tokio::test]
    async fn settings_are_loaded_and_persisted() {
        let store = Arc::new(MemoryPersistence::new());
        let g = GuildId::from("g1");
        let key = RecordKey::guild(g.clone(), CONFIG_KEY);

        let guilds = contexts(Arc::clone(&store));
        guilds.ensure(&g).await;
        guilds.set_prefix(&g, Some("!".into()));
        let results = guilds.persist_all().await;
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_ok());
        assert_eq!(
            store.snapshot(&key),
            Some(serde_json::json!({"prefix": "!"}))
        );
        assert!(guilds.persist_all().await.is_empty(), "committed once");

        let reloaded = contexts(store);
        reloaded.ensure(&g).await;
        assert_eq!(reloaded.prefix_for(Some(&g)), "!");
    }
}

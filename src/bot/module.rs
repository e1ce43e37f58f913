//! Module descriptors and capability traits.
//!
//! A module is a plugin unit that declares a set of [`Capability`] tags in
//! its [`ModuleDescriptor`] and, for each tag, exposes the matching handler
//! trait through one of the `into_*` projections on [`Module`]. The registry
//! matches on the declared set and uses the projections to build its
//! dispatch tables.
//!
//! ## Capabilities
//!
//! - [`CommandModule`]: exact-match triggers with a required [`RoleClass`]
//! - [`PersistenceModule`]: the singular storage backend
//! - [`WebhookModule`]: longest-prefix matched webhook paths
//! - [`ReactionModule`]: emoji keys
//! - [`QuoteModule`]: single-line `> ` quotes

use super::context::BotContext;
use crate::error::{LoadError, ModuleResult, PersistenceError};
use crate::persistence::{RawTransaction, RecordKey};
use crate::platform::{IncomingMessage, ReactingUser, Reaction};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Capability tags a module can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Command,
    Persistence,
    Webhook,
    Reaction,
    Quote,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Persistence => "persistence",
            Self::Webhook => "webhook",
            Self::Reaction => "reaction",
            Self::Quote => "quote",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may run a command when a guild has no explicit permission for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleClass {
    Owner,
    Everyone,
}

/// Static description of a module.
///
/// Capability-specific fields are optional so that a descriptor which
/// declares a capability without its data can be represented and rejected
/// at load time.
#[derive(Debug, Clone, Default)]
pub struct ModuleDescriptor {
    pub name: String,
    pub description: String,
    pub capabilities: BTreeSet<Capability>,
    pub commands: Option<BTreeMap<String, RoleClass>>,
    pub webhook_paths: Option<Vec<String>>,
    pub reaction_keys: Option<Vec<String>>,
}

impl ModuleDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Default::default()
        }
    }

    /// Declare a capability without touching its data.
    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn command(mut self, trigger: impl Into<String>, class: RoleClass) -> Self {
        self.capabilities.insert(Capability::Command);
        self.commands
            .get_or_insert_with(BTreeMap::new)
            .insert(trigger.into(), class);
        self
    }

    pub fn webhook(mut self, path: impl Into<String>) -> Self {
        self.capabilities.insert(Capability::Webhook);
        let paths = self.webhook_paths.get_or_insert_with(Vec::new);
        let path = path.into();
        if !paths.contains(&path) {
            paths.push(path);
        }
        self
    }

    pub fn reaction(mut self, emoji: impl Into<String>) -> Self {
        self.capabilities.insert(Capability::Reaction);
        let keys = self.reaction_keys.get_or_insert_with(Vec::new);
        let emoji = emoji.into();
        if !keys.contains(&emoji) {
            keys.push(emoji);
        }
        self
    }

    pub fn quote(self) -> Self {
        self.with_capability(Capability::Quote)
    }

    pub fn persistence(self) -> Self {
        self.with_capability(Capability::Persistence)
    }

    pub fn has(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Role class declared for a trigger.
    pub fn role_class(&self, trigger: &str) -> Option<RoleClass> {
        self.commands.as_ref()?.get(trigger).copied()
    }
}

/// Webhook request as handed over by the listener, body fully buffered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookRequest {
    /// Path below the `/webhook` mount point, query string included.
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

/// What a webhook handler wants sent back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookResponse {
    pub status: u16,
    pub headers: Option<BTreeMap<String, String>>,
    pub body: Option<String>,
}

impl WebhookResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: None,
            body: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .get_or_insert_with(BTreeMap::new)
            .insert(name.into(), value.into());
        self
    }
}

/// A registered plugin unit.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    fn descriptor(&self) -> &ModuleDescriptor;

    /// Called once after all modules are registered.
    async fn on_load(&self, _ctx: &BotContext) -> ModuleResult {
        Ok(())
    }

    /// Called once during shutdown.
    async fn on_shutdown(&self, _ctx: &BotContext) -> ModuleResult {
        Ok(())
    }

    fn into_command(self: Arc<Self>) -> Option<Arc<dyn CommandModule>> {
        None
    }

    fn into_webhook(self: Arc<Self>) -> Option<Arc<dyn WebhookModule>> {
        None
    }

    fn into_reaction(self: Arc<Self>) -> Option<Arc<dyn ReactionModule>> {
        None
    }

    fn into_quote(self: Arc<Self>) -> Option<Arc<dyn QuoteModule>> {
        None
    }

    fn into_persistence(self: Arc<Self>) -> Option<Arc<dyn PersistenceModule>> {
        None
    }
}

#[async_trait]
pub trait CommandModule: Module {
    /// `command` is the full path: trigger followed by whitespace-split args.
    async fn on_command(
        &self,
        ctx: &BotContext,
        command: &[String],
        message: &IncomingMessage,
    ) -> ModuleResult;
}

#[async_trait]
pub trait WebhookModule: Module {
    async fn hook(&self, ctx: &BotContext, request: &WebhookRequest)
    -> ModuleResult<WebhookResponse>;
}

#[async_trait]
pub trait ReactionModule: Module {
    async fn on_reaction(
        &self,
        ctx: &BotContext,
        reaction: &Reaction,
        user: &ReactingUser,
    ) -> ModuleResult;
}

#[async_trait]
pub trait QuoteModule: Module {
    async fn on_quote(&self, ctx: &BotContext, message: &IncomingMessage) -> ModuleResult;
}

#[async_trait]
pub trait PersistenceModule: Module {
    /// Open a record for exclusive use.
    async fn open(&self, key: &RecordKey) -> Result<RawTransaction, PersistenceError>;

    /// Record from a previous storage layout, used once for migration.
    async fn legacy_record(&self, _key: &str) -> Option<Value> {
        None
    }
}

/// Pointer identity of a module, independent of its name.
pub fn identity<M: ?Sized>(module: &Arc<M>) -> usize {
    Arc::as_ptr(module) as *const () as usize
}

/// Check that every declared capability has its data and its handler.
pub fn validate(module: &Arc<dyn Module>) -> Result<(), Vec<LoadError>> {
    let descriptor = module.descriptor();
    let name = || descriptor.name.clone();
    let mut errors = Vec::new();

    if descriptor.capabilities.is_empty() {
        errors.push(LoadError::NoCapabilities { module: name() });
    }

    for capability in &descriptor.capabilities {
        match capability {
            Capability::Command => {
                if descriptor.commands.as_ref().is_none_or(|c| c.is_empty()) {
                    errors.push(LoadError::MissingField {
                        module: name(),
                        field: "commands",
                    });
                }
                if Arc::clone(module).into_command().is_none() {
                    errors.push(LoadError::MissingHandler {
                        module: name(),
                        handler: "on_command",
                    });
                }
            }
            Capability::Persistence => {
                if Arc::clone(module).into_persistence().is_none() {
                    errors.push(LoadError::MissingHandler {
                        module: name(),
                        handler: "open",
                    });
                }
            }
            Capability::Webhook => {
                if descriptor.webhook_paths.as_ref().is_none_or(|p| p.is_empty()) {
                    errors.push(LoadError::MissingField {
                        module: name(),
                        field: "webhook_paths",
                    });
                }
                if Arc::clone(module).into_webhook().is_none() {
                    errors.push(LoadError::MissingHandler {
                        module: name(),
                        handler: "hook",
                    });
                }
            }
            Capability::Reaction => {
                if descriptor.reaction_keys.as_ref().is_none_or(|k| k.is_empty()) {
                    errors.push(LoadError::MissingField {
                        module: name(),
                        field: "reaction_keys",
                    });
                }
                if Arc::clone(module).into_reaction().is_none() {
                    errors.push(LoadError::MissingHandler {
                        module: name(),
                        handler: "on_reaction",
                    });
                }
            }
            Capability::Quote => {
                if Arc::clone(module).into_quote().is_none() {
                    errors.push(LoadError::MissingHandler {
                        module: name(),
                        handler: "on_quote",
                    });
                }
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare(ModuleDescriptor);

    impl Module for Bare {
        fn descriptor(&self) -> &ModuleDescriptor {
            &self.0
        }
    }

    struct Quoter(ModuleDescriptor);

    impl Module for Quoter {
        fn descriptor(&self) -> &ModuleDescriptor {
            &self.0
        }

        fn into_quote(self: Arc<Self>) -> Option<Arc<dyn QuoteModule>> {
            Some(self)
        }
    }

    #[async_trait]
    impl QuoteModule for Quoter {
        async fn on_quote(&self, _ctx: &BotContext, _message: &IncomingMessage) -> ModuleResult {
            Ok(())
        }
    }

    #[test]
    fn builder_declares_capabilities() {
        let d = ModuleDescriptor::new("Mixed", "")
            .command("ping", RoleClass::Everyone)
            .webhook("/hooks")
            .webhook("/hooks")
            .reaction("👍");
        assert!(d.has(Capability::Command));
        assert!(d.has(Capability::Webhook));
        assert!(d.has(Capability::Reaction));
        assert!(!d.has(Capability::Quote));
        assert_eq!(d.webhook_paths.as_deref().map(<[String]>::len), Some(1));
        assert_eq!(d.role_class("ping"), Some(RoleClass::Everyone));
        assert_eq!(d.role_class("pong"), None);
    }

    #[test]
    fn empty_capability_set_is_rejected() {
        let module: Arc<dyn Module> = Arc::new(Bare(ModuleDescriptor::new("Empty", "")));
        let errors = validate(&module).unwrap_err();
        assert_eq!(
            errors,
            vec![LoadError::NoCapabilities {
                module: "Empty".into()
            }]
        );
    }

    #[test]
    fn webhook_without_paths_or_handler_reports_both() {
        let module: Arc<dyn Module> = Arc::new(Bare(
            ModuleDescriptor::new("Hooky", "").with_capability(Capability::Webhook),
        ));
        let errors = validate(&module).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&LoadError::MissingField {
            module: "Hooky".into(),
            field: "webhook_paths",
        }));
        assert!(errors.contains(&LoadError::MissingHandler {
            module: "Hooky".into(),
            handler: "hook",
        }));
    }

    #[test]
    fn command_without_triggers_is_rejected() {
        let module: Arc<dyn Module> = Arc::new(Bare(
            ModuleDescriptor::new("Mute", "").with_capability(Capability::Command),
        ));
        let errors = validate(&module).unwrap_err();
        assert!(errors.contains(&LoadError::MissingField {
            module: "Mute".into(),
            field: "commands",
        }));
    }

    #[test]
    fn quote_module_with_handler_is_valid() {
        let module: Arc<dyn Module> = Arc::new(Quoter(ModuleDescriptor::new("Q", "").quote()));
        assert!(validate(&module).is_ok());
    }

    #[test]
    fn identity_ignores_names() {
        let a: Arc<dyn Module> = Arc::new(Bare(ModuleDescriptor::new("Same", "")));
        let b: Arc<dyn Module> = Arc::new(Bare(ModuleDescriptor::new("Same", "")));
        assert_ne!(identity(&a), identity(&b));
        assert_eq!(identity(&a), identity(&Arc::clone(&a)));
    }

    #[test]
    fn webhook_response_builder() {
        let resp = WebhookResponse::new(202)
            .with_header("x-handled", "yes")
            .with_body("ok");
        assert_eq!(resp.status, 202);
        assert_eq!(resp.body.as_deref(), Some("ok"));
        assert_eq!(
            resp.headers.unwrap().get("x-handled").map(String::as_str),
            Some("yes")
        );
    }
}

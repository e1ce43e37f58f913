//! Module registry.
//!
//! Builds the dispatch tables from module descriptors: exact-match command
//! triggers, longest-prefix webhook paths, emoji reaction lists, the quote
//! list and the single persistence backend. Triggers and webhook paths are
//! first-wins: a later module claiming a taken key is logged and the binding
//! skipped, while the rest of that module still loads.

use super::context::BotContext;
use super::module::{
    Capability, CommandModule, Module, PersistenceModule, QuoteModule, ReactionModule,
    WebhookModule, identity, validate,
};
use crate::error::LoadError;
use crate::persistence::NoopPersistence;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{Instrument, error, info, info_span, warn};

/// What happened to one registration attempt.
#[derive(Debug, Default)]
pub struct RegistrationOutcome {
    /// At least one binding of the module was accepted.
    pub added: bool,
    /// Validation failures or rejected bindings.
    pub errors: Vec<LoadError>,
}

pub struct ModuleRegistry {
    commands: HashMap<String, Arc<dyn CommandModule>>,
    webhooks: BTreeMap<String, Arc<dyn WebhookModule>>,
    reactions: HashMap<String, Vec<Arc<dyn ReactionModule>>>,
    quotes: Vec<Arc<dyn QuoteModule>>,
    persistence: Arc<dyn PersistenceModule>,
    persistence_registered: bool,
    all: Vec<Arc<dyn Module>>,
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry {
    /// Empty registry backed by the no-op persistence module.
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            webhooks: BTreeMap::new(),
            reactions: HashMap::new(),
            quotes: Vec::new(),
            persistence: Arc::new(NoopPersistence::new()),
            persistence_registered: false,
            all: Vec::new(),
        }
    }

    /// Validate a module and bind each declared capability.
    pub fn register(&mut self, module: Arc<dyn Module>) -> RegistrationOutcome {
        let name = module.descriptor().name.clone();
        let mut outcome = RegistrationOutcome::default();

        if let Err(errors) = validate(&module) {
            for e in &errors {
                error!(module = %name, error = %e, "Invalid module");
            }
            error!(module = %name, "Skipping module");
            outcome.errors = errors;
            return outcome;
        }

        let descriptor = module.descriptor();
        for capability in &descriptor.capabilities {
            match capability {
                Capability::Command => {
                    let Some(handler) = Arc::clone(&module).into_command() else {
                        continue;
                    };
                    let triggers = descriptor.commands.iter().flat_map(|c| c.keys());
                    for trigger in triggers {
                        if let Some(owner) = self.commands.get(trigger) {
                            outcome.errors.push(LoadError::CommandTaken {
                                module: name.clone(),
                                trigger: trigger.clone(),
                                owner: owner.descriptor().name.clone(),
                            });
                            continue;
                        }
                        self.commands.insert(trigger.clone(), Arc::clone(&handler));
                        outcome.added = true;
                    }
                }
                Capability::Persistence => {
                    let Some(handler) = Arc::clone(&module).into_persistence() else {
                        continue;
                    };
                    if self.persistence_registered {
                        outcome.errors.push(LoadError::PersistenceTaken {
                            module: name.clone(),
                            owner: self.persistence.descriptor().name.clone(),
                        });
                        continue;
                    }
                    self.persistence = handler;
                    self.persistence_registered = true;
                    outcome.added = true;
                }
                Capability::Webhook => {
                    let Some(handler) = Arc::clone(&module).into_webhook() else {
                        continue;
                    };
                    let paths = descriptor.webhook_paths.iter().flatten();
                    for path in paths {
                        if let Some(owner) = self.webhooks.get(path) {
                            outcome.errors.push(LoadError::WebhookTaken {
                                module: name.clone(),
                                path: path.clone(),
                                owner: owner.descriptor().name.clone(),
                            });
                            continue;
                        }
                        self.webhooks.insert(path.clone(), Arc::clone(&handler));
                        outcome.added = true;
                    }
                }
                Capability::Reaction => {
                    let Some(handler) = Arc::clone(&module).into_reaction() else {
                        continue;
                    };
                    for emoji in descriptor.reaction_keys.iter().flatten() {
                        let list = self.reactions.entry(emoji.clone()).or_default();
                        if !list.iter().any(|m| identity(m) == identity(&handler)) {
                            list.push(Arc::clone(&handler));
                            outcome.added = true;
                        }
                    }
                }
                Capability::Quote => {
                    let Some(handler) = Arc::clone(&module).into_quote() else {
                        continue;
                    };
                    if !self.quotes.iter().any(|m| identity(m) == identity(&handler)) {
                        self.quotes.push(handler);
                        outcome.added = true;
                    }
                }
            }
        }

        for e in &outcome.errors {
            error!(module = %name, error = %e, "Binding rejected");
        }

        if outcome.added {
            if !self.all.iter().any(|m| identity(m) == identity(&module)) {
                self.all.push(module);
            }
            info!(module = %name, "Module registered");
        }

        outcome
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    /// Exact, case-sensitive trigger lookup.
    pub fn command(&self, trigger: &str) -> Option<&Arc<dyn CommandModule>> {
        self.commands.get(trigger)
    }

    /// Module bound to the longest registered path that prefixes `path`.
    pub fn webhook(&self, path: &str) -> Option<(&str, &Arc<dyn WebhookModule>)> {
        self.webhooks
            .iter()
            .filter(|(registered, _)| path.starts_with(registered.as_str()))
            .max_by_key(|(registered, _)| registered.len())
            .map(|(registered, module)| (registered.as_str(), module))
    }

    pub fn reactions(&self, emoji: &str) -> &[Arc<dyn ReactionModule>] {
        self.reactions.get(emoji).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn quotes(&self) -> &[Arc<dyn QuoteModule>] {
        &self.quotes
    }

    /// The registered backend, or the no-op one.
    pub fn persistence(&self) -> &Arc<dyn PersistenceModule> {
        &self.persistence
    }

    pub fn has_persistence(&self) -> bool {
        self.persistence_registered
    }

    /// Accepted trigger bindings.
    pub fn command_bindings(&self) -> impl Iterator<Item = (&str, &Arc<dyn CommandModule>)> {
        self.commands.iter().map(|(t, m)| (t.as_str(), m))
    }

    /// Registered modules in registration order, each once.
    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.all
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Run the persistence module's load hook.
    pub async fn load_persistence(&self, ctx: &BotContext) {
        let name = self.persistence.descriptor().name.clone();
        if let Err(e) = self.persistence.on_load(ctx).await {
            error!(module = %name, error = %e, "Persistence module failed to load");
        }
    }

    /// Run every non-persistence module's load hook once. Returns the number
    /// of hooks that succeeded.
    pub async fn initialize_all(&self, ctx: &BotContext) -> usize {
        let mut seen = HashSet::from([identity(&self.persistence)]);
        let mut loaded = 0;
        for module in &self.all {
            if !seen.insert(identity(module)) {
                continue;
            }
            let name = module.descriptor().name.clone();
            let span = info_span!("module_load", module = %name);
            match module.on_load(ctx).instrument(span).await {
                Ok(()) => loaded += 1,
                Err(e) => error!(module = %name, error = %e, "Module failed to load"),
            }
        }
        loaded
    }

    /// Run every module's shutdown hook once, persistence last.
    pub async fn shutdown_all(&self, ctx: &BotContext) {
        let mut seen = HashSet::from([identity(&self.persistence)]);
        for module in &self.all {
            if !seen.insert(identity(module)) {
                continue;
            }
            if let Err(e) = module.on_shutdown(ctx).await {
                warn!(module = %module.descriptor().name, error = %e, "Module shutdown failed");
            }
        }
        if let Err(e) = self.persistence.on_shutdown(ctx).await {
            warn!(
                module = %self.persistence.descriptor().name,
                error = %e,
                "Persistence shutdown failed"
            );
        }
    }
}

//! Bootstrap and shutdown.
//!
//! Startup is a fixed sequence:
//!
//! 1. [`BotBuilder::load_modules`]: configured modules from the catalog
//! 2. [`BotBuilder::load_default_modules`]: Configuration and Permissions
//! 3. [`BotBuilder::init_persistence`]: freeze the registry, load the backend
//! 4. [`Bot::load_global_config`]: guild contexts and legacy migration
//! 5. [`Bot::init_all_modules`]: every other module's load hook
//!
//! then [`Bot::run`] until cancelled, then [`Bot::shutdown`]. Steps 1 and 2
//! consume the builder; steps 4 onward check the current phase and refuse to
//! run out of order or twice.

use super::context::BotContext;
use super::dispatch::Dispatcher;
use super::guild::GuildContexts;
use super::module::{Module, identity};
use super::registry::{ModuleRegistry, RegistrationOutcome};
use crate::config::Config;
use crate::error::{BotError, PersistenceError};
use crate::modules::{ConfigModule, ModuleCatalog, PermissionsModule};
use crate::persistence::Storage;
use crate::platform::{GuildId, Platform, PlatformEvent};
use crate::telemetry::{StepTimer, spans};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Global record holding bootstrap state.
pub const GLOBAL_CONFIG_KEY: &str = "config";

#[derive(Debug, Default, Serialize, Deserialize)]
struct GlobalState {
    #[serde(default)]
    migrated: bool,
}

/// Previous storage layout: one global record with every guild's prefix.
#[derive(Debug, Default, Deserialize)]
struct LegacyConfig {
    #[serde(default)]
    guilds: HashMap<GuildId, LegacyGuild>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyGuild {
    prefix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    PersistenceReady,
    GlobalConfigLoaded,
    ModulesInitialized,
    Running,
    ShutDown,
}

impl Phase {
    fn as_str(self) -> &'static str {
        match self {
            Self::PersistenceReady => "persistence_ready",
            Self::GlobalConfigLoaded => "global_config_loaded",
            Self::ModulesInitialized => "modules_initialized",
            Self::Running => "running",
            Self::ShutDown => "shut_down",
        }
    }
}

/// Collects modules before the registry is frozen.
pub struct BotBuilder {
    config: Arc<Config>,
    platform: Arc<dyn Platform>,
    registry: ModuleRegistry,
    permissions: Arc<PermissionsModule>,
    defaults_loaded: bool,
}

impl BotBuilder {
    pub fn new(config: Config, platform: Arc<dyn Platform>) -> Self {
        Self {
            config: Arc::new(config),
            platform,
            registry: ModuleRegistry::new(),
            permissions: Arc::new(PermissionsModule::new()),
            defaults_loaded: false,
        }
    }

    /// Register a module instance directly.
    pub fn register(&mut self, module: Arc<dyn Module>) -> RegistrationOutcome {
        self.registry.register(module)
    }

    /// Instantiate and register each named module from the catalog. Unknown
    /// names are logged and skipped.
    pub fn load_modules(mut self, names: &[String], catalog: &ModuleCatalog) -> Self {
        let _timer = StepTimer::new("load_modules");
        let _span = spans::bootstrap("load_modules").entered();
        for name in names {
            match catalog.create(name) {
                Ok(module) => {
                    self.registry.register(module);
                }
                Err(e) => error!(error = %e, "Could not load module"),
            }
        }
        self
    }

    /// Register the Configuration and Permissions modules.
    pub fn load_default_modules(mut self) -> Self {
        if self.defaults_loaded {
            warn!("Default modules already loaded");
            return self;
        }
        let _timer = StepTimer::new("load_default_modules");
        let _span = spans::bootstrap("load_default_modules").entered();
        self.registry.register(Arc::new(ConfigModule::new()));
        self.registry
            .register(Arc::clone(&self.permissions) as Arc<dyn Module>);
        self.defaults_loaded = true;
        self
    }

    /// Freeze the registry, build the shared context and run the persistence
    /// module's load hook.
    pub async fn init_persistence(self) -> Result<Bot, BotError> {
        let _timer = StepTimer::new("init_persistence");
        if !self.registry.has_persistence() {
            info!("No persistence module registered, changes will not be saved");
        }

        let storage = Storage::new(Arc::clone(self.registry.persistence()));
        let guilds = GuildContexts::new(&self.config.prefix, storage.clone())
            .map_err(|e| BotError::InvalidPrefix(e.to_string()))?;
        let ctx = Arc::new(BotContext {
            config: self.config,
            platform: self.platform,
            modules: Arc::new(self.registry),
            guilds,
            storage,
        });

        ctx.modules
            .load_persistence(&ctx)
            .instrument(spans::bootstrap("init_persistence"))
            .await;

        Ok(Bot {
            dispatcher: Dispatcher::new(Arc::clone(&ctx), Arc::clone(&self.permissions) as _),
            permissions: self.permissions,
            ctx,
            phase: Mutex::new(Phase::PersistenceReady),
        })
    }
}

pub struct Bot {
    ctx: Arc<BotContext>,
    dispatcher: Dispatcher,
    /// Always the authorizer, registered or not.
    permissions: Arc<PermissionsModule>,
    phase: Mutex<Phase>,
}

impl Bot {
    pub fn context(&self) -> &Arc<BotContext> {
        &self.ctx
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn advance(&self, step: &'static str, from: Phase, to: Phase) -> Result<(), BotError> {
        let mut phase = self.phase.lock();
        if *phase != from {
            return Err(BotError::OutOfOrder {
                step,
                phase: phase.as_str(),
            });
        }
        *phase = to;
        Ok(())
    }

    /// Create a context for every guild the platform reports, then run the
    /// one-time legacy migration.
    pub async fn load_global_config(&self) -> Result<(), BotError> {
        self.advance(
            "load_global_config",
            Phase::PersistenceReady,
            Phase::GlobalConfigLoaded,
        )?;
        let _timer = StepTimer::new("load_global_config");
        let ctx = &*self.ctx;

        async {
            let guilds = match ctx.platform.guilds().await {
                Ok(guilds) => guilds,
                Err(e) => {
                    warn!(error = %e, "Could not enumerate guilds");
                    Vec::new()
                }
            };
            for guild in &guilds {
                ctx.guilds.ensure(guild).await;
            }
            info!(guilds = ctx.guilds.len(), "Guild contexts loaded");

            let mut global = ctx.storage.global::<GlobalState>(GLOBAL_CONFIG_KEY).await?;
            if !global.migrated {
                if let Some(legacy) = ctx.storage.legacy_record(GLOBAL_CONFIG_KEY).await {
                    migrate_legacy(&ctx.guilds, legacy);
                }
                global.migrated = true;
            }
            log_commit(GLOBAL_CONFIG_KEY, global.commit().await);
            Ok::<(), BotError>(())
        }
        .instrument(spans::bootstrap("load_global_config"))
        .await
    }

    /// Run the load hook of every module except the persistence backend.
    pub async fn init_all_modules(&self) -> Result<(), BotError> {
        self.advance(
            "init_all_modules",
            Phase::GlobalConfigLoaded,
            Phase::ModulesInitialized,
        )?;
        let _timer = StepTimer::new("init_all_modules");
        let loaded = self
            .ctx
            .modules
            .initialize_all(&self.ctx)
            .instrument(spans::bootstrap("init_all_modules"))
            .await;

        let modules = &self.ctx.modules;
        if !modules
            .modules()
            .iter()
            .any(|m| identity(m) == identity(&self.permissions))
        {
            warn!(
                module = PermissionsModule::NAME,
                "Permission commands are bound elsewhere, building defaults anyway"
            );
            self.permissions.load_defaults(modules);
        }
        info!(
            loaded,
            registered = modules.modules().len(),
            "Modules initialized"
        );
        Ok(())
    }

    /// Dispatch events until `shutdown` fires or the channel closes. Each
    /// event runs in its own task; in-flight tasks are awaited before
    /// returning.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<PlatformEvent>,
        shutdown: CancellationToken,
    ) -> Result<(), BotError> {
        self.advance("run", Phase::ModulesInitialized, Phase::Running)?;
        info!("Dispatching events");

        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(finished) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = finished {
                        error!(error = %e, "Event task failed");
                    }
                }
                event = events.recv() => match event {
                    Some(event) => {
                        let dispatcher = self.dispatcher.clone();
                        tasks.spawn(async move { dispatcher.handle_event(event).await });
                    }
                    None => {
                        debug!("Event channel closed");
                        break;
                    }
                },
            }
        }

        while let Some(finished) = tasks.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "Event task failed");
            }
        }
        Ok(())
    }

    /// Persist guild settings, shut modules down (persistence last) and
    /// release the platform. Runs once, from any phase.
    pub async fn shutdown(&self) -> Result<(), BotError> {
        {
            let mut phase = self.phase.lock();
            if *phase == Phase::ShutDown {
                return Err(BotError::OutOfOrder {
                    step: "shutdown",
                    phase: phase.as_str(),
                });
            }
            *phase = Phase::ShutDown;
        }
        let _timer = StepTimer::new("shutdown");
        info!("Shutting down");

        for (guild, result) in self.ctx.guilds.persist_all().await {
            log_commit(guild.as_str(), result);
        }
        self.ctx.modules.shutdown_all(&self.ctx).await;
        self.ctx.platform.disconnect().await;
        info!("Shutdown complete");
        Ok(())
    }
}

fn migrate_legacy(guilds: &GuildContexts, legacy: serde_json::Value) {
    let legacy: LegacyConfig = match serde_json::from_value(legacy) {
        Ok(legacy) => legacy,
        Err(e) => {
            warn!(error = %e, "Legacy config did not decode, skipping migration");
            return;
        }
    };
    let mut migrated = 0;
    for (guild, settings) in legacy.guilds {
        let Some(prefix) = settings.prefix else {
            continue;
        };
        if guilds.set_prefix(&guild, Some(prefix)) {
            migrated += 1;
        } else {
            debug!(guild = %guild, "Legacy guild not joined, skipped");
        }
    }
    info!(migrated, "Legacy guild prefixes migrated");
}

fn log_commit(record: &str, result: Result<(), PersistenceError>) {
    match result {
        Ok(()) => {}
        Err(PersistenceError::Unavailable(reason)) => {
            debug!(record, reason = %reason, "Record not persisted");
        }
        Err(e) => warn!(record, error = %e, "Record commit failed"),
    }
}

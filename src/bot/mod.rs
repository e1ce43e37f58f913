//! Dispatcher core: module model, registry, guild contexts, dispatch and
//! the bootstrap lifecycle.

pub mod context;
pub mod dispatch;
pub mod guild;
pub mod lifecycle;
pub mod module;
pub mod registry;

pub use context::BotContext;
pub use dispatch::{Authorizer, Dispatcher, MessageOutcome, UNHANDLED_WEBHOOK_BODY};
pub use guild::{GuildContexts, GuildSettings, PrefixMatcher};
pub use lifecycle::{Bot, BotBuilder};
pub use module::{
    Capability, CommandModule, Module, ModuleDescriptor, PersistenceModule, QuoteModule,
    ReactionModule, RoleClass, WebhookModule, WebhookRequest, WebhookResponse,
};
pub use registry::{ModuleRegistry, RegistrationOutcome};

//! Small modules used to drive the dispatcher from integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use modbot::bot::{
    BotContext, CommandModule, Module, ModuleDescriptor, QuoteModule, ReactionModule, RoleClass,
    WebhookModule, WebhookRequest, WebhookResponse,
};
use modbot::platform::{IncomingMessage, ReactingUser, Reaction};
use modbot::{ModuleError, ModuleResult};
use parking_lot::Mutex;
use std::sync::Arc;

/// `ping` for everyone, answers `pong`. `fail` errors, `boom` panics.
pub struct PingModule {
    descriptor: ModuleDescriptor,
}

impl PingModule {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            descriptor: ModuleDescriptor::new("Ping", "Liveness check")
                .command("ping", RoleClass::Everyone)
                .command("fail", RoleClass::Everyone)
                .command("boom", RoleClass::Everyone),
        })
    }
}

#[async_trait]
impl Module for PingModule {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn into_command(self: Arc<Self>) -> Option<Arc<dyn CommandModule>> {
        Some(self)
    }
}

#[async_trait]
impl CommandModule for PingModule {
    async fn on_command(
        &self,
        ctx: &BotContext,
        command: &[String],
        message: &IncomingMessage,
    ) -> ModuleResult {
        match command.first().map(String::as_str) {
            Some("fail") => Err(ModuleError::Internal("requested failure".into())),
            Some("boom") => panic!("requested panic"),
            _ => {
                let args = command[1..].join(" ");
                let text = if args.is_empty() {
                    "pong".to_string()
                } else {
                    format!("pong {args}")
                };
                ctx.reply(message, &text).await
            }
        }
    }
}

/// Answers webhooks under `path` with `label` as the body.
pub struct LabelHook {
    descriptor: ModuleDescriptor,
    label: &'static str,
}

impl LabelHook {
    pub fn new(label: &'static str, path: &str) -> Arc<Self> {
        Arc::new(Self {
            descriptor: ModuleDescriptor::new(label, "Labelled webhook").webhook(path),
            label,
        })
    }
}

#[async_trait]
impl Module for LabelHook {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn into_webhook(self: Arc<Self>) -> Option<Arc<dyn WebhookModule>> {
        Some(self)
    }
}

#[async_trait]
impl WebhookModule for LabelHook {
    async fn hook(
        &self,
        _ctx: &BotContext,
        request: &WebhookRequest,
    ) -> ModuleResult<WebhookResponse> {
        let mut response = WebhookResponse::new(200).with_body(self.label);
        if let Some(token) = request.headers.get("x-token") {
            response = response.with_header("x-seen-token", token.clone());
        }
        if !request.body.is_empty() {
            response = response.with_header("x-body-length", request.body.len().to_string());
        }
        Ok(response)
    }
}

/// Webhook at `/broken` that always errors.
pub struct BrokenHook {
    descriptor: ModuleDescriptor,
}

impl BrokenHook {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            descriptor: ModuleDescriptor::new("Broken", "Always fails").webhook("/broken"),
        })
    }
}

#[async_trait]
impl Module for BrokenHook {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn into_webhook(self: Arc<Self>) -> Option<Arc<dyn WebhookModule>> {
        Some(self)
    }
}

#[async_trait]
impl WebhookModule for BrokenHook {
    async fn hook(
        &self,
        _ctx: &BotContext,
        _request: &WebhookRequest,
    ) -> ModuleResult<WebhookResponse> {
        Err(ModuleError::Internal("upstream rejected".into()))
    }
}

/// What a [`Recorder`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seen {
    Reaction {
        emoji: String,
        user_name: Option<String>,
        partial: bool,
    },
    Quote(String),
}

/// Records every reaction on `emoji` and every quote.
pub struct Recorder {
    descriptor: ModuleDescriptor,
    seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    pub fn new(emoji: &str) -> Arc<Self> {
        Arc::new(Self {
            descriptor: ModuleDescriptor::new("Recorder", "Remembers events")
                .reaction(emoji)
                .quote(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Module for Recorder {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn into_reaction(self: Arc<Self>) -> Option<Arc<dyn ReactionModule>> {
        Some(self)
    }

    fn into_quote(self: Arc<Self>) -> Option<Arc<dyn QuoteModule>> {
        Some(self)
    }
}

#[async_trait]
impl ReactionModule for Recorder {
    async fn on_reaction(
        &self,
        _ctx: &BotContext,
        reaction: &Reaction,
        user: &ReactingUser,
    ) -> ModuleResult {
        self.seen.lock().push(Seen::Reaction {
            emoji: reaction.emoji.clone(),
            user_name: user.name.clone(),
            partial: reaction.partial || user.partial,
        });
        Ok(())
    }
}

#[async_trait]
impl QuoteModule for Recorder {
    async fn on_quote(&self, _ctx: &BotContext, message: &IncomingMessage) -> ModuleResult {
        self.seen.lock().push(Seen::Quote(message.content.clone()));
        Ok(())
    }
}

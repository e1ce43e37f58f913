//! Event dispatch.
//!
//! Routes platform events and webhook requests to modules. Handler failures
//! and panics are contained here: messages and reactions log and drop them,
//! webhooks answer 500.

use super::context::BotContext;
use super::module::{WebhookRequest, WebhookResponse};
use crate::error::{ModuleError, PersistenceError};
use crate::metrics;
use crate::platform::{IncomingMessage, PlatformEvent, ReactingUser, Reaction, Requester};
use crate::telemetry::{CommandTimer, spans};
use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::join_all;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{Instrument, debug, error, warn};
use uuid::Uuid;

/// Body sent when no webhook module claims a path.
pub const UNHANDLED_WEBHOOK_BODY: &str = "Received, but no handler registered";

/// Decides whether a requester may run a command path.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(
        &self,
        ctx: &BotContext,
        path: &[String],
        requester: &Requester,
    ) -> Result<bool, PersistenceError>;
}

/// What the dispatcher did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Sent by the bot itself.
    SelfAuthored,
    /// Matched neither prefix and was not a quote.
    NoPrefix,
    /// A prefix with nothing directly after it.
    EmptyToken,
    UnknownCommand,
    Denied,
    Invoked,
    /// The handler, or the permission check, failed.
    Failed,
    /// A quote, handed to this many quote modules.
    Quoted(usize),
}

/// Single-line quote: starts with `> ` and has no newline.
pub fn is_quote(content: &str) -> bool {
    content.starts_with("> ") && !content.contains('\n')
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Await a handler future, turning a panic into [`ModuleError::Panicked`].
async fn contain<T, F>(name: &str, future: F) -> Result<T, ModuleError>
where
    F: Future<Output = Result<T, ModuleError>>,
{
    let result = match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            error!(module = %name, panic = %panic_message(payload.as_ref()), "Module handler panicked");
            Err(ModuleError::Panicked)
        }
    };
    if let Err(e) = &result {
        metrics::record_module_error(name, e.error_code());
        if !matches!(e, ModuleError::Panicked) {
            warn!(module = %name, error = %e, "Module handler failed");
        }
    }
    result
}

#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<BotContext>,
    authorizer: Arc<dyn Authorizer>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<BotContext>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self { ctx, authorizer }
    }

    pub fn context(&self) -> &Arc<BotContext> {
        &self.ctx
    }

    /// Route one platform event.
    pub async fn handle_event(&self, event: PlatformEvent) {
        match event {
            PlatformEvent::Message(message) => {
                let outcome = self.handle_message(&message).await;
                debug!(?outcome, "Message handled");
            }
            PlatformEvent::Reaction { reaction, user } => {
                self.handle_reaction(reaction, user).await;
            }
            PlatformEvent::GuildJoined(guild) => {
                if self.ctx.guilds.ensure(&guild).await {
                    debug!(guild = %guild, "Joined guild");
                }
            }
        }
    }

    pub async fn handle_message(&self, message: &IncomingMessage) -> MessageOutcome {
        let ctx = &*self.ctx;
        if ctx
            .platform
            .current_user()
            .is_some_and(|me| me == message.author.id)
        {
            return MessageOutcome::SelfAuthored;
        }

        let guild = message.guild_id();
        let content = message.content.as_str();
        let hit = ctx
            .guilds
            .prefix_matcher_for(guild)
            .matches(content)
            .or_else(|| ctx.guilds.default_matcher().matches(content));

        let Some(hit) = hit else {
            if is_quote(content) {
                return MessageOutcome::Quoted(self.dispatch_quote(message).await);
            }
            return MessageOutcome::NoPrefix;
        };
        if hit.token.is_empty() {
            return MessageOutcome::EmptyToken;
        }

        let Some(module) = ctx.modules.command(hit.token) else {
            debug!(trigger = %hit.token, "Unknown command");
            return MessageOutcome::UnknownCommand;
        };

        let path: Vec<String> = std::iter::once(hit.token)
            .chain(hit.rest.split_whitespace())
            .map(str::to_string)
            .collect();
        let trigger = hit.token;
        let span = spans::command(
            trigger,
            message.author.id.as_str(),
            guild.map(|g| g.as_str()),
        );

        async {
            match self
                .authorizer
                .authorize(ctx, &path, &message.requester())
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Permission denied");
                    metrics::record_denied(trigger);
                    return MessageOutcome::Denied;
                }
                Err(e) => {
                    warn!(error = %e, "Permission check failed");
                    return MessageOutcome::Failed;
                }
            }

            let _timer = CommandTimer::new(trigger);
            match contain(&module.descriptor().name, module.on_command(ctx, &path, message)).await {
                Ok(()) => MessageOutcome::Invoked,
                Err(_) => MessageOutcome::Failed,
            }
        }
        .instrument(span)
        .await
    }

    async fn dispatch_quote(&self, message: &IncomingMessage) -> usize {
        let ctx = &*self.ctx;
        let modules = ctx.modules.quotes();
        if modules.is_empty() {
            return 0;
        }
        metrics::record_quote();
        join_all(
            modules
                .iter()
                .map(|module| contain(&module.descriptor().name, module.on_quote(ctx, message))),
        )
        .await;
        modules.len()
    }

    /// Hand a reaction to every module bound to its emoji. Partial data is
    /// completed first, and only when someone is listening. Returns the
    /// number of modules invoked.
    pub async fn handle_reaction(&self, mut reaction: Reaction, mut user: ReactingUser) -> usize {
        let ctx = &*self.ctx;
        let modules = ctx.modules.reactions(&reaction.emoji);
        if modules.is_empty() {
            return 0;
        }
        let span = spans::reaction(&reaction.emoji, user.id.as_str());

        async {
            if reaction.partial || user.partial {
                let platform = &ctx.platform;
                let (completed_reaction, completed_user) = tokio::join!(
                    async {
                        if reaction.partial {
                            platform.complete_reaction(&mut reaction).await
                        } else {
                            Ok(())
                        }
                    },
                    async {
                        if user.partial {
                            platform.complete_user(&mut user).await
                        } else {
                            Ok(())
                        }
                    }
                );
                if let Err(e) = completed_reaction.and(completed_user) {
                    warn!(error = %e, "Could not complete partial reaction");
                    return 0;
                }
            }

            join_all(
                modules
                    .iter()
                    .map(|module| contain(&module.descriptor().name, module.on_reaction(ctx, &reaction, &user))),
            )
            .await;
            modules.len()
        }
        .instrument(span)
        .await
    }

    /// Answer a webhook request. Never fails.
    pub async fn handle_webhook(&self, request: WebhookRequest) -> WebhookResponse {
        let ctx = &*self.ctx;
        let request_id = Uuid::new_v4().to_string();
        let span = spans::webhook(&request.path, &request_id);

        let response = async {
            let Some((registered, module)) = ctx.modules.webhook(&request.path) else {
                debug!("No webhook handler");
                return WebhookResponse::new(200).with_body(UNHANDLED_WEBHOOK_BODY);
            };
            debug!(registered, module = %module.descriptor().name, "Webhook matched");
            match contain(&module.descriptor().name, module.hook(ctx, &request)).await {
                Ok(response) => response,
                Err(_) => WebhookResponse::new(500),
            }
        }
        .instrument(span)
        .await;

        metrics::record_webhook_response(response.status);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_are_single_line() {
        assert!(is_quote("> hello"));
        assert!(!is_quote(">hello"));
        assert!(!is_quote("> hello\nworld"));
        assert!(!is_quote("hello"));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }
}

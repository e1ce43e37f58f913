//! Telemetry utilities for command timing and bootstrap tracing.

use std::time::Instant;
use tracing::info;

/// Guard for timing command execution and recording metrics.
///
/// Records command latency when dropped.
pub struct CommandTimer {
    trigger: String,
    start: Instant,
}

impl CommandTimer {
    /// Start timing a command.
    pub fn new(trigger: impl Into<String>) -> Self {
        Self {
            trigger: trigger.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for CommandTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_command(&self.trigger, duration);
    }
}

/// Logs how long a bootstrap step took when dropped.
pub struct StepTimer {
    step: &'static str,
    start: Instant,
}

impl StepTimer {
    pub fn new(step: &'static str) -> Self {
        Self {
            step,
            start: Instant::now(),
        }
    }
}

impl Drop for StepTimer {
    fn drop(&mut self) {
        let elapsed_ms = self.start.elapsed().as_millis();
        info!(step = self.step, elapsed_ms, "Bootstrap step finished");
    }
}

/// Standardized span constructors.
pub mod spans {
    use tracing::{Span, info_span};

    /// Span for one command invocation.
    pub fn command(trigger: &str, author: &str, guild: Option<&str>) -> Span {
        if let Some(guild) = guild {
            info_span!("command", trigger = %trigger, author = %author, guild = %guild)
        } else {
            info_span!("command", trigger = %trigger, author = %author)
        }
    }

    /// Span for one webhook request.
    pub fn webhook(path: &str, request_id: &str) -> Span {
        info_span!("webhook", path = %path, request_id = %request_id)
    }

    /// Span for one reaction event.
    pub fn reaction(emoji: &str, user: &str) -> Span {
        info_span!("reaction", emoji = %emoji, user = %user)
    }

    /// Span for one bootstrap step.
    pub fn bootstrap(step: &'static str) -> Span {
        info_span!("bootstrap", step = step)
    }
}

//! Prometheus metrics collection for modbot.
//!
//! Exposed on the webhook listener at `/metrics`.
//!
//! - `modbot_commands_total{trigger}` - Commands handed to a module
//! - `modbot_command_duration_seconds{trigger}` - Handler latency
//! - `modbot_commands_denied_total{trigger}` - Permission denials
//! - `modbot_module_errors_total{module, error}` - Failed or panicked handlers
//! - `modbot_webhook_responses_total{status}` - Webhook responses by status

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Commands dispatched by trigger.
pub static COMMAND_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Commands refused by the permission resolver.
pub static COMMANDS_DENIED: OnceLock<IntCounterVec> = OnceLock::new();

/// Handler failures by module and error kind.
pub static MODULE_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Webhook responses by status code.
pub static WEBHOOK_RESPONSES: OnceLock<IntCounterVec> = OnceLock::new();

/// Quote messages fanned out.
pub static QUOTES_DISPATCHED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges / Histograms
// ========================================================================

/// Guild contexts currently held.
pub static GUILD_CONTEXTS: OnceLock<IntGauge> = OnceLock::new();

/// Command handler latency by trigger.
pub static COMMAND_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            if $metric.get().is_none() {
                let m = $init.expect(concat!(stringify!($metric), " creation failed"));
                if let Err(e) = r.register(Box::new(m.clone())) {
                    tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                }
                let _ = $metric.set(m);
            }
        };
    }

    register!(COMMAND_COUNTER, IntCounterVec::new(Opts::new("modbot_commands_total", "Commands dispatched by trigger"), &["trigger"]));
    register!(COMMANDS_DENIED, IntCounterVec::new(Opts::new("modbot_commands_denied_total", "Commands refused by permissions"), &["trigger"]));
    register!(MODULE_ERRORS, IntCounterVec::new(Opts::new("modbot_module_errors_total", "Module handler failures"), &["module", "error"]));
    register!(WEBHOOK_RESPONSES, IntCounterVec::new(Opts::new("modbot_webhook_responses_total", "Webhook responses by status"), &["status"]));
    register!(QUOTES_DISPATCHED, IntCounter::new("modbot_quotes_dispatched_total", "Quote messages dispatched"));
    register!(GUILD_CONTEXTS, IntGauge::new("modbot_guild_contexts", "Guild contexts held"));
    register!(COMMAND_LATENCY, HistogramVec::new(
        HistogramOpts::new("modbot_command_duration_seconds", "Command handler latency by trigger")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["trigger"]));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Recording helpers
// ============================================================================

/// Record a command execution with latency.
#[inline]
pub fn record_command(trigger: &str, duration_secs: f64) {
    if let Some(c) = COMMAND_COUNTER.get() {
        c.with_label_values(&[trigger]).inc();
    }
    if let Some(h) = COMMAND_LATENCY.get() {
        h.with_label_values(&[trigger]).observe(duration_secs);
    }
}

#[inline]
pub fn record_denied(trigger: &str) {
    if let Some(c) = COMMANDS_DENIED.get() {
        c.with_label_values(&[trigger]).inc();
    }
}

/// Record a failed handler invocation.
#[inline]
pub fn record_module_error(module: &str, error: &str) {
    if let Some(c) = MODULE_ERRORS.get() {
        c.with_label_values(&[module, error]).inc();
    }
}

#[inline]
pub fn record_webhook_response(status: u16) {
    if let Some(c) = WEBHOOK_RESPONSES.get() {
        c.with_label_values(&[status.to_string().as_str()]).inc();
    }
}

#[inline]
pub fn record_quote() {
    if let Some(c) = QUOTES_DISPATCHED.get() {
        c.inc();
    }
}

#[inline]
pub fn set_guild_contexts(count: usize) {
    if let Some(g) = GUILD_CONTEXTS.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}

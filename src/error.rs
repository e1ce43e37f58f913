//! Unified error handling for modbot.
//!
//! This module provides the error hierarchy shared by the registry, the
//! persistence layer and the dispatch core, with static codes for metric
//! labeling.

use thiserror::Error;

// ============================================================================
// Module Errors (handler code)
// ============================================================================

/// Errors raised by a module's own handler code.
///
/// These never escape the dispatcher: the message and reaction paths log and
/// drop them, the webhook path turns them into a bare 500.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("not enough arguments")]
    NeedMoreArgs,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("handler panicked")]
    Panicked,

    #[error("internal error: {0}")]
    Internal(String),
}

impl ModuleError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NeedMoreArgs => "need_more_args",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::Platform(_) => "platform_error",
            Self::Persistence(_) => "persistence_error",
            Self::Panicked => "panicked",
            Self::Internal(_) => "internal_error",
        }
    }
}

/// Result type for module handlers.
pub type ModuleResult<T = ()> = Result<T, ModuleError>;

// ============================================================================
// Load Errors (registration time)
// ============================================================================

/// Configuration errors found while loading modules.
///
/// All of these are soft: the offending module (or the offending binding) is
/// skipped and startup continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("module '{module}': no capabilities declared")]
    NoCapabilities { module: String },

    #[error("module '{module}': required property '{field}' is missing or empty")]
    MissingField { module: String, field: &'static str },

    #[error("module '{module}': required handler '{handler}' is missing")]
    MissingHandler {
        module: String,
        handler: &'static str,
    },

    #[error("module '{module}': command '{trigger}' already registered by module '{owner}'")]
    CommandTaken {
        module: String,
        trigger: String,
        owner: String,
    },

    #[error("module '{module}': webhook '{path}' already registered by module '{owner}'")]
    WebhookTaken {
        module: String,
        path: String,
        owner: String,
    },

    #[error("cannot register '{module}' as persistence module, '{owner}' is already registered")]
    PersistenceTaken { module: String, owner: String },

    #[error("could not load module '{0}': not found in catalog")]
    UnknownModule(String),
}

impl LoadError {
    /// Name of the module this error is about.
    pub fn module(&self) -> &str {
        match self {
            Self::NoCapabilities { module }
            | Self::MissingField { module, .. }
            | Self::MissingHandler { module, .. }
            | Self::CommandTaken { module, .. }
            | Self::WebhookTaken { module, .. }
            | Self::PersistenceTaken { module, .. } => module,
            Self::UnknownModule(name) => name,
        }
    }
}

// ============================================================================
// Persistence Errors
// ============================================================================

/// Errors reported by a persistence backend.
///
/// A failed commit is a normal, reportable outcome: callers on best-effort
/// paths log it and move on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// No backend is configured.
    #[error("{0}")]
    Unavailable(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Result of a commit.
pub type PersistenceResult = Result<(), PersistenceError>;

// ============================================================================
// Platform Errors
// ============================================================================

/// Errors from the chat platform collaborator.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    #[error("not connected")]
    NotConnected,

    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("send failed: {0}")]
    Send(String),
}

// ============================================================================
// Bot Errors (bootstrap)
// ============================================================================

/// Errors from the bootstrap sequence.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("bootstrap step '{step}' called out of order (current phase: {phase})")]
    OutOfOrder {
        step: &'static str,
        phase: &'static str,
    },

    #[error("prefix cannot be matched: {0}")]
    InvalidPrefix(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

//! Default value functions for configuration.

/// Prefix used when a guild has none, and always accepted as a fallback.
pub const DEFAULT_PREFIX: &str = ".";

/// Webhook listener port when neither the file nor `PORT` set one.
pub const DEFAULT_WEBHOOK_PORT: &str = "3030";

pub const DEFAULT_URL: &str = "localhost";

pub fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

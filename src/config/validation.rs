//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use super::types::keys;
use std::collections::HashSet;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("prefix must not be empty")]
    EmptyPrefix,
    #[error("values.login_token is required")]
    MissingLoginToken,
    #[error("values.webhook_port must be a port number, got '{0}'")]
    InvalidWebhookPort(String),
    #[error("module '{0}' is listed more than once")]
    DuplicateModule(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.prefix.is_empty() {
        errors.push(ValidationError::EmptyPrefix);
    }

    if config.login_token().is_none_or(str::is_empty) {
        errors.push(ValidationError::MissingLoginToken);
    }

    if let Some(port) = config.value(keys::WEBHOOK_PORT)
        && port.trim().parse::<u16>().is_err()
    {
        errors.push(ValidationError::InvalidWebhookPort(port.to_string()));
    }

    let mut seen = HashSet::new();
    for name in &config.modules {
        if !seen.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateModule(name.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: the [`Config`] struct and file loading
//! - [`env`]: `${VAR}` interpolation for values
//! - [`defaults`]: serde defaults and fallback values
//! - [`validation`]: startup checks that collect every problem at once

mod defaults;
mod env;
mod types;
mod validation;

pub use defaults::{DEFAULT_PREFIX, DEFAULT_URL, DEFAULT_WEBHOOK_PORT};
pub use env::interpolate;
pub use types::{Config, ConfigError, keys};
pub use validation::{ValidationError, validate};

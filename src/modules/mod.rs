//! Built-in modules and the module catalog.
//!
//! The catalog maps the names used in the `modules` config list to
//! constructors. The two default modules are not in the catalog; they are
//! always loaded by [`BotBuilder::load_default_modules`](crate::bot::BotBuilder::load_default_modules).

pub mod config;
pub mod permissions;

pub use config::ConfigModule;
pub use permissions::PermissionsModule;

use crate::bot::module::Module;
use crate::error::LoadError;
use crate::persistence::MemoryPersistence;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a fresh module instance.
pub type ModuleFactory = Box<dyn Fn() -> Arc<dyn Module> + Send + Sync>;

/// Name to constructor table for configurable modules.
#[derive(Default)]
pub struct ModuleCatalog {
    factories: BTreeMap<String, ModuleFactory>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the modules shipped in this crate.
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.insert(MemoryPersistence::NAME, || {
            Arc::new(MemoryPersistence::new()) as Arc<dyn Module>
        });
        catalog
    }

    pub fn insert<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Module> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    pub fn create(&self, name: &str) -> Result<Arc<dyn Module>, LoadError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| LoadError::UnknownModule(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

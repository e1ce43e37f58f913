//! No-op persistence that stores nothing.
//!
//! Installed when no persistence module registered, so the rest of the
//! system never needs a null check. Every record reads as empty and every
//! commit reports failure.

use super::{CommitSink, RawTransaction, RecordKey};
use crate::bot::module::{Module, ModuleDescriptor, PersistenceModule};
use crate::error::{PersistenceError, PersistenceResult};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const NO_PERSISTENCE: &str = "No persistence.";

pub struct NoopPersistence {
    descriptor: ModuleDescriptor,
}

impl NoopPersistence {
    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new("Default No Persistence", "").persistence(),
        }
    }
}

impl Default for NoopPersistence {
    fn default() -> Self {
        Self::new()
    }
}

struct NoopSink;

#[async_trait]
impl CommitSink for NoopSink {
    async fn commit(self: Box<Self>, _key: &RecordKey, _data: Value) -> PersistenceResult {
        Err(PersistenceError::Unavailable(NO_PERSISTENCE.to_string()))
    }
}

/// An empty snapshot whose commit always fails.
pub fn transaction() -> RawTransaction {
    RawTransaction::new(Value::Object(Default::default()), Box::new(NoopSink))
}

#[async_trait]
impl Module for NoopPersistence {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn into_persistence(self: Arc<Self>) -> Option<Arc<dyn PersistenceModule>> {
        Some(self)
    }
}

#[async_trait]
impl PersistenceModule for NoopPersistence {
    async fn open(&self, _key: &RecordKey) -> Result<RawTransaction, PersistenceError> {
        Ok(transaction())
    }
}

//! In-process persistence backend.
//!
//! Records live in a concurrent map for the lifetime of the process. Each
//! record has its own async mutex; an open transaction holds the guard, so a
//! second reader waits until the first commits or drops.
//!
//! Legacy records seeded with [`MemoryPersistence::with_legacy`] are served
//! read-only through [`PersistenceModule::legacy_record`].

use super::{CommitSink, RawTransaction, RecordKey};
use crate::bot::module::{Module, ModuleDescriptor, PersistenceModule};
use crate::error::{PersistenceError, PersistenceResult};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

type Records = Arc<DashMap<RecordKey, Value>>;

pub struct MemoryPersistence {
    descriptor: ModuleDescriptor,
    records: Records,
    locks: DashMap<RecordKey, Arc<Mutex<()>>>,
    legacy: HashMap<String, Value>,
}

impl MemoryPersistence {
    pub const NAME: &'static str = "memory-persistence";

    pub fn new() -> Self {
        Self {
            descriptor: ModuleDescriptor::new("Memory Persistence", "In-process record store")
                .persistence(),
            records: Arc::new(DashMap::new()),
            locks: DashMap::new(),
            legacy: HashMap::new(),
        }
    }

    /// Seed a legacy record for migration.
    pub fn with_legacy(mut self, key: &str, value: Value) -> Self {
        self.legacy.insert(key.to_string(), value);
        self
    }

    /// Current committed contents of a record.
    pub fn snapshot(&self, key: &RecordKey) -> Option<Value> {
        self.records.get(key).map(|r| r.value().clone())
    }

    fn lock_for(&self, key: &RecordKey) -> Arc<Mutex<()>> {
        // Clone out so the shard lock is released before awaiting.
        self.locks.entry(key.clone()).or_default().value().clone()
    }
}

impl Default for MemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

struct MemorySink {
    records: Records,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl CommitSink for MemorySink {
    async fn commit(self: Box<Self>, key: &RecordKey, data: Value) -> PersistenceResult {
        self.records.insert(key.clone(), data);
        debug!(record = %key, "Record committed");
        Ok(())
    }
}

#[async_trait]
impl Module for MemoryPersistence {
    fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    fn into_persistence(self: Arc<Self>) -> Option<Arc<dyn PersistenceModule>> {
        Some(self)
    }
}

#[async_trait]
impl PersistenceModule for MemoryPersistence {
    async fn open(&self, key: &RecordKey) -> Result<RawTransaction, PersistenceError> {
        let guard = self.lock_for(key).lock_owned().await;
        let data = self
            .records
            .get(key)
            .map(|r| r.value().clone())
            .unwrap_or_else(|| Value::Object(Default::default()));
        Ok(RawTransaction::new(
            data,
            Box::new(MemorySink {
                records: Arc::clone(&self.records),
                _guard: guard,
            }),
        ))
    }

    async fn legacy_record(&self, key: &str) -> Option<Value> {
        self.legacy.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn second_reader_waits_for_commit() {
        let store = Arc::new(MemoryPersistence::new());
        let key = RecordKey::global("config");

        let first = store.open(&key).await.unwrap();

        let blocked = tokio::time::timeout(Duration::from_millis(50), store.open(&key)).await;
        assert!(blocked.is_err(), "record should be held by the first transaction");

        first
            .sink
            .commit(&key, serde_json::json!({"migrated": true}))
            .await
            .unwrap();

        let second = store.open(&key).await.unwrap();
        assert_eq!(second.data, serde_json::json!({"migrated": true}));
    }

    #[tokio::test]
    async fn distinct_records_do_not_block() {
        let store = MemoryPersistence::new();
        let _a = store.open(&RecordKey::global("a")).await.unwrap();
        let b = tokio::time::timeout(
            Duration::from_millis(50),
            store.open(&RecordKey::guild("g1".into(), "a")),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn unknown_record_reads_empty() {
        let store = MemoryPersistence::new();
        let raw = store.open(&RecordKey::global("missing")).await.unwrap();
        assert_eq!(raw.data, serde_json::json!({}));
        assert!(store.snapshot(&RecordKey::global("missing")).is_none());
    }

    #[tokio::test]
    async fn legacy_records_are_served() {
        let store =
            MemoryPersistence::new().with_legacy("config", serde_json::json!({"guilds": {}}));
        assert!(store.legacy_record("config").await.is_some());
        assert!(store.legacy_record("other").await.is_none());
    }
}

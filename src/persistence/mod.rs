//! Persistence transaction abstraction.
//!
//! A backend hands out [`RawTransaction`]s: a JSON snapshot of one record plus
//! a [`CommitSink`] that writes it back. [`Transaction<T>`] is the typed,
//! scoped wrapper everything else uses. It owns the snapshot exclusively until
//! it is committed or dropped; dropping without commit discards the edits and
//! releases the record.

pub mod memory;
pub mod noop;

pub use memory::MemoryPersistence;
pub use noop::NoopPersistence;

use crate::bot::module::PersistenceModule;
use crate::error::{PersistenceError, PersistenceResult};
use crate::platform::GuildId;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use tracing::{debug, warn};

/// Identifies one persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    Global(String),
    Guild { guild: GuildId, key: String },
}

impl RecordKey {
    pub fn global(key: impl Into<String>) -> Self {
        Self::Global(key.into())
    }

    pub fn guild(guild: GuildId, key: impl Into<String>) -> Self {
        Self::Guild {
            guild,
            key: key.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global(key) => write!(f, "global/{key}"),
            Self::Guild { guild, key } => write!(f, "guild/{guild}/{key}"),
        }
    }
}

/// Write-back half of a transaction, provided by the backend.
#[async_trait]
pub trait CommitSink: Send {
    async fn commit(self: Box<Self>, key: &RecordKey, data: Value) -> PersistenceResult;
}

/// Untyped transaction as produced by a backend.
pub struct RawTransaction {
    pub data: Value,
    pub sink: Box<dyn CommitSink>,
}

impl RawTransaction {
    pub fn new(data: Value, sink: Box<dyn CommitSink>) -> Self {
        Self { data, sink }
    }
}

/// Typed, exclusive view of one record.
pub struct Transaction<T> {
    key: RecordKey,
    data: T,
    sink: Option<Box<dyn CommitSink>>,
}

impl<T> Transaction<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Decode a raw snapshot. Empty or undecodable records start from
    /// `T::default()`.
    pub fn from_raw(key: RecordKey, raw: RawTransaction) -> Self {
        let data = if is_empty_record(&raw.data) {
            T::default()
        } else {
            match serde_json::from_value(raw.data) {
                Ok(data) => data,
                Err(e) => {
                    warn!(record = %key, error = %e, "Stored record did not decode, starting empty");
                    T::default()
                }
            }
        };
        Self {
            key,
            data,
            sink: Some(raw.sink),
        }
    }

    pub fn key(&self) -> &RecordKey {
        &self.key
    }

    /// Write the snapshot back and release the record.
    pub async fn commit(mut self) -> PersistenceResult {
        let Some(sink) = self.sink.take() else {
            return Ok(());
        };
        let value = serde_json::to_value(&self.data)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        sink.commit(&self.key, value).await
    }
}

impl<T> Deref for Transaction<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.data
    }
}

impl<T> DerefMut for Transaction<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.data
    }
}

impl<T> Drop for Transaction<T> {
    fn drop(&mut self) {
        if self.sink.is_some() {
            debug!(record = %self.key, "Transaction dropped without commit, edits discarded");
        }
    }
}

fn is_empty_record(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Typed access to whichever persistence module won registration.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn PersistenceModule>,
}

impl Storage {
    pub fn new(backend: Arc<dyn PersistenceModule>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn PersistenceModule> {
        &self.backend
    }

    pub async fn open<T>(&self, key: RecordKey) -> Result<Transaction<T>, PersistenceError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let raw = self.backend.open(&key).await?;
        Ok(Transaction::from_raw(key, raw))
    }

    pub async fn global<T>(&self, key: &str) -> Result<Transaction<T>, PersistenceError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        self.open(RecordKey::global(key)).await
    }

    pub async fn guild<T>(
        &self,
        guild: &GuildId,
        key: &str,
    ) -> Result<Transaction<T>, PersistenceError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        self.open(RecordKey::guild(guild.clone(), key)).await
    }

    /// Guild-scoped record, or a throwaway transaction outside a guild.
    pub async fn for_guild<T>(
        &self,
        guild: Option<&GuildId>,
        key: &str,
    ) -> Result<Transaction<T>, PersistenceError>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        match guild {
            Some(guild) => self.guild(guild, key).await,
            None => Ok(Self::noop(key)),
        }
    }

    /// A transaction over an empty record whose commit always fails.
    pub fn noop<T>(key: &str) -> Transaction<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        Transaction::from_raw(RecordKey::global(key), noop::transaction())
    }

    /// Legacy record from a previous storage layout, if the backend has one.
    pub async fn legacy_record(&self, key: &str) -> Option<Value> {
        self.backend.legacy_record(key).await
    }
}

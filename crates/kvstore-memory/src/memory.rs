//! In-process storage backend over a concurrent map

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use kvstore_core::{KvError, KvResult, KvStorage, Scope};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::entry::MemoryEntry;

/// Process-local key-value storage.
///
/// Values are copied in on `store` and copied out on every read, so callers
/// never share memory with the map. Expiry is checked lazily when a key is
/// read; nothing runs in the background.
///
/// Clones and handles produced by [`KvStorage::with_scope`] share one map.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStorage {
    entries: Arc<DashMap<String, MemoryEntry>>,
    scope: Scope,
}

impl MemoryKvStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, including expired ones no read has evicted yet
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry now and return how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let expired = entry.is_expired(now);
            if expired {
                removed += 1;
            }
            !expired
        });
        debug!("memory kv purged {} expired entries", removed);
        removed
    }

    fn decode<T: DeserializeOwned>(key: &str, payload: Value) -> KvResult<T> {
        serde_json::from_value(payload).map_err(|e| KvError::decode(key, e))
    }
}

#[async_trait]
impl KvStorage for MemoryKvStorage {
    async fn store<T>(&self, key: &str, value: &T, ttl: Duration) -> KvResult<()>
    where
        T: Serialize + ?Sized + Sync,
    {
        self.scope.check()?;

        let payload =
            serde_json::to_value(value).map_err(|e| KvError::Serialization(e.to_string()))?;

        trace!("memory kv SET {} ttl={:?}", key, ttl);
        self.entries
            .insert(key.to_string(), MemoryEntry::new(payload, ttl));
        Ok(())
    }

    async fn fetch<T>(&self, key: &str) -> KvResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.scope.check()?;
        let now = Instant::now();

        // The shard guard must be released before any removal below.
        let payload = {
            let Some(entry) = self.entries.get(key) else {
                return Ok(None);
            };
            if entry.is_expired(now) {
                None
            } else {
                Some(entry.payload.clone())
            }
        };

        match payload {
            Some(payload) => Self::decode(key, payload).map(Some),
            None => {
                // Only evict if no one stored a fresh value in the meantime.
                if self
                    .entries
                    .remove_if(key, |_, entry| entry.is_expired(now))
                    .is_some()
                {
                    trace!("memory kv evicted expired {}", key);
                }
                Ok(None)
            }
        }
    }

    async fn fetch_and_del<T>(&self, key: &str) -> KvResult<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        self.scope.check()?;

        // A single remove holds the shard lock across the read and the delete.
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired(Instant::now()) => {
                Self::decode(key, entry.payload).map(Some)
            }
            _ => Ok(None),
        }
    }

    async fn del(&self, key: &str) -> KvResult<()> {
        self.scope.check()?;

        trace!("memory kv DEL {}", key);
        self.entries.remove(key);
        Ok(())
    }

    fn scope(&self) -> &Scope {
        &self.scope
    }

    fn with_scope(&self, scope: Scope) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
            scope,
        }
    }
}

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{DatabaseError, EntryStream, KeyValueStore, KvEntry};

// Upper bound for deadlines so `Instant` arithmetic never overflows.
const MAX_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 10);

struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Process-local expiring store. Deadlines follow tokio's clock, so paused
/// test runtimes can move time forward deterministically.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, HashMap<String, StoredValue>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>, DatabaseError> {
        let now = Instant::now();
        let mut tables = self.tables.lock();
        let Some(entries) = tables.get_mut(table) else {
            return Ok(None);
        };

        match entries.get(key) {
            Some(stored) if stored.is_live(now) => Ok(Some(stored.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        table: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), DatabaseError> {
        let expires_at = Instant::now() + ttl.min(MAX_TTL);
        self.tables
            .lock()
            .entry(table.to_string())
            .or_default()
            .insert(
                key.to_string(),
                StoredValue {
                    value: value.to_string(),
                    expires_at,
                },
            );
        Ok(())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), DatabaseError> {
        if let Some(entries) = self.tables.lock().get_mut(table) {
            entries.remove(key);
        }
        Ok(())
    }

    async fn entries(&self, table: &str) -> Result<EntryStream, DatabaseError> {
        let now = Instant::now();
        let mut live: Vec<KvEntry> = self
            .tables
            .lock()
            .get(table)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, stored)| stored.is_live(now))
                    .map(|(key, stored)| KvEntry {
                        key: key.clone(),
                        value: stored.value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        live.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(stream::iter(live).boxed())
    }

    async fn purge_expired(&self) -> Result<u64, DatabaseError> {
        let now = Instant::now();
        let mut removed = 0u64;
        let mut tables = self.tables.lock();
        for entries in tables.values_mut() {
            let before = entries.len();
            entries.retain(|_, stored| stored.is_live(now));
            removed += (before - entries.len()) as u64;
        }
        tables.retain(|_, entries| !entries.is_empty());
        debug!("memory store purged {} expired entries", removed);
        Ok(removed)
    }
}

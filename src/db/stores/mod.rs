use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;

use super::DatabaseError;
use super::models::KvEntry;

/// One-shot sequence over the live entries of a table. Each call to
/// [`KeyValueStore::entries`] produces a fresh stream; a drained stream
/// cannot be restarted.
pub type EntryStream = BoxStream<'static, KvEntry>;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>, DatabaseError>;
    async fn set(
        &self,
        table: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), DatabaseError>;
    /// Deleting a missing key is not an error.
    async fn delete(&self, table: &str, key: &str) -> Result<(), DatabaseError>;
    async fn entries(&self, table: &str) -> Result<EntryStream, DatabaseError>;
    /// Drops every expired entry across all tables, returning how many went.
    async fn purge_expired(&self) -> Result<u64, DatabaseError>;

    async fn keys(&self, table: &str) -> Result<BoxStream<'static, String>, DatabaseError> {
        Ok(self.entries(table).await?.map(|entry| entry.key).boxed())
    }

    async fn values(&self, table: &str) -> Result<BoxStream<'static, String>, DatabaseError> {
        Ok(self.entries(table).await?.map(|entry| entry.value).boxed())
    }
}

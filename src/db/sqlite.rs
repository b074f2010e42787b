use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use futures::StreamExt;
use futures::stream;

use crate::db::schema_sqlite::kv_entries;

use super::{DatabaseError, EntryStream, KeyValueStore, KvEntry};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = kv_entries)]
struct DbKvEntry {
    entry_key: String,
    entry_value: String,
}

impl From<DbKvEntry> for KvEntry {
    fn from(value: DbKvEntry) -> Self {
        Self {
            key: value.entry_key,
            value: value.entry_value,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = kv_entries)]
struct NewKvEntry<'a> {
    namespace: &'a str,
    entry_key: &'a str,
    entry_value: &'a str,
    expires_at: i64,
}

pub(crate) fn establish_connection(path: &str) -> Result<SqliteConnection, DatabaseError> {
    SqliteConnection::establish(path).map_err(|e| DatabaseError::Connection(e.to_string()))
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn deadline_millis(ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_millis().saturating_add(ttl_ms)
}

/// Expiring key-value rows in a single SQLite table. Expired rows stay on
/// disk until [`KeyValueStore::purge_expired`] runs but are never returned.
pub struct SqliteStore {
    db_path: Arc<String>,
}

impl SqliteStore {
    pub fn new(db_path: Arc<String>) -> Self {
        Self { db_path }
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>, DatabaseError> {
        let table = table.to_string();
        let key = key.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::kv_entries::dsl::*;
            kv_entries
                .filter(namespace.eq(table))
                .filter(entry_key.eq(key))
                .filter(expires_at.gt(now_millis()))
                .select(entry_value)
                .first::<String>(&mut conn)
                .optional()
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await?
    }

    async fn set(
        &self,
        table: &str,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), DatabaseError> {
        let table = table.to_string();
        let key = key.to_string();
        let value = value.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            let row = NewKvEntry {
                namespace: &table,
                entry_key: &key,
                entry_value: &value,
                expires_at: deadline_millis(ttl),
            };
            diesel::replace_into(kv_entries::table)
                .values(&row)
                .execute(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            Ok(())
        })
        .await?
    }

    async fn delete(&self, table: &str, key: &str) -> Result<(), DatabaseError> {
        let table = table.to_string();
        let key = key.to_string();
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::kv_entries::dsl::*;
            diesel::delete(
                kv_entries
                    .filter(namespace.eq(table))
                    .filter(entry_key.eq(key)),
            )
            .execute(&mut conn)
            .map_err(|e| DatabaseError::Query(e.to_string()))?;
            Ok(())
        })
        .await?
    }

    async fn entries(&self, table: &str) -> Result<EntryStream, DatabaseError> {
        let table = table.to_string();
        let db_path = self.db_path.clone();
        let rows = tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::kv_entries::dsl::*;
            kv_entries
                .filter(namespace.eq(table))
                .filter(expires_at.gt(now_millis()))
                .order(entry_key.asc())
                .select(DbKvEntry::as_select())
                .load::<DbKvEntry>(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))
        })
        .await??;

        Ok(stream::iter(rows.into_iter().map(KvEntry::from)).boxed())
    }

    async fn purge_expired(&self) -> Result<u64, DatabaseError> {
        let db_path = self.db_path.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&db_path)?;
            use crate::db::schema_sqlite::kv_entries::dsl::*;
            let removed = diesel::delete(kv_entries.filter(expires_at.le(now_millis())))
                .execute(&mut conn)
                .map_err(|e| DatabaseError::Query(e.to_string()))?;
            Ok(removed as u64)
        })
        .await?
    }
}

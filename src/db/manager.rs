use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{DatabaseConfig, StorageBackend};
use crate::db::{DatabaseError, KeyValueStore, MemoryStore};

#[cfg(feature = "sqlite")]
use crate::db::sqlite::{SqliteStore, establish_connection};
#[cfg(feature = "sqlite")]
use diesel::RunQueryDsl;

#[derive(Clone)]
pub struct DatabaseManager {
    #[cfg(feature = "sqlite")]
    sqlite_path: Option<String>,
    store: Arc<dyn KeyValueStore>,
    backend: StorageBackend,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self, DatabaseError> {
        match config.backend {
            StorageBackend::Memory => Ok(Self {
                #[cfg(feature = "sqlite")]
                sqlite_path: None,
                store: Arc::new(MemoryStore::new()),
                backend: StorageBackend::Memory,
            }),
            #[cfg(feature = "sqlite")]
            StorageBackend::Sqlite => {
                let path = config.filename.clone().ok_or_else(|| {
                    DatabaseError::Connection("sqlite backend requires a filename".to_string())
                })?;
                let store = Arc::new(SqliteStore::new(Arc::new(path.clone())));

                Ok(Self {
                    sqlite_path: Some(path),
                    store,
                    backend: StorageBackend::Sqlite,
                })
            }
            #[cfg(not(feature = "sqlite"))]
            StorageBackend::Sqlite => Err(DatabaseError::Connection(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    pub async fn migrate(&self) -> Result<(), DatabaseError> {
        match self.backend {
            StorageBackend::Memory => Ok(()),
            #[cfg(feature = "sqlite")]
            StorageBackend::Sqlite => {
                let path = self.sqlite_path.as_deref().ok_or_else(|| {
                    DatabaseError::Migration("sqlite path missing".to_string())
                })?;
                Self::migrate_sqlite(path).await
            }
            #[cfg(not(feature = "sqlite"))]
            StorageBackend::Sqlite => Err(DatabaseError::Migration(
                "SQLite feature not enabled".to_string(),
            )),
        }
    }

    #[cfg(feature = "sqlite")]
    async fn migrate_sqlite(path: &str) -> Result<(), DatabaseError> {
        let path = path.to_string();
        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&path)?;

            let statements = [
                r#"
                CREATE TABLE IF NOT EXISTS kv_entries (
                    namespace TEXT NOT NULL,
                    entry_key TEXT NOT NULL,
                    entry_value TEXT NOT NULL,
                    expires_at BIGINT NOT NULL,
                    PRIMARY KEY (namespace, entry_key)
                )
                "#,
                "CREATE INDEX IF NOT EXISTS idx_kv_entries_expires_at ON kv_entries(expires_at)",
            ];

            for statement in statements {
                diesel::sql_query(statement)
                    .execute(&mut conn)
                    .map_err(|e| DatabaseError::Migration(e.to_string()))?;
            }

            Ok(())
        })
        .await
        .map_err(|e| DatabaseError::Migration(format!("migration task failed: {e}")))?
    }

    pub fn store(&self) -> Arc<dyn KeyValueStore> {
        self.store.clone()
    }

    pub fn backend(&self) -> StorageBackend {
        self.backend
    }

    /// Periodically drops expired rows so the backing table does not grow
    /// without bound. Reads already ignore expired rows.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let interval = interval.max(Duration::from_secs(1));
        info!("expiry sweeper running every {}s", interval.as_secs());
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match store.purge_expired().await {
                    Ok(removed) => debug!("expiry sweep removed {} entries", removed),
                    Err(err) => warn!("expiry sweep failed: {err}"),
                }
            }
        })
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use tempfile::NamedTempFile;

    use super::DatabaseManager;
    use crate::config::{DatabaseConfig, StorageBackend};

    fn sqlite_config(path: String) -> DatabaseConfig {
        DatabaseConfig {
            backend: StorageBackend::Sqlite,
            filename: Some(path),
            sweep_interval_secs: 600,
        }
    }

    #[tokio::test]
    async fn sqlite_entries_roundtrip_and_survive_reopen() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let db_path = file.path().to_string_lossy().to_string();
        let config = sqlite_config(db_path);

        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");

        let hour = Duration::from_secs(3600);
        let store = manager.store();
        store.set("marriage:1", "10", "20", hour).await.expect("set");
        store.set("marriage:1", "20", "10", hour).await.expect("set");
        store.set("marriage:1", "10", "30", hour).await.expect("overwrite");
        assert_eq!(
            store.get("marriage:1", "10").await.expect("get").as_deref(),
            Some("30")
        );

        let reopened = DatabaseManager::new(&config).await.expect("reopen");
        reopened.migrate().await.expect("migrate reopened");
        let keys: Vec<String> = reopened
            .store()
            .keys("marriage:1")
            .await
            .expect("keys")
            .collect()
            .await;
        assert_eq!(keys, vec!["10".to_string(), "20".to_string()]);

        reopened
            .store()
            .delete("marriage:1", "10")
            .await
            .expect("delete");
        reopened
            .store()
            .delete("marriage:1", "10")
            .await
            .expect("delete twice");
        assert!(
            reopened
                .store()
                .get("marriage:1", "10")
                .await
                .expect("get after delete")
                .is_none()
        );
    }

    #[tokio::test]
    async fn sqlite_hides_and_purges_expired_rows() {
        let file = NamedTempFile::new().expect("temp sqlite file");
        let config = sqlite_config(file.path().to_string_lossy().to_string());
        let manager = DatabaseManager::new(&config).await.expect("db manager");
        manager.migrate().await.expect("migrate");

        let store = manager.store();
        store
            .set("active:1", "a", "", Duration::ZERO)
            .await
            .expect("set expired");
        store
            .set("active:1", "b", "", Duration::from_secs(3600))
            .await
            .expect("set live");

        assert!(store.get("active:1", "a").await.expect("get").is_none());
        let values: Vec<String> = store.values("active:1").await.expect("values").collect().await;
        assert_eq!(values.len(), 1);
        assert_eq!(store.purge_expired().await.expect("purge"), 1);
    }

    #[tokio::test]
    async fn sqlite_backend_requires_filename() {
        let config = DatabaseConfig {
            backend: StorageBackend::Sqlite,
            filename: None,
            sweep_interval_secs: 600,
        };
        assert!(DatabaseManager::new(&config).await.is_err());
    }
}

pub use self::error::DatabaseError;
pub use self::manager::DatabaseManager;
pub use self::memory::MemoryStore;
pub use self::models::KvEntry;
pub use self::stores::{EntryStream, KeyValueStore};

pub mod error;
pub mod manager;
pub mod memory;
pub mod models;
pub mod stores;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub mod schema_sqlite;

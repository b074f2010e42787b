use serde::{Deserialize, Serialize};

/// A live row of an expiring table, as handed out by enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    pub key: String,
    pub value: String,
}

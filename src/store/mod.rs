use std::{collections::HashMap, future::Future};

use anyhow::Result;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

mod migrations;
mod sqlite;

pub use sqlite::SqliteStore;

/// A partial view of the store: only keys that exist are present.
pub type Record = Map<String, Value>;

/// Async key-value persistence shared by the ledger and the threshold
/// setting. `set` must apply every key in the record together; the ledger
/// relies on that to keep the log and its key-set in step.
pub trait KeyValueStore: Send + Sync + 'static {
    fn get(&self, keys: &[&str]) -> impl Future<Output = Result<Record>> + Send;

    fn set(&self, record: Record) -> impl Future<Output = Result<()>> + Send;
}

/// Process-local store, used by tests and by embedders that persist elsewhere.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty the store, as a fresh process would see it.
    pub async fn reset(&self) {
        self.data.lock().await.clear();
    }
}

impl KeyValueStore for MemoryStore {
    async fn get(&self, keys: &[&str]) -> Result<Record> {
        let guard = self.data.lock().await;
        Ok(keys
            .iter()
            .filter_map(|key| guard.get(*key).map(|v| ((*key).to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, record: Record) -> Result<()> {
        let mut guard = self.data.lock().await;
        guard.extend(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_returns_only_present_keys() {
        let store = MemoryStore::new();
        let mut record = Record::new();
        record.insert("a".into(), json!(1));
        store.set(record).await.unwrap();

        let got = store.get(&["a", "b"]).await.unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got.get("a"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn reset_empties_everything() {
        let store = MemoryStore::new();
        let mut record = Record::new();
        record.insert("a".into(), json!("x"));
        store.set(record).await.unwrap();
        store.reset().await;
        assert!(store.get(&["a"]).await.unwrap().is_empty());
    }
}

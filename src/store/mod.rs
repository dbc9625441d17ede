use std::{collections::BTreeMap, fmt, fmt::Debug, sync::Arc};

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio::sync::Mutex;

/// The logical stores the holder keeps records in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreName {
    /// Issued credentials, keyed by an autoincrement number.
    Credentials,
    /// The wallet identity, a single record keyed by `"current"`.
    Identity,
}

/// The key of a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoreKey {
    Number(u64),
    Text(String),
}

impl fmt::Display for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => fmt::Display::fmt(n, f),
            Self::Text(s) => fmt::Display::fmt(s, f),
        }
    }
}

impl From<u64> for StoreKey {
    fn from(value: u64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for StoreKey {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreRecord {
    pub key: StoreKey,
    pub value: Json,
}

/// Storage interface for holder records.
///
/// Every call is atomic on its own. Sequences of calls are not isolated from each other.
#[async_trait]
pub trait KeyValueStore: Debug + Send + Sync {
    /// Insert a record. Without a `key`, the next autoincrement number of the store is used.
    ///
    /// Returns the key of the record.
    async fn insert(&self, store: StoreName, key: Option<StoreKey>, value: Json)
        -> Result<StoreKey>;

    async fn find_one(&self, store: StoreName, key: &StoreKey) -> Result<Option<Json>>;

    async fn find_all(&self, store: StoreName) -> Result<Vec<StoreRecord>>;

    /// Shallow-merge `partial` into the record under `key`.
    async fn update(&self, store: StoreName, key: &StoreKey, partial: Json) -> Result<()>;

    async fn delete(&self, store: StoreName, key: &StoreKey) -> Result<()>;

    async fn clear(&self, store: StoreName) -> Result<()>;
}

#[derive(Debug, Default)]
struct Table {
    last_id: u64,
    records: BTreeMap<StoreKey, Json>,
}

/// A local in-memory store. Not for production use!
///
/// # Warning
/// Records are lost when the store is dropped.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    store: Arc<Mutex<BTreeMap<StoreName, Table>>>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn insert(
        &self,
        store: StoreName,
        key: Option<StoreKey>,
        value: Json,
    ) -> Result<StoreKey> {
        let mut stores = self.store.lock().await;
        let table = stores.entry(store).or_default();

        let key = match key {
            Some(key) => {
                if let StoreKey::Number(n) = key {
                    table.last_id = table.last_id.max(n);
                }
                key
            }
            None => {
                table.last_id += 1;
                StoreKey::Number(table.last_id)
            }
        };

        table.records.insert(key.clone(), value);
        Ok(key)
    }

    async fn find_one(&self, store: StoreName, key: &StoreKey) -> Result<Option<Json>> {
        Ok(self
            .store
            .lock()
            .await
            .get(&store)
            .and_then(|table| table.records.get(key))
            .cloned())
    }

    async fn find_all(&self, store: StoreName) -> Result<Vec<StoreRecord>> {
        Ok(self
            .store
            .lock()
            .await
            .get(&store)
            .map(|table| {
                table
                    .records
                    .iter()
                    .map(|(key, value)| StoreRecord {
                        key: key.clone(),
                        value: value.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update(&self, store: StoreName, key: &StoreKey, partial: Json) -> Result<()> {
        let mut stores = self.store.lock().await;
        let Some(record) = stores
            .get_mut(&store)
            .and_then(|table| table.records.get_mut(key))
        else {
            bail!("record '{key}' not found")
        };

        match (record, partial) {
            (Json::Object(record), Json::Object(partial)) => record.extend(partial),
            (record, partial) => *record = partial,
        }
        Ok(())
    }

    async fn delete(&self, store: StoreName, key: &StoreKey) -> Result<()> {
        if self
            .store
            .lock()
            .await
            .get_mut(&store)
            .and_then(|table| table.records.remove(key))
            .is_some()
        {
            return Ok(());
        }

        bail!("record '{key}' not found")
    }

    async fn clear(&self, store: StoreName) -> Result<()> {
        if let Some(table) = self.store.lock().await.get_mut(&store) {
            table.records.clear();
        }
        Ok(())
    }
}

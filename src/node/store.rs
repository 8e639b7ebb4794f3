// src/node/store.rs
use hyper::body::Bytes;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// In-memory key/value map of one node. Every access takes the single
/// exclusive lock and releases it before returning.
#[derive(Debug, Default)]
pub struct KeyValueStore {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl KeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Bytes> {
        self.entries.lock().await.get(key).cloned()
    }

    /// Last writer wins; returns the value it replaced.
    pub async fn put(&self, key: String, value: Bytes) -> Option<Bytes> {
        self.entries.lock().await.insert(key, value)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

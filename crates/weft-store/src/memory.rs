use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::{CacheEntry, CacheStore, Error};

/// In-process cache store. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
  entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub async fn len(&self) -> usize {
    self.entries.read().await.len()
  }

  pub async fn is_empty(&self) -> bool {
    self.entries.read().await.is_empty()
  }
}

#[async_trait]
impl CacheStore for MemoryStore {
  async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
    Ok(self.entries.read().await.get(key).cloned())
  }

  async fn put(&self, entry: &CacheEntry) -> Result<(), Error> {
    self
      .entries
      .write()
      .await
      .insert(entry.key.clone(), entry.clone());
    Ok(())
  }

  async fn remove(&self, key: &str) -> Result<bool, Error> {
    Ok(self.entries.write().await.remove(key).is_some())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;
  use weft_artifact::Artifact;

  #[tokio::test]
  async fn test_put_then_get() {
    let store = MemoryStore::new();
    let outputs = BTreeMap::from([("out".to_string(), Artifact::value(1))]);
    store.put(&CacheEntry::done("k1", outputs.clone())).await.unwrap();

    let entry = store.get("k1").await.unwrap().unwrap();
    assert_eq!(entry.outputs, outputs);
    assert!(store.get("k2").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_clones_share_entries() {
    let store = MemoryStore::new();
    let other = store.clone();
    store.put(&CacheEntry::done("k", BTreeMap::new())).await.unwrap();

    assert_eq!(other.len().await, 1);
    assert!(other.remove("k").await.unwrap());
    assert!(store.is_empty().await);
  }
}

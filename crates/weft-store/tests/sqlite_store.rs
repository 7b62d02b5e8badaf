use std::collections::BTreeMap;
use std::path::PathBuf;

use weft_artifact::Artifact;
use weft_store::{CacheEntry, CacheStore, EntryStatus, SqliteStore};

fn outputs() -> BTreeMap<String, Artifact> {
  BTreeMap::from([
    ("out_file".to_string(), Artifact::File(PathBuf::from("/work/brain.nii.gz"))),
    (
      "volumes".to_string(),
      Artifact::List(vec![Artifact::value(1), Artifact::value(2)]),
    ),
  ])
}

#[tokio::test]
async fn test_entry_survives_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("cache.db");

  {
    let store = SqliteStore::open(&path).await.unwrap();
    store.put(&CacheEntry::done("abc", outputs())).await.unwrap();
  }

  let store = SqliteStore::open(&path).await.unwrap();
  let entry = store.get("abc").await.unwrap().unwrap();
  assert_eq!(entry.status, EntryStatus::Done);
  assert_eq!(entry.outputs, outputs());
}

#[tokio::test]
async fn test_put_is_idempotent() {
  let dir = tempfile::tempdir().unwrap();
  let store = SqliteStore::open(dir.path().join("cache.db")).await.unwrap();

  store.put(&CacheEntry::done("abc", outputs())).await.unwrap();
  store.put(&CacheEntry::done("abc", outputs())).await.unwrap();

  assert_eq!(store.get("abc").await.unwrap().unwrap().outputs, outputs());
}

#[tokio::test]
async fn test_missing_and_removed_keys() {
  let dir = tempfile::tempdir().unwrap();
  let store = SqliteStore::open(dir.path().join("cache.db")).await.unwrap();

  assert!(store.get("nope").await.unwrap().is_none());
  store.put(&CacheEntry::done("abc", BTreeMap::new())).await.unwrap();
  assert!(store.remove("abc").await.unwrap());
  assert!(!store.remove("abc").await.unwrap());
  assert!(store.get("abc").await.unwrap().is_none());
}

//! Cache keys and single-flight locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, OwnedMutexGuard};
use weft_action::Inputs;
use weft_workflow::Node;

/// Errors consulting the cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
  /// Inputs could not be serialized for fingerprinting.
  #[error("failed to fingerprint inputs: {0}")]
  Fingerprint(#[from] serde_json::Error),

  #[error(transparent)]
  Store(#[from] weft_store::Error),
}

/// Deterministic fingerprint of (node, action, action version, resolved inputs).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

#[derive(Serialize)]
struct Fingerprint<'a> {
  node: &'a str,
  action: &'a str,
  version: &'a str,
  inputs: &'a Inputs,
}

impl CacheKey {
  pub fn compute(node: &Node, inputs: &Inputs) -> Result<Self, CacheError> {
    let action = node.action();
    // Inputs are a BTreeMap, so the serialization is canonical.
    let bytes = serde_json::to_vec(&Fingerprint {
      node: node.name(),
      action: action.name(),
      version: action.version(),
      inputs,
    })?;
    Ok(Self(hex::encode(Sha256::digest(&bytes))))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Leading characters, enough to name a directory.
  pub fn short(&self) -> &str {
    &self.0[..16]
  }
}

impl fmt::Display for CacheKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// One async lock per cache key, so identical invocations run at most once
/// while later ones wait and then hit the cache.
#[derive(Default)]
pub(crate) struct KeyLocks {
  locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
}

impl KeyLocks {
  pub(crate) async fn acquire(&self, key: &CacheKey) -> OwnedMutexGuard<()> {
    let lock = {
      let mut locks = self.locks.lock().await;
      Arc::clone(locks.entry(key.clone()).or_default())
    };
    lock.lock_owned().await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;
  use weft_action::{Action, FnAction, Identity};
  use weft_artifact::Artifact;

  fn inputs(value: &str) -> Inputs {
    Inputs::from([("in_file".to_string(), Artifact::file(value))])
  }

  #[test]
  fn test_key_is_deterministic() {
    let node = Node::new("strip", Arc::new(Identity) as Arc<dyn Action>);
    let a = CacheKey::compute(&node, &inputs("/data/sub01.nii")).unwrap();
    let b = CacheKey::compute(&node, &inputs("/data/sub01.nii")).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.as_str().len(), 64);
    assert_eq!(a.short().len(), 16);
  }

  #[test]
  fn test_key_depends_on_inputs_node_and_version() {
    let node = Node::new("strip", Arc::new(Identity) as Arc<dyn Action>);
    let base = CacheKey::compute(&node, &inputs("a")).unwrap();

    assert_ne!(base, CacheKey::compute(&node, &inputs("b")).unwrap());

    let renamed = Node::new("strip2", Arc::new(Identity) as Arc<dyn Action>);
    assert_ne!(base, CacheKey::compute(&renamed, &inputs("a")).unwrap());

    let v1 = Node::new("f", Arc::new(FnAction::new("f", Ok)) as Arc<dyn Action>);
    let v2 = Node::new(
      "f",
      Arc::new(FnAction::new("f", Ok).with_version("2")) as Arc<dyn Action>,
    );
    assert_ne!(
      CacheKey::compute(&v1, &inputs("a")).unwrap(),
      CacheKey::compute(&v2, &inputs("a")).unwrap()
    );
  }

  #[tokio::test]
  async fn test_key_lock_serializes_same_key() {
    let locks = Arc::new(KeyLocks::default());
    let node = Node::new("n", Arc::new(Identity) as Arc<dyn Action>);
    let key = CacheKey::compute(&node, &inputs("a")).unwrap();

    let guard = locks.acquire(&key).await;
    let waiter = {
      let locks = Arc::clone(&locks);
      let key = key.clone();
      tokio::spawn(async move {
        let _guard = locks.acquire(&key).await;
      })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());
    drop(guard);
    waiter.await.unwrap();
  }
}

//! In-memory key-value store for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::Value;

use crate::store::{KvError, KvStore, Version, Versioned};

/// In-memory `KvStore` with per-key versioning.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    inner: RwLock<HashMap<String, (Value, Version)>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys (test helper).
    pub fn len(&self) -> usize {
        self.inner.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> KvError {
    KvError::Storage("kv lock poisoned".to_string())
}

impl KvStore for InMemoryKvStore {
    fn get(&self, key: &str) -> Result<Option<Versioned>, KvError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(key).map(|(value, version)| Versioned {
            value: value.clone(),
            version: *version,
        }))
    }

    fn set(&self, key: &str, value: Value) -> Result<Version, KvError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let next = map.get(key).map(|(_, v)| v + 1).unwrap_or(1);
        map.insert(key.to_string(), (value, next));
        Ok(next)
    }

    fn set_if_version(
        &self,
        key: &str,
        value: Value,
        expected: Option<Version>,
    ) -> Result<Version, KvError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let current = map.get(key).map(|(_, v)| *v);
        if current != expected {
            return Err(KvError::Conflict(key.to_string()));
        }
        let next = current.map(|v| v + 1).unwrap_or(1);
        map.insert(key.to_string(), (value, next));
        Ok(next)
    }

    fn delete(&self, key: &str) -> Result<bool, KvError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        Ok(map.remove(key).is_some())
    }

    fn delete_if_version(&self, key: &str, expected: Version) -> Result<bool, KvError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        match map.get(key) {
            None => Ok(false),
            Some((_, v)) if *v == expected => {
                map.remove(key);
                Ok(true)
            }
            Some(_) => Err(KvError::Conflict(key.to_string())),
        }
    }

    fn mget(&self, keys: &[String]) -> Result<Vec<Option<Versioned>>, KvError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(keys
            .iter()
            .map(|k| {
                map.get(k).map(|(value, version)| Versioned {
                    value: value.clone(),
                    version: *version,
                })
            })
            .collect())
    }

    fn mset(&self, entries: Vec<(String, Value)>) -> Result<(), KvError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        for (key, value) in entries {
            let next = map.get(&key).map(|(_, v)| v + 1).unwrap_or(1);
            map.insert(key, (value, next));
        }
        Ok(())
    }

    fn delete_many(&self, keys: &[String]) -> Result<usize, KvError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let mut removed = 0;
        for key in keys {
            if map.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.keys().filter(|k| k.starts_with(prefix)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn versions_increase_monotonically() {
        let kv = InMemoryKvStore::new();
        assert_eq!(kv.set("a", json!(1)).unwrap(), 1);
        assert_eq!(kv.set("a", json!(2)).unwrap(), 2);
        let got = kv.get("a").unwrap().unwrap();
        assert_eq!(got.value, json!(2));
        assert_eq!(got.version, 2);
    }

    #[test]
    fn conditional_write_rejects_stale_version() {
        let kv = InMemoryKvStore::new();
        kv.set("a", json!("first")).unwrap();

        // Writer A read version 1; writer B sneaks in.
        kv.set("a", json!("second")).unwrap();

        let err = kv.set_if_version("a", json!("lost"), Some(1)).unwrap_err();
        assert!(matches!(err, KvError::Conflict(_)));

        // Retry at the fresh version succeeds.
        let v = kv.set_if_version("a", json!("third"), Some(2)).unwrap();
        assert_eq!(v, 3);
    }

    #[test]
    fn create_only_write_requires_absence() {
        let kv = InMemoryKvStore::new();
        assert_eq!(kv.set_if_version("k", json!(true), None).unwrap(), 1);
        assert!(matches!(
            kv.set_if_version("k", json!(false), None),
            Err(KvError::Conflict(_))
        ));
    }

    #[test]
    fn conditional_delete() {
        let kv = InMemoryKvStore::new();
        kv.set("k", json!(1)).unwrap();
        kv.set("k", json!(2)).unwrap();

        assert!(matches!(
            kv.delete_if_version("k", 1),
            Err(KvError::Conflict(_))
        ));
        assert!(kv.delete_if_version("k", 2).unwrap());
        assert!(!kv.delete_if_version("k", 2).unwrap());
    }

    #[test]
    fn list_keys_filters_by_prefix() {
        let kv = InMemoryKvStore::new();
        kv.set("ns_a:1", json!(1)).unwrap();
        kv.set("ns_a:2", json!(2)).unwrap();
        kv.set("ns_b:1", json!(3)).unwrap();

        let mut keys = kv.list_keys("ns_a:").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ns_a:1".to_string(), "ns_a:2".to_string()]);
    }

    #[test]
    fn batch_delete_counts_existing_only() {
        let kv = InMemoryKvStore::new();
        kv.set("x", json!(1)).unwrap();
        let removed = kv
            .delete_many(&["x".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(removed, 1);
        assert!(kv.is_empty());
    }
}

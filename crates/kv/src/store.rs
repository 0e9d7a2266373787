//! Key-value store abstraction over namespaced JSON blobs.
//!
//! Every key carries a monotonically increasing version so read-modify-write
//! sequences (alert lists, dedup markers, policy blobs) can use conditional
//! writes instead of racing blind overwrites.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Per-key write version. Starts at 1 on first write.
pub type Version = u64;

/// A stored value together with its current version.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub value: Value,
    pub version: Version,
}

/// Key-value store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KvError {
    /// Conditional write lost against a concurrent writer.
    #[error("version conflict on key: {0}")]
    Conflict(String),
    /// Value could not be (de)serialized.
    #[error("codec error on key {key}: {reason}")]
    Codec { key: String, reason: String },
    /// Underlying storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}

/// Durable JSON-blob storage keyed by string. No native TTL; retention is a
/// separate periodic concern.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Versioned>, KvError>;

    /// Unconditional write. Returns the new version.
    fn set(&self, key: &str, value: Value) -> Result<Version, KvError>;

    /// Conditional write: succeeds only if the key's current version matches
    /// `expected` (`None` = key must not exist). Returns the new version.
    fn set_if_version(
        &self,
        key: &str,
        value: Value,
        expected: Option<Version>,
    ) -> Result<Version, KvError>;

    /// Delete a key. Returns whether it existed.
    fn delete(&self, key: &str) -> Result<bool, KvError>;

    /// Conditional delete: succeeds only at the expected version.
    fn delete_if_version(&self, key: &str, expected: Version) -> Result<bool, KvError>;

    fn mget(&self, keys: &[String]) -> Result<Vec<Option<Versioned>>, KvError>;

    fn mset(&self, entries: Vec<(String, Value)>) -> Result<(), KvError>;

    /// Delete a batch of keys, returning how many existed.
    fn delete_many(&self, keys: &[String]) -> Result<usize, KvError>;

    /// All keys starting with `prefix`, in no particular order.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError>;
}

impl<S> KvStore for Arc<S>
where
    S: KvStore + ?Sized,
{
    fn get(&self, key: &str) -> Result<Option<Versioned>, KvError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Value) -> Result<Version, KvError> {
        (**self).set(key, value)
    }

    fn set_if_version(
        &self,
        key: &str,
        value: Value,
        expected: Option<Version>,
    ) -> Result<Version, KvError> {
        (**self).set_if_version(key, value, expected)
    }

    fn delete(&self, key: &str) -> Result<bool, KvError> {
        (**self).delete(key)
    }

    fn delete_if_version(&self, key: &str, expected: Version) -> Result<bool, KvError> {
        (**self).delete_if_version(key, expected)
    }

    fn mget(&self, keys: &[String]) -> Result<Vec<Option<Versioned>>, KvError> {
        (**self).mget(keys)
    }

    fn mset(&self, entries: Vec<(String, Value)>) -> Result<(), KvError> {
        (**self).mset(entries)
    }

    fn delete_many(&self, keys: &[String]) -> Result<usize, KvError> {
        (**self).delete_many(keys)
    }

    fn list_keys(&self, prefix: &str) -> Result<Vec<String>, KvError> {
        (**self).list_keys(prefix)
    }
}

/// Typed convenience layer over the raw JSON contract.
pub trait KvStoreExt: KvStore {
    /// Read and deserialize. A value that fails to decode surfaces as a
    /// codec error; callers that treat undecodable blobs as absent (e.g.
    /// defaulted config) handle that explicitly.
    fn get_typed<T: DeserializeOwned>(&self, key: &str) -> Result<Option<(T, Version)>, KvError> {
        match self.get(key)? {
            None => Ok(None),
            Some(v) => {
                let typed = serde_json::from_value(v.value).map_err(|e| KvError::Codec {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
                Ok(Some((typed, v.version)))
            }
        }
    }

    fn set_typed<T: Serialize>(&self, key: &str, value: &T) -> Result<Version, KvError> {
        let raw = serde_json::to_value(value).map_err(|e| KvError::Codec {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.set(key, raw)
    }

    fn set_typed_if_version<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        expected: Option<Version>,
    ) -> Result<Version, KvError> {
        let raw = serde_json::to_value(value).map_err(|e| KvError::Codec {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.set_if_version(key, raw, expected)
    }
}

impl<S: KvStore + ?Sized> KvStoreExt for S {}

//! `postforge-kv` — namespaced JSON key-value storage with per-key
//! optimistic versioning.
//!
//! The delivery/escalation subsystem keeps all of its operational state
//! (alerts, SLA config, dedup markers, retention policy, audit buckets) in a
//! string-keyed JSON store. Conditional writes (`set_if_version`) let every
//! read-modify-write converge without a store-wide lock.

pub mod keys;
pub mod memory;
pub mod store;

pub use memory::InMemoryKvStore;
pub use store::{KvError, KvStore, KvStoreExt, Version, Versioned};

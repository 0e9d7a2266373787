//! Security audit log: immutable day-bucketed entries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use postforge_core::{TenantId, UserId};
use postforge_kv::{keys, KvError, KvStore, KvStoreExt};

const CAS_ATTEMPTS: usize = 5;

/// One immutable audit-trail entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub tenant_id: Option<TenantId>,
    pub actor: Option<UserId>,
    /// Machine-readable action name, e.g. `content.published`.
    pub action: String,
    pub detail: String,
}

impl AuditEntry {
    pub fn system(at: DateTime<Utc>, action: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            at,
            tenant_id: None,
            actor: None,
            action: action.into(),
            detail: detail.into(),
        }
    }

    pub fn for_tenant(mut self, tenant_id: TenantId) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    pub fn by(mut self, actor: UserId) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Append-only audit log over `security_audit_log:{date}` buckets.
pub struct AuditLog<K> {
    kv: K,
}

impl<K: KvStore> AuditLog<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Append one entry to its day's bucket (versioned append, so two
    /// writers never drop each other's entries).
    pub fn append(&self, entry: &AuditEntry) -> Result<(), KvError> {
        let key = keys::audit_log(entry.at.date_naive());
        for _ in 0..CAS_ATTEMPTS {
            let current = self.kv.get_typed::<Vec<AuditEntry>>(&key)?;
            let (mut entries, expected) = match current {
                Some((entries, version)) => (entries, Some(version)),
                None => (Vec::new(), None),
            };
            entries.push(entry.clone());

            match self.kv.set_typed_if_version(&key, &entries, expected) {
                Ok(_) => return Ok(()),
                Err(KvError::Conflict(_)) => {
                    debug!(key = %key, "audit append lost a race, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(KvError::Conflict(key))
    }

    /// Whether any bucket exists for `date`.
    pub fn has_bucket(&self, date: NaiveDate) -> Result<bool, KvError> {
        Ok(self.kv.get(&keys::audit_log(date))?.is_some())
    }

    /// Entries for one day, oldest first. Absent bucket reads as empty.
    pub fn entries(&self, date: NaiveDate) -> Result<Vec<AuditEntry>, KvError> {
        Ok(self
            .kv
            .get_typed::<Vec<AuditEntry>>(&keys::audit_log(date))?
            .map(|(entries, _)| entries)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use postforge_kv::InMemoryKvStore;

    use super::*;

    #[test]
    fn entries_accumulate_in_day_buckets() {
        let log = AuditLog::new(Arc::new(InMemoryKvStore::new()));
        let now = Utc::now();
        let tenant = TenantId::new();

        log.append(&AuditEntry::system(now, "content.published", "item a").for_tenant(tenant))
            .unwrap();
        log.append(&AuditEntry::system(now, "content.published", "item b").for_tenant(tenant))
            .unwrap();

        let today = now.date_naive();
        assert!(log.has_bucket(today).unwrap());
        let entries = log.entries(today).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "content.published");
    }

    #[test]
    fn missing_day_reads_as_empty() {
        let log = AuditLog::new(Arc::new(InMemoryKvStore::new()));
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(!log.has_bucket(day).unwrap());
        assert!(log.entries(day).unwrap().is_empty());
    }
}

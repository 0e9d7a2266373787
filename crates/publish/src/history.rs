//! Publish history: month-bucketed success records per tenant.

use tracing::debug;

use postforge_core::TenantId;
use postforge_events::PublishRecorded;
use postforge_kv::{keys, KvError, KvStore, KvStoreExt};

const CAS_ATTEMPTS: usize = 5;

/// Append-only publish history over `publish_history:{tenant}:{YYYY-MM}`.
pub struct PublishHistory<K> {
    kv: K,
}

impl<K: KvStore> PublishHistory<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Record one successful delivery in the month bucket of its publish
    /// time.
    pub fn record(&self, record: &PublishRecorded) -> Result<(), KvError> {
        let month = record.published_at.format("%Y-%m").to_string();
        let key = keys::publish_history(record.tenant_id, &month);
        for _ in 0..CAS_ATTEMPTS {
            let current = self.kv.get_typed::<Vec<PublishRecorded>>(&key)?;
            let (mut records, expected) = match current {
                Some((records, version)) => (records, Some(version)),
                None => (Vec::new(), None),
            };
            records.push(record.clone());

            match self.kv.set_typed_if_version(&key, &records, expected) {
                Ok(_) => return Ok(()),
                Err(KvError::Conflict(_)) => {
                    debug!(key = %key, "publish history append lost a race, retrying");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
        Err(KvError::Conflict(key))
    }

    /// Records for one tenant and month (`YYYY-MM`), oldest first.
    pub fn month_records(
        &self,
        tenant_id: TenantId,
        month: &str,
    ) -> Result<Vec<PublishRecorded>, KvError> {
        Ok(self
            .kv
            .get_typed::<Vec<PublishRecorded>>(&keys::publish_history(tenant_id, month))?
            .map(|(records, _)| records)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use postforge_core::{ContentItemId, Platform};
    use postforge_kv::InMemoryKvStore;

    use super::*;

    #[test]
    fn records_accumulate_per_month() {
        let history = PublishHistory::new(Arc::new(InMemoryKvStore::new()));
        let tenant = TenantId::new();
        let now = Utc::now();

        for _ in 0..2 {
            history
                .record(&PublishRecorded {
                    tenant_id: tenant,
                    item_id: ContentItemId::new(),
                    platform: Platform::X,
                    reference: "x:123".to_string(),
                    published_at: now,
                })
                .unwrap();
        }

        let month = now.format("%Y-%m").to_string();
        assert_eq!(history.month_records(tenant, &month).unwrap().len(), 2);
        assert!(history.month_records(tenant, "1999-01").unwrap().is_empty());
    }
}

//! Per-tenant failure-alert ledger over the key-value store.
//!
//! Every mutation is a versioned read-modify-write with a bounded retry
//! loop, so two concurrent writers (scanner tick vs. operator dismiss)
//! converge instead of silently dropping one side's update.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use tracing::debug;

use postforge_content::store::{ContentStore, ContentStoreError};
use postforge_content::ContentItem;
use postforge_core::{ContentItemId, TenantId};
use postforge_kv::{keys, KvError, KvStore, KvStoreExt};

use crate::alert::FailureAlert;

/// Bounded CAS retries before surfacing contention to the caller.
const CAS_ATTEMPTS: usize = 5;

/// Alert store error.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error(transparent)]
    Kv(#[from] KvError),
    #[error(transparent)]
    Content(#[from] ContentStoreError),
    #[error("alert not found for item: {0}")]
    NotFound(ContentItemId),
    #[error("alert list contention on tenant {0} persisted past retries")]
    Contention(TenantId),
}

/// Idempotent per-tenant failure-alert ledger.
pub struct AlertStore<K> {
    kv: K,
}

impl<K: KvStore> AlertStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// All alerts for a tenant; an absent key reads as no alerts.
    pub fn list(&self, tenant_id: TenantId) -> Result<Vec<FailureAlert>, AlertError> {
        let key = keys::alerts(tenant_id);
        Ok(self
            .kv
            .get_typed::<Vec<FailureAlert>>(&key)?
            .map(|(alerts, _)| alerts)
            .unwrap_or_default())
    }

    /// Replace-by-id or append. Re-asserting an existing alert with the same
    /// content is a no-op write.
    pub fn upsert(&self, alert: &FailureAlert) -> Result<(), AlertError> {
        let key = keys::alerts(alert.tenant_id);
        for _ in 0..CAS_ATTEMPTS {
            let current = self.kv.get_typed::<Vec<FailureAlert>>(&key)?;
            let (mut alerts, expected) = match current {
                Some((alerts, version)) => (alerts, Some(version)),
                None => (Vec::new(), None),
            };

            match alerts.iter_mut().find(|a| a.card_id == alert.card_id) {
                Some(existing) => *existing = alert.clone(),
                None => alerts.push(alert.clone()),
            }

            match self.kv.set_typed_if_version(&key, &alerts, expected) {
                Ok(_) => return Ok(()),
                Err(KvError::Conflict(_)) => {
                    debug!(tenant_id = %alert.tenant_id, "alert upsert lost a race, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AlertError::Contention(alert.tenant_id))
    }

    /// Remove one item's alert. When the last alert goes, the tenant's key
    /// is deleted outright so a later read is indistinguishable from "never
    /// had alerts". Returns whether an alert was removed.
    pub fn remove(
        &self,
        tenant_id: TenantId,
        card_id: ContentItemId,
    ) -> Result<bool, AlertError> {
        let key = keys::alerts(tenant_id);
        for _ in 0..CAS_ATTEMPTS {
            let Some((alerts, version)) = self.kv.get_typed::<Vec<FailureAlert>>(&key)? else {
                return Ok(false);
            };

            let remaining: Vec<FailureAlert> =
                alerts.iter().filter(|a| a.card_id != card_id).cloned().collect();
            if remaining.len() == alerts.len() {
                return Ok(false);
            }

            let write = if remaining.is_empty() {
                self.kv.delete_if_version(&key, version).map(|_| 0)
            } else {
                self.kv.set_typed_if_version(&key, &remaining, Some(version))
            };

            match write {
                Ok(_) => return Ok(true),
                Err(KvError::Conflict(_)) => {
                    debug!(tenant_id = %tenant_id, "alert removal lost a race, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(AlertError::Contention(tenant_id))
    }

    /// Human-initiated requeue: reset the item's retry budget in the content
    /// store and drop its alert, as one logical operation. The item is
    /// re-evaluated on the next scan if still due.
    pub fn retry<C: ContentStore>(
        &self,
        content: &C,
        tenant_id: TenantId,
        card_id: ContentItemId,
        now: DateTime<Utc>,
    ) -> Result<ContentItem, AlertError> {
        let item = content.reset_retries(tenant_id, card_id, now)?;
        self.remove(tenant_id, card_id)?;
        Ok(item)
    }

    /// Tenants that currently have at least one alert.
    pub fn tenants_with_alerts(&self) -> Result<Vec<TenantId>, AlertError> {
        let keys_found = self.kv.list_keys(keys::ALERTS_PREFIX)?;
        let mut tenants = Vec::with_capacity(keys_found.len());
        for key in keys_found {
            let suffix = &key[keys::ALERTS_PREFIX.len()..];
            if let Ok(tenant) = TenantId::from_str(suffix) {
                tenants.push(tenant);
            } else {
                debug!(key = %key, "skipping alert key with unparseable tenant");
            }
        }
        Ok(tenants)
    }
}

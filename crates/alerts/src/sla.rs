//! Per-tenant SLA thresholds for overdue scheduled content.

use serde::{Deserialize, Serialize};
use tracing::warn;

use postforge_core::TenantId;
use postforge_kv::{keys, KvError, KvStore, KvStoreExt};

const MIN_HOURS: u32 = 1;
const MAX_HOURS: u32 = 720;

/// SLA thresholds in hours. `warning_hours` marks an item overdue;
/// `breach_hours` triggers operator escalation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaConfig {
    pub warning_hours: u32,
    pub breach_hours: u32,
}

impl Default for SlaConfig {
    fn default() -> Self {
        Self {
            warning_hours: 24,
            breach_hours: 48,
        }
    }
}

impl SlaConfig {
    /// Clamp both thresholds to a sane range and force the breach threshold
    /// to exceed the warning threshold.
    pub fn clamped(self) -> Self {
        // Warning caps one below the maximum so breach can always exceed it.
        let warning_hours = self.warning_hours.clamp(MIN_HOURS, MAX_HOURS - 1);
        let breach_hours = self
            .breach_hours
            .clamp(MIN_HOURS, MAX_HOURS)
            .max(warning_hours + 1);
        Self {
            warning_hours,
            breach_hours,
        }
    }
}

/// SLA config storage over `sla_config:{tenant}`.
pub struct SlaConfigStore<K> {
    kv: K,
}

impl<K: KvStore> SlaConfigStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// The tenant's config; defaults when absent. An undecodable blob also
    /// falls back to defaults rather than failing reads forever.
    pub fn get(&self, tenant_id: TenantId) -> Result<SlaConfig, KvError> {
        let key = keys::sla_config(tenant_id);
        match self.kv.get_typed::<SlaConfig>(&key) {
            Ok(Some((config, _))) => Ok(config),
            Ok(None) => Ok(SlaConfig::default()),
            Err(KvError::Codec { .. }) => {
                warn!(tenant_id = %tenant_id, "undecodable SLA config, using defaults");
                Ok(SlaConfig::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a config, clamped. Returns what was actually stored.
    pub fn set(&self, tenant_id: TenantId, config: SlaConfig) -> Result<SlaConfig, KvError> {
        let clamped = config.clamped();
        self.kv.set_typed(&keys::sla_config(tenant_id), &clamped)?;
        Ok(clamped)
    }
}

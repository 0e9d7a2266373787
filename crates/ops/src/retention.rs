//! Retention policy and the daily purge over key-value namespaces.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use postforge_events::{EventBus, NamespacePurgeCount, OpsEvent, PurgeSummary};
use postforge_kv::{keys, KvError, KvStore, KvStoreExt};
use postforge_worker::{PeriodicWorker, WorkerHandle};

/// Cadence of the purge run.
pub const PURGE_INTERVAL: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

/// Global retention windows, one per purged namespace. Clamped on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// `sla_esc:` dedup markers.
    pub escalation_marker_days: u32,
    /// `security_audit_log:` day buckets.
    pub audit_log_days: u32,
    /// `notification_log:` day buckets.
    pub notification_log_days: u32,
    /// `publish_history:` month buckets.
    pub publish_history_months: u32,
    /// `usage_metrics:` month buckets.
    pub usage_metrics_months: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            escalation_marker_days: 30,
            audit_log_days: 365,
            notification_log_days: 90,
            publish_history_months: 12,
            usage_metrics_months: 24,
        }
    }
}

impl RetentionPolicy {
    /// Clamp every window to its sane range.
    pub fn clamped(self) -> Self {
        Self {
            escalation_marker_days: self.escalation_marker_days.clamp(7, 365),
            audit_log_days: self.audit_log_days.clamp(30, 3650),
            notification_log_days: self.notification_log_days.clamp(7, 730),
            publish_history_months: self.publish_history_months.clamp(1, 60),
            usage_metrics_months: self.usage_metrics_months.clamp(1, 120),
        }
    }
}

/// Storage for the `data_retention_policy` singleton.
pub struct RetentionPolicyStore<K> {
    kv: K,
}

impl<K: KvStore> RetentionPolicyStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// The policy; defaults when absent or undecodable.
    pub fn get(&self) -> Result<RetentionPolicy, KvError> {
        match self.kv.get_typed::<RetentionPolicy>(keys::RETENTION_POLICY) {
            Ok(Some((policy, _))) => Ok(policy),
            Ok(None) => Ok(RetentionPolicy::default()),
            Err(KvError::Codec { .. }) => {
                warn!("undecodable retention policy, using defaults");
                Ok(RetentionPolicy::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Persist a policy, clamped. Returns what was actually stored.
    pub fn set(&self, policy: RetentionPolicy) -> Result<RetentionPolicy, KvError> {
        let clamped = policy.clamped();
        self.kv.set_typed(keys::RETENTION_POLICY, &clamped)?;
        Ok(clamped)
    }
}

/// How a namespace encodes its age in the key.
#[derive(Debug, Clone, Copy)]
enum AgeComponent {
    /// `{prefix}{YYYY-MM-DD}` or `{prefix}{YYYY-MM-DD}:{rest}`.
    Date,
    /// `{prefix}{rest}:{YYYY-MM}` (month is the final segment).
    TrailingMonth,
    /// `{prefix}{YYYY-MM}`.
    Month,
}

/// Daily garbage collector over the retention-managed namespaces.
pub struct RetentionPurge<K, B> {
    kv: K,
    policy: RetentionPolicyStore<K>,
    bus: B,
}

impl<K, B> RetentionPurge<K, B>
where
    K: KvStore + Clone,
    B: EventBus<OpsEvent>,
{
    pub fn new(kv: K, bus: B) -> Self {
        Self {
            policy: RetentionPolicyStore::new(kv.clone()),
            kv,
            bus,
        }
    }

    /// One daily run. A store failure in one namespace is logged and does
    /// not abort the others; exactly one summary event is emitted.
    pub fn run(&self, now: DateTime<Utc>) -> Result<PurgeSummary, KvError> {
        let policy = self.policy.get()?;
        let today = now.date_naive();

        let plan: [(&str, AgeComponent, u32); 5] = [
            (keys::ESCALATION_PREFIX, AgeComponent::Date, policy.escalation_marker_days),
            (keys::AUDIT_LOG_PREFIX, AgeComponent::Date, policy.audit_log_days),
            (keys::NOTIFICATION_LOG_PREFIX, AgeComponent::Date, policy.notification_log_days),
            (
                keys::PUBLISH_HISTORY_PREFIX,
                AgeComponent::TrailingMonth,
                policy.publish_history_months,
            ),
            (keys::USAGE_METRICS_PREFIX, AgeComponent::Month, policy.usage_metrics_months),
        ];

        let mut counts = Vec::with_capacity(plan.len());
        for (prefix, component, window) in plan {
            let deleted = match self.purge_namespace(prefix, component, window, today) {
                Ok(n) => n,
                Err(e) => {
                    warn!(namespace = prefix, error = %e, "namespace purge failed, continuing");
                    0
                }
            };
            counts.push(NamespacePurgeCount {
                namespace: prefix.trim_end_matches(':').to_string(),
                deleted,
            });
        }

        let summary = PurgeSummary {
            ran_at: now,
            counts,
        };
        if let Err(e) = self.bus.publish(OpsEvent::PurgeCompleted(summary.clone())) {
            warn!(error = ?e, "failed to publish purge summary");
        }
        info!(total_deleted = summary.total_deleted(), "retention purge completed");
        Ok(summary)
    }

    fn purge_namespace(
        &self,
        prefix: &str,
        component: AgeComponent,
        window: u32,
        today: NaiveDate,
    ) -> Result<usize, KvError> {
        let keys_found = self.kv.list_keys(prefix)?;
        let stale: Vec<String> = keys_found
            .into_iter()
            .filter(|key| {
                let stale = is_stale(&key[prefix.len()..], component, window, today);
                if stale {
                    debug!(key = %key, "purging stale key");
                }
                stale
            })
            .collect();
        self.kv.delete_many(&stale)
    }
}

impl<K, B> RetentionPurge<K, B>
where
    K: KvStore + Clone + Send + Sync + 'static,
    B: EventBus<OpsEvent> + Send + Sync + 'static,
{
    /// Run the purge on its own timer thread until shutdown.
    pub fn spawn(self: Arc<Self>) -> WorkerHandle {
        PeriodicWorker::spawn("retention-purge", PURGE_INTERVAL, move || {
            self.run(Utc::now()).map(|_| ())
        })
    }
}

/// Whether a key's age component falls strictly before the retention cutoff.
/// Unparseable components are treated as stale (fail-safe toward deletion).
fn is_stale(suffix: &str, component: AgeComponent, window: u32, today: NaiveDate) -> bool {
    match component {
        AgeComponent::Date => {
            let candidate = suffix.split(':').next().unwrap_or(suffix);
            match NaiveDate::parse_from_str(candidate, "%Y-%m-%d") {
                Ok(date) => date < today - Duration::days(window as i64),
                Err(_) => true,
            }
        }
        AgeComponent::TrailingMonth => {
            let candidate = suffix.rsplit(':').next().unwrap_or(suffix);
            month_is_stale(candidate, window, today)
        }
        AgeComponent::Month => month_is_stale(suffix, window, today),
    }
}

fn month_is_stale(candidate: &str, window: u32, today: NaiveDate) -> bool {
    match parse_month(candidate) {
        Some(total_months) => {
            let current = today.year() * 12 + today.month0() as i32;
            total_months < current - window as i32
        }
        None => true,
    }
}

/// Parse `YYYY-MM` into a linear month count.
fn parse_month(s: &str) -> Option<i32> {
    let (year, month) = s.split_once('-')?;
    if month.len() != 2 {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some(year * 12 + (month - 1) as i32)
}

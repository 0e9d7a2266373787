//! Audit-log integrity checking: gap detection over daily buckets.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use postforge_core::UserId;
use postforge_events::{EventBus, IntegritySummary, OpsEvent};
use postforge_kv::{keys, KvError, KvStore, KvStoreExt};
use postforge_notify::{Notifier, NotifyMessage};
use postforge_worker::{PeriodicWorker, WorkerHandle};

use crate::audit::AuditLog;
use crate::recipients::RecipientStore;

/// Days inspected per check (today inclusive, going back).
const WINDOW_DAYS: i64 = 7;
/// Minimum spacing between manual runs.
const MANUAL_COOLDOWN_SECS: i64 = 300;
/// Cadence of the scheduled check.
pub const CHECK_INTERVAL: std::time::Duration =
    std::time::Duration::from_secs(7 * 24 * 60 * 60);

/// Check health. `Warning` is informational, surfaced via notification and
/// a summary event, never raised as an application error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrityHealth {
    Ok,
    Warning,
}

/// What started the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntegrityTrigger {
    Scheduled,
    Manual { user: UserId },
}

/// Persisted result of the most recent check
/// (`audit_integrity_last_check`, overwritten each run).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditIntegrityResult {
    pub checked_at: DateTime<Utc>,
    pub gaps: Vec<NaiveDate>,
    pub health: IntegrityHealth,
    pub trigger: IntegrityTrigger,
}

/// Outcome of a manual (on-demand) check request.
#[derive(Debug, Clone, PartialEq)]
pub enum ManualCheckOutcome {
    Ran(AuditIntegrityResult),
    /// Suppressed by the cooldown; the stored last result, if any, is
    /// returned unchanged.
    RateLimited(Option<AuditIntegrityResult>),
}

/// Ops error for integrity checks.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Periodic (weekly) and on-demand gap detector over the audit log.
pub struct AuditIntegrityChecker<K, N, B> {
    audit: AuditLog<K>,
    recipients: RecipientStore<K>,
    kv: K,
    notifier: N,
    bus: B,
    /// Serializes a manual trigger against a scheduled run, and gates the
    /// manual cooldown.
    state: Mutex<Option<DateTime<Utc>>>,
}

impl<K, N, B> AuditIntegrityChecker<K, N, B>
where
    K: KvStore + Clone,
    N: Notifier,
    B: EventBus<OpsEvent>,
{
    pub fn new(kv: K, notifier: N, bus: B) -> Self {
        Self {
            audit: AuditLog::new(kv.clone()),
            recipients: RecipientStore::new(kv.clone()),
            kv,
            notifier,
            bus,
            state: Mutex::new(None),
        }
    }

    /// Weekly scheduled run.
    pub fn run_scheduled(&self, now: DateTime<Utc>) -> Result<AuditIntegrityResult, IntegrityError> {
        let _guard = self.state.lock();
        self.run(IntegrityTrigger::Scheduled, now)
    }

    /// On-demand run, recording the triggering identity. Rate-limited: a
    /// request inside the cooldown returns the persisted last result
    /// without re-checking.
    pub fn run_manual(
        &self,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<ManualCheckOutcome, IntegrityError> {
        let mut last_manual = match self.state.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        if let Some(at) = *last_manual {
            if now - at < Duration::seconds(MANUAL_COOLDOWN_SECS) {
                info!(user = %user, "manual integrity check rate-limited");
                return Ok(ManualCheckOutcome::RateLimited(self.last_result()?));
            }
        }
        let result = self.run(IntegrityTrigger::Manual { user }, now)?;
        *last_manual = Some(now);
        Ok(ManualCheckOutcome::Ran(result))
    }

    /// The persisted result of the most recent check, if any.
    pub fn last_result(&self) -> Result<Option<AuditIntegrityResult>, IntegrityError> {
        Ok(self
            .kv
            .get_typed::<AuditIntegrityResult>(keys::INTEGRITY_LAST_CHECK)?
            .map(|(r, _)| r))
    }

    fn run(
        &self,
        trigger: IntegrityTrigger,
        now: DateTime<Utc>,
    ) -> Result<AuditIntegrityResult, IntegrityError> {
        let today = now.date_naive();
        let mut gaps = Vec::new();
        for offset in (0..WINDOW_DAYS).rev() {
            let date = today - Duration::days(offset);
            if !self.audit.has_bucket(date)? {
                gaps.push(date);
            }
        }

        let health = if gaps.is_empty() {
            IntegrityHealth::Ok
        } else {
            IntegrityHealth::Warning
        };
        let result = AuditIntegrityResult {
            checked_at: now,
            gaps: gaps.clone(),
            health,
            trigger,
        };
        self.kv.set_typed(keys::INTEGRITY_LAST_CHECK, &result)?;

        if health == IntegrityHealth::Warning {
            self.alert_gaps(&gaps);
        }

        let summary = IntegritySummary {
            checked_at: now,
            healthy: health == IntegrityHealth::Ok,
            gaps: gaps.clone(),
        };
        if let Err(e) = self.bus.publish(OpsEvent::IntegrityChecked(summary)) {
            warn!(error = ?e, "failed to publish integrity summary");
        }

        info!(
            health = ?health,
            gap_count = gaps.len(),
            trigger = ?trigger,
            "audit integrity check completed"
        );
        Ok(result)
    }

    /// One alert listing every gap date, sent to each configured recipient
    /// best-effort.
    fn alert_gaps(&self, gaps: &[NaiveDate]) {
        let recipients = match self.recipients.get() {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "could not load compliance recipients");
                return;
            }
        };
        if recipients.is_empty() {
            warn!(gap_count = gaps.len(), "audit log has gaps but no recipients are configured");
            return;
        }

        let dates: Vec<String> = gaps.iter().map(|d| d.format("%Y-%m-%d").to_string()).collect();
        let message = NotifyMessage::new(
            format!("[Audit] {} day(s) missing from the security audit log", gaps.len()),
            format!(
                "The security audit log has no entries for: {}.\nInvestigate before the retention purge removes surrounding context.",
                dates.join(", ")
            ),
        );
        for recipient in &recipients {
            if let Err(e) = self.notifier.send(&message, recipient) {
                warn!(recipient = %recipient.email, error = %e, "integrity alert send failed");
            }
        }
    }
}

impl<K, N, B> AuditIntegrityChecker<K, N, B>
where
    K: KvStore + Clone + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    B: EventBus<OpsEvent> + Send + Sync + 'static,
{
    /// Run the scheduled check on its own timer thread until shutdown.
    pub fn spawn(self: Arc<Self>) -> WorkerHandle {
        PeriodicWorker::spawn("audit-integrity", CHECK_INTERVAL, move || {
            self.run_scheduled(Utc::now()).map(|_| ())
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use postforge_events::InMemoryEventBus;
    use postforge_kv::InMemoryKvStore;
    use postforge_notify::RecordingNotifier;

    use crate::audit::AuditEntry;

    use super::*;

    type Checker =
        AuditIntegrityChecker<Arc<InMemoryKvStore>, Arc<RecordingNotifier>, Arc<InMemoryEventBus<OpsEvent>>>;

    fn setup() -> (Arc<InMemoryKvStore>, Arc<RecordingNotifier>, Arc<InMemoryEventBus<OpsEvent>>, Checker) {
        let kv = Arc::new(InMemoryKvStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let bus = Arc::new(InMemoryEventBus::new());
        let checker = AuditIntegrityChecker::new(kv.clone(), notifier.clone(), bus.clone());
        (kv, notifier, bus, checker)
    }

    fn fill_days(kv: &Arc<InMemoryKvStore>, now: DateTime<Utc>, skip_offsets: &[i64]) {
        let log = AuditLog::new(kv.clone());
        for offset in 0..WINDOW_DAYS {
            if skip_offsets.contains(&offset) {
                continue;
            }
            let at = now - Duration::days(offset);
            log.append(&AuditEntry::system(at, "auth.login", "ok")).unwrap();
        }
    }

    #[test]
    fn complete_week_is_healthy() {
        let (kv, notifier, _bus, checker) = setup();
        let now = Utc::now();
        fill_days(&kv, now, &[]);

        let result = checker.run_scheduled(now).unwrap();
        assert_eq!(result.health, IntegrityHealth::Ok);
        assert!(result.gaps.is_empty());
        assert_eq!(notifier.sent_count(), 0);
    }

    #[test]
    fn gaps_produce_warning_listing_each_missing_day() {
        let (kv, notifier, bus, checker) = setup();
        let sub = bus.subscribe();
        let now = Utc::now();
        // Miss two days; offsets into the trailing window.
        fill_days(&kv, now, &[1, 5]);
        RecipientStore::new(kv.clone())
            .set(&["sec@example.com".to_string()])
            .unwrap();

        let result = checker.run_scheduled(now).unwrap();
        assert_eq!(result.health, IntegrityHealth::Warning);
        assert_eq!(
            result.gaps,
            vec![
                now.date_naive() - Duration::days(5),
                now.date_naive() - Duration::days(1),
            ]
        );
        // One alert, listing both dates.
        assert_eq!(notifier.sent_count(), 1);
        let (_, message) = &notifier.sent()[0];
        for gap in &result.gaps {
            assert!(message.body.contains(&gap.format("%Y-%m-%d").to_string()));
        }

        // Summary event either way.
        let event = sub.try_recv().unwrap();
        assert!(matches!(event, OpsEvent::IntegrityChecked(s) if !s.healthy));
    }

    #[test]
    fn last_result_is_overwritten_each_run() {
        let (kv, _notifier, _bus, checker) = setup();
        let now = Utc::now();

        let first = checker.run_scheduled(now).unwrap();
        assert_eq!(first.health, IntegrityHealth::Warning);

        fill_days(&kv, now, &[]);
        let second = checker.run_scheduled(now + Duration::minutes(1)).unwrap();
        assert_eq!(second.health, IntegrityHealth::Ok);
        assert_eq!(checker.last_result().unwrap().unwrap(), second);
    }

    #[test]
    fn manual_runs_are_rate_limited() {
        let (kv, _notifier, _bus, checker) = setup();
        let now = Utc::now();
        fill_days(&kv, now, &[]);
        let user = UserId::new();

        let first = checker.run_manual(user, now).unwrap();
        let ran = match first {
            ManualCheckOutcome::Ran(r) => r,
            other => panic!("expected a run, got {other:?}"),
        };
        assert_eq!(ran.trigger, IntegrityTrigger::Manual { user });

        // Within the cooldown: suppressed, stored result unchanged.
        let second = checker.run_manual(user, now + Duration::seconds(60)).unwrap();
        assert!(matches!(second, ManualCheckOutcome::RateLimited(Some(r)) if r == ran));
        assert_eq!(checker.last_result().unwrap().unwrap(), ran);

        // After the cooldown it runs again.
        let third = checker
            .run_manual(user, now + Duration::seconds(MANUAL_COOLDOWN_SECS + 1))
            .unwrap();
        assert!(matches!(third, ManualCheckOutcome::Ran(_)));
    }
}

//! SLA escalation with per-day deduplication.
//!
//! Invoked externally (not on a timer) with a tenant, its breach threshold,
//! the overdue items, and the operator recipients. A per-day/per-tenant/
//! per-item marker bounds escalation volume to at most one notification
//! batch per item per day, however often the caller polls.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use postforge_content::ContentItem;
use postforge_core::{DomainError, TenantId};
use postforge_kv::{keys, KvError, KvStore, KvStoreExt};
use postforge_notify::{Notifier, NotifyMessage, Recipient};

/// Dedup marker stored at `sla_esc:{date}:{tenant}:{item}`. Stale markers
/// persist until the retention purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EscalationMarker {
    /// A notification batch covering this item went out.
    Sent {
        sent_at: DateTime<Utc>,
        recipient_count: usize,
    },
    /// No transport was configured; suppressed so a later fix does not
    /// unleash a backlog of duplicate escalations.
    SkippedNoTransport,
}

/// Escalation error.
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Outcome of one escalation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct EscalationSummary {
    /// Items included in today's notification batch.
    pub escalated: usize,
    /// Items already marked today and therefore skipped.
    pub skipped: usize,
    /// Fresh items suppressed because no transport is configured.
    pub suppressed: usize,
    /// Recipients whose send succeeded.
    pub recipients_notified: usize,
}

/// Threshold-based, per-day deduplicated operator notification.
pub struct EscalationEngine<K, N> {
    kv: K,
    notifier: N,
}

impl<K: KvStore, N: Notifier> EscalationEngine<K, N> {
    pub fn new(kv: K, notifier: N) -> Self {
        Self { kv, notifier }
    }

    /// Escalate the given overdue items for one tenant.
    ///
    /// One notification batch per recipient (not per item); each recipient's
    /// send is independent and best-effort. Markers are written after the
    /// attempt regardless of per-recipient outcome.
    pub fn escalate(
        &self,
        tenant_id: TenantId,
        breach_hours: u32,
        overdue: &[ContentItem],
        recipients: &[Recipient],
        now: DateTime<Utc>,
    ) -> Result<EscalationSummary, EscalationError> {
        for item in overdue {
            if item.tenant_id != tenant_id {
                return Err(DomainError::validation(format!(
                    "overdue item {} does not belong to tenant {tenant_id}",
                    item.id
                ))
                .into());
            }
        }

        let today = now.date_naive();
        let mut summary = EscalationSummary::default();
        let mut fresh: Vec<&ContentItem> = Vec::new();

        for item in overdue {
            let key = keys::escalation_marker(today, tenant_id, item.id);
            if self.kv.get(&key)?.is_some() {
                summary.skipped += 1;
            } else {
                fresh.push(item);
            }
        }

        if fresh.is_empty() {
            return Ok(summary);
        }

        if !self.notifier.is_configured() {
            // Still mark the fresh items: once a transport is configured we
            // must not replay today's backlog as a storm.
            for item in &fresh {
                self.write_marker(today, tenant_id, item, EscalationMarker::SkippedNoTransport)?;
            }
            summary.suppressed = fresh.len();
            info!(
                tenant_id = %tenant_id,
                suppressed = summary.suppressed,
                "escalation suppressed: no notification transport configured"
            );
            return Ok(summary);
        }

        let message = breach_message(tenant_id, breach_hours, &fresh, now);
        for recipient in recipients {
            match self.notifier.send(&message, recipient) {
                Ok(()) => summary.recipients_notified += 1,
                Err(e) => warn!(
                    tenant_id = %tenant_id,
                    recipient = %recipient.email,
                    error = %e,
                    "escalation send failed"
                ),
            }
        }

        for item in &fresh {
            self.write_marker(
                today,
                tenant_id,
                item,
                EscalationMarker::Sent {
                    sent_at: now,
                    recipient_count: summary.recipients_notified,
                },
            )?;
        }
        summary.escalated = fresh.len();

        info!(
            tenant_id = %tenant_id,
            escalated = summary.escalated,
            skipped = summary.skipped,
            recipients = summary.recipients_notified,
            "SLA escalation completed"
        );
        Ok(summary)
    }

    fn write_marker(
        &self,
        today: chrono::NaiveDate,
        tenant_id: TenantId,
        item: &ContentItem,
        marker: EscalationMarker,
    ) -> Result<(), EscalationError> {
        let key = keys::escalation_marker(today, tenant_id, item.id);
        // Create-only: a conflict means a concurrent escalation already
        // marked this item today, which is exactly the dedup we want.
        match self.kv.set_typed_if_version(&key, &marker, None) {
            Ok(_) | Err(KvError::Conflict(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn breach_message(
    tenant_id: TenantId,
    breach_hours: u32,
    items: &[&ContentItem],
    now: DateTime<Utc>,
) -> NotifyMessage {
    let mut body = format!(
        "{} scheduled post(s) for tenant {tenant_id} have been stuck longer than {breach_hours}h:\n",
        items.len()
    );
    for item in items {
        let overdue_hours = item
            .scheduled_at
            .map(|at| (now - at).num_hours().max(0))
            .unwrap_or(0);
        body.push_str(&format!(
            "- \"{}\" ({}) overdue {}h\n",
            item.title, item.platform, overdue_hours
        ));
    }
    NotifyMessage::new(
        format!("[SLA breach] {} overdue scheduled post(s)", items.len()),
        body,
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use postforge_core::Platform;
    use postforge_kv::InMemoryKvStore;
    use postforge_notify::{RecordingNotifier, UnconfiguredNotifier};

    use super::*;

    fn overdue_item(tenant: TenantId, hours_ago: i64) -> ContentItem {
        ContentItem::scheduled(
            tenant,
            Platform::Facebook,
            "stuck post",
            "b",
            Utc::now() - Duration::hours(hours_ago),
        )
    }

    fn ops_recipients() -> Vec<Recipient> {
        vec![
            Recipient::new("ops@example.com").unwrap(),
            Recipient::new("oncall@example.com").unwrap(),
        ]
    }

    #[test]
    fn first_escalation_sends_one_batch_per_recipient() {
        let kv = Arc::new(InMemoryKvStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = EscalationEngine::new(kv, notifier.clone());
        let tenant = TenantId::new();
        let items = vec![overdue_item(tenant, 50), overdue_item(tenant, 60)];

        let summary = engine
            .escalate(tenant, 48, &items, &ops_recipients(), Utc::now())
            .unwrap();

        assert_eq!(summary.escalated, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(summary.recipients_notified, 2);
        // One batch per recipient, not per item.
        assert_eq!(notifier.sent_count(), 2);
    }

    #[test]
    fn same_day_reescalation_is_deduplicated() {
        let kv = Arc::new(InMemoryKvStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = EscalationEngine::new(kv, notifier.clone());
        let tenant = TenantId::new();
        let items = vec![overdue_item(tenant, 50)];
        let now = Utc::now();

        engine
            .escalate(tenant, 48, &items, &ops_recipients(), now)
            .unwrap();
        let second = engine
            .escalate(tenant, 48, &items, &ops_recipients(), now)
            .unwrap();

        assert_eq!(second.escalated, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(notifier.sent_count(), 2);

        // Next calendar day escalates again.
        let tomorrow = now + Duration::days(1);
        let third = engine
            .escalate(tenant, 48, &items, &ops_recipients(), tomorrow)
            .unwrap();
        assert_eq!(third.escalated, 1);
    }

    #[test]
    fn no_transport_suppresses_but_still_marks() {
        let kv = Arc::new(InMemoryKvStore::new());
        let engine = EscalationEngine::new(kv.clone(), UnconfiguredNotifier);
        let tenant = TenantId::new();
        let items = vec![overdue_item(tenant, 72)];
        let now = Utc::now();

        let summary = engine
            .escalate(tenant, 48, &items, &ops_recipients(), now)
            .unwrap();
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.escalated, 0);
        assert_eq!(summary.recipients_notified, 0);

        // Marker written, so a second call the same day escalates nothing.
        let again = engine
            .escalate(tenant, 48, &items, &ops_recipients(), now)
            .unwrap();
        assert_eq!(again.skipped, 1);
        assert_eq!(again.suppressed, 0);
    }

    #[test]
    fn partial_recipient_failure_still_marks_items() {
        let kv = Arc::new(InMemoryKvStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        notifier.fail_for("oncall@example.com");
        let engine = EscalationEngine::new(kv, notifier.clone());
        let tenant = TenantId::new();
        let items = vec![overdue_item(tenant, 50)];
        let now = Utc::now();

        let summary = engine
            .escalate(tenant, 48, &items, &ops_recipients(), now)
            .unwrap();
        assert_eq!(summary.escalated, 1);
        assert_eq!(summary.recipients_notified, 1);

        // Marked despite the partial failure.
        let again = engine
            .escalate(tenant, 48, &items, &ops_recipients(), now)
            .unwrap();
        assert_eq!(again.skipped, 1);
    }

    #[test]
    fn foreign_item_is_rejected_without_side_effects() {
        let kv = Arc::new(InMemoryKvStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let engine = EscalationEngine::new(kv.clone(), notifier.clone());
        let tenant = TenantId::new();
        let foreign = overdue_item(TenantId::new(), 60);

        let err = engine
            .escalate(tenant, 48, &[foreign], &ops_recipients(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, EscalationError::Validation(_)));
        assert_eq!(notifier.sent_count(), 0);
        assert!(kv.is_empty());
    }
}

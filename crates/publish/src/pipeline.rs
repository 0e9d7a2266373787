//! The retry state machine for one due item.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use postforge_alerts::{AlertError, AlertStore, FailureAlert};
use postforge_content::store::{ContentStore, ContentStoreError};
use postforge_content::{ConnectionError, ConnectionResolver, ContentItem, DeliveryState, MAX_ATTEMPTS};
use postforge_events::{EventBus, OpsEvent, PublishRecorded};
use postforge_kv::KvStore;
use postforge_ops::{AuditEntry, AuditLog};

use crate::history::PublishHistory;
use crate::publisher::ChannelPublisher;

/// What the pipeline did with one due item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Delivered; terminal.
    Published { reference: String },
    /// Failed below the budget; stays scheduled for a later tick.
    Retried { attempts: u32 },
    /// This failure spent the budget; alert raised.
    Exhausted,
    /// Already exhausted; existing alert re-asserted, no delivery attempt.
    AlertReasserted,
    /// Not in the delivery lifecycle (defensive; the due query should not
    /// return such items).
    Skipped,
}

/// Pipeline error: infrastructure failures only. Delivery failures are a
/// normal outcome, not an error.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Content(#[from] ContentStoreError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Alert(#[from] AlertError),
}

/// Drives one due item through publish/retry/escalate.
pub struct PublishPipeline<K, C, R, P, B> {
    alerts: AlertStore<K>,
    audit: AuditLog<K>,
    history: PublishHistory<K>,
    content: C,
    connections: R,
    publisher: P,
    bus: B,
}

impl<K, C, R, P, B> PublishPipeline<K, C, R, P, B>
where
    K: KvStore + Clone,
    C: ContentStore,
    R: ConnectionResolver,
    P: ChannelPublisher,
    B: EventBus<OpsEvent>,
{
    pub fn new(kv: K, content: C, connections: R, publisher: P, bus: B) -> Self {
        Self {
            alerts: AlertStore::new(kv.clone()),
            audit: AuditLog::new(kv.clone()),
            history: PublishHistory::new(kv),
            content,
            connections,
            publisher,
            bus,
        }
    }

    /// Process one due item. Mutates `item` and persists the result.
    pub fn process(
        &self,
        item: &mut ContentItem,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, PipelineError> {
        match item.delivery_state() {
            Some(DeliveryState::Exhausted { .. }) => {
                // Budget already spent: re-assert the alert from the stored
                // error/stamp and leave the item for a human. Idempotent.
                self.alerts.upsert(&FailureAlert::from_item(item, now))?;
                debug!(item_id = %item.id, "exhausted item: alert re-asserted");
                Ok(ItemOutcome::AlertReasserted)
            }
            Some(DeliveryState::Scheduled { .. }) => {
                // Connections are resolved fresh per item, never cached
                // across ticks.
                match self.connections.for_platform(item.tenant_id, item.platform)? {
                    None => self.fail(item, "no connected account", now),
                    Some(connection) => match self.publisher.publish(&connection, item) {
                        Ok(receipt) => self.succeed(item, receipt.reference, now),
                        Err(e) => self.fail(item, e.to_string(), now),
                    },
                }
            }
            Some(DeliveryState::Published) | None => {
                debug!(item_id = %item.id, status = ?item.status, "item not deliverable, skipping");
                Ok(ItemOutcome::Skipped)
            }
        }
    }

    fn succeed(
        &self,
        item: &mut ContentItem,
        reference: String,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, PipelineError> {
        item.mark_published(now);
        self.content.update(item)?;

        // Audit trail, history, and the ops event are best-effort: the item
        // is already terminal and must not flip back on a bookkeeping error.
        let entry = AuditEntry::system(
            now,
            "content.published",
            format!("item {} delivered to {} ({reference})", item.id, item.platform),
        )
        .for_tenant(item.tenant_id);
        if let Err(e) = self.audit.append(&entry) {
            warn!(item_id = %item.id, error = %e, "audit append failed after publish");
        }

        let record = PublishRecorded {
            tenant_id: item.tenant_id,
            item_id: item.id,
            platform: item.platform,
            reference: reference.clone(),
            published_at: now,
        };
        if let Err(e) = self.history.record(&record) {
            warn!(item_id = %item.id, error = %e, "publish history write failed");
        }
        if let Err(e) = self.bus.publish(OpsEvent::PublishRecorded(record)) {
            warn!(item_id = %item.id, error = ?e, "publish event emit failed");
        }

        info!(item_id = %item.id, platform = %item.platform, "item published");
        Ok(ItemOutcome::Published { reference })
    }

    fn fail(
        &self,
        item: &mut ContentItem,
        error: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<ItemOutcome, PipelineError> {
        let error = error.into();
        let attempts = item.record_failure(error.clone(), now);
        self.content.update(item)?;

        if attempts >= MAX_ATTEMPTS {
            self.alerts.upsert(&FailureAlert::from_item(item, now))?;
            warn!(
                item_id = %item.id,
                attempts,
                error = %error,
                "delivery budget exhausted, alert raised"
            );
            Ok(ItemOutcome::Exhausted)
        } else {
            debug!(item_id = %item.id, attempts, error = %error, "delivery failed, will retry");
            Ok(ItemOutcome::Retried { attempts })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use postforge_content::{InMemoryContentStore, StaticConnections};
    use postforge_core::{Platform, TenantId};
    use postforge_events::InMemoryEventBus;
    use postforge_kv::InMemoryKvStore;

    use crate::publisher::{PublishError, ScriptedPublisher};

    use super::*;

    struct Fixture {
        kv: Arc<InMemoryKvStore>,
        content: Arc<InMemoryContentStore>,
        connections: Arc<StaticConnections>,
        publisher: Arc<ScriptedPublisher>,
        bus: Arc<InMemoryEventBus<OpsEvent>>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                kv: Arc::new(InMemoryKvStore::new()),
                content: Arc::new(InMemoryContentStore::new()),
                connections: Arc::new(StaticConnections::new()),
                publisher: Arc::new(ScriptedPublisher::new()),
                bus: Arc::new(InMemoryEventBus::new()),
            }
        }

        fn pipeline(
            &self,
        ) -> PublishPipeline<
            Arc<InMemoryKvStore>,
            Arc<InMemoryContentStore>,
            Arc<StaticConnections>,
            Arc<ScriptedPublisher>,
            Arc<InMemoryEventBus<OpsEvent>>,
        > {
            PublishPipeline::new(
                self.kv.clone(),
                self.content.clone(),
                self.connections.clone(),
                self.publisher.clone(),
                self.bus.clone(),
            )
        }

        fn alerts(&self) -> AlertStore<Arc<InMemoryKvStore>> {
            AlertStore::new(self.kv.clone())
        }

        fn due_item(&self, tenant: TenantId) -> ContentItem {
            let item = ContentItem::scheduled(
                tenant,
                Platform::X,
                "launch post",
                "body",
                Utc::now() - Duration::minutes(1),
            );
            self.content.upsert(item.clone()).unwrap();
            item
        }
    }

    #[test]
    fn success_publishes_and_records_everywhere() {
        let fx = Fixture::new();
        let tenant = TenantId::new();
        fx.connections.connect(tenant, Platform::X, "@brand");
        let mut item = fx.due_item(tenant);
        let sub = fx.bus.subscribe();
        let now = Utc::now();

        let outcome = fx.pipeline().process(&mut item, now).unwrap();

        assert!(matches!(outcome, ItemOutcome::Published { .. }));
        let stored = fx.content.get(tenant, item.id).unwrap().unwrap();
        assert_eq!(stored.status, postforge_content::ContentStatus::Published);
        assert_eq!(stored.attempts, 0);
        assert_eq!(stored.last_error, None);

        // Audit trail entry, history record, and the ops event.
        let audit = AuditLog::new(fx.kv.clone());
        assert_eq!(audit.entries(now.date_naive()).unwrap().len(), 1);
        let history = PublishHistory::new(fx.kv.clone());
        let month = now.format("%Y-%m").to_string();
        assert_eq!(history.month_records(tenant, &month).unwrap().len(), 1);
        assert!(matches!(sub.try_recv().unwrap(), OpsEvent::PublishRecorded(_)));
    }

    #[test]
    fn failures_below_budget_retry_without_alert() {
        let fx = Fixture::new();
        let tenant = TenantId::new();
        fx.connections.connect(tenant, Platform::X, "@brand");
        let mut item = fx.due_item(tenant);
        fx.publisher.fail_next(
            item.id,
            2,
            PublishError::Unavailable("timeout".to_string()),
        );
        let pipeline = fx.pipeline();

        for expected in 1..=2u32 {
            let outcome = pipeline.process(&mut item, Utc::now()).unwrap();
            assert_eq!(outcome, ItemOutcome::Retried { attempts: expected });
            assert!(fx.alerts().list(tenant).unwrap().is_empty());
        }

        // Third tick succeeds; the counter resets.
        let outcome = pipeline.process(&mut item, Utc::now()).unwrap();
        assert!(matches!(outcome, ItemOutcome::Published { .. }));
        assert_eq!(item.attempts, 0);
    }

    #[test]
    fn third_failure_raises_exactly_one_alert() {
        let fx = Fixture::new();
        let tenant = TenantId::new();
        fx.connections.connect(tenant, Platform::X, "@brand");
        let mut item = fx.due_item(tenant);
        fx.publisher.fail_next(
            item.id,
            5,
            PublishError::Rejected("invalid media".to_string()),
        );
        let pipeline = fx.pipeline();

        pipeline.process(&mut item, Utc::now()).unwrap();
        pipeline.process(&mut item, Utc::now()).unwrap();
        let outcome = pipeline.process(&mut item, Utc::now()).unwrap();
        assert_eq!(outcome, ItemOutcome::Exhausted);

        let alerts = fx.alerts().list(tenant).unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].card_id, item.id);
        assert_eq!(alerts[0].attempts, 3);

        // Re-scanning the exhausted item re-asserts, never duplicates, and
        // never re-attempts delivery.
        let before = fx.publisher.publish_count();
        let outcome = pipeline.process(&mut item, Utc::now()).unwrap();
        assert_eq!(outcome, ItemOutcome::AlertReasserted);
        assert_eq!(fx.alerts().list(tenant).unwrap().len(), 1);
        assert_eq!(fx.publisher.publish_count(), before);
    }

    #[test]
    fn missing_connection_counts_toward_the_budget() {
        let fx = Fixture::new();
        let tenant = TenantId::new();
        // No connection registered for X.
        let mut item = fx.due_item(tenant);
        let pipeline = fx.pipeline();

        let outcome = pipeline.process(&mut item, Utc::now()).unwrap();
        assert_eq!(outcome, ItemOutcome::Retried { attempts: 1 });
        assert_eq!(item.last_error.as_deref(), Some("no connected account"));

        pipeline.process(&mut item, Utc::now()).unwrap();
        let outcome = pipeline.process(&mut item, Utc::now()).unwrap();
        assert_eq!(outcome, ItemOutcome::Exhausted);
        assert_eq!(fx.alerts().list(tenant).unwrap().len(), 1);
    }

    #[test]
    fn retry_after_exhaustion_goes_through_the_full_budget_again() {
        let fx = Fixture::new();
        let tenant = TenantId::new();
        fx.connections.connect(tenant, Platform::X, "@brand");
        let mut item = fx.due_item(tenant);
        fx.publisher
            .fail_next(item.id, 3, PublishError::Unavailable("down".to_string()));
        let pipeline = fx.pipeline();
        for _ in 0..3 {
            pipeline.process(&mut item, Utc::now()).unwrap();
        }

        // Human requeue.
        let mut item = fx
            .alerts()
            .retry(&fx.content, tenant, item.id, Utc::now())
            .unwrap();
        assert!(fx.alerts().list(tenant).unwrap().is_empty());

        let outcome = pipeline.process(&mut item, Utc::now()).unwrap();
        assert!(matches!(outcome, ItemOutcome::Published { .. }));
    }
}

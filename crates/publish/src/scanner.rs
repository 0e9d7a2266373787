//! Periodic scan for due items.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use postforge_content::store::ContentStore;
use postforge_content::ConnectionResolver;
use postforge_events::{EventBus, OpsEvent};
use postforge_kv::KvStore;
use postforge_worker::{PeriodicWorker, WorkerHandle};

use crate::pipeline::{ItemOutcome, PublishPipeline};
use crate::publisher::ChannelPublisher;

/// Tick cadence of the scanner.
pub const SCAN_INTERVAL: Duration = Duration::from_secs(60);

/// Max items taken per tick. A backlog larger than this drains across
/// successive ticks.
pub const SCAN_BATCH_LIMIT: usize = 10;

/// Counters from one completed scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    pub processed: usize,
    pub published: usize,
    pub retried: usize,
    pub exhausted: usize,
    pub reasserted: usize,
    pub errors: usize,
}

/// Result of one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed(ScanStats),
    /// A previous scan was still in flight; this tick did nothing.
    SkippedBusy,
}

/// Walks due items through the pipeline once per tick.
pub struct PublishScanner<K, C, R, P, B> {
    pipeline: PublishPipeline<K, C, R, P, B>,
    content: C,
    in_flight: Mutex<()>,
}

impl<K, C, R, P, B> PublishScanner<K, C, R, P, B>
where
    K: KvStore + Clone + Send + Sync + 'static,
    C: ContentStore + Clone + Send + Sync + 'static,
    R: ConnectionResolver + Send + Sync + 'static,
    P: ChannelPublisher + Send + Sync + 'static,
    B: EventBus<OpsEvent> + Send + Sync + 'static,
{
    pub fn new(kv: K, content: C, connections: R, publisher: P, bus: B) -> Self {
        Self {
            pipeline: PublishPipeline::new(kv, content.clone(), connections, publisher, bus),
            content,
            in_flight: Mutex::new(()),
        }
    }

    /// One scan pass. Ticks never overlap: if the previous pass is still
    /// running (slow channel, large batch) this one is skipped, and the
    /// backlog waits for the next tick.
    pub fn scan(&self, now: DateTime<Utc>) -> ScanOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            info!("previous scan still in flight, skipping tick");
            return ScanOutcome::SkippedBusy;
        };

        let mut stats = ScanStats::default();
        let due = match self.content.due_items(now, SCAN_BATCH_LIMIT) {
            Ok(due) => due,
            Err(e) => {
                warn!(error = %e, "due-item query failed, skipping this tick");
                stats.errors += 1;
                return ScanOutcome::Completed(stats);
            }
        };

        for mut item in due {
            stats.processed += 1;
            // One bad item must not sink the rest of the batch.
            match self.pipeline.process(&mut item, now) {
                Ok(ItemOutcome::Published { .. }) => stats.published += 1,
                Ok(ItemOutcome::Retried { .. }) => stats.retried += 1,
                Ok(ItemOutcome::Exhausted) => stats.exhausted += 1,
                Ok(ItemOutcome::AlertReasserted) => stats.reasserted += 1,
                Ok(ItemOutcome::Skipped) => {}
                Err(e) => {
                    warn!(item_id = %item.id, error = %e, "item processing failed");
                    stats.errors += 1;
                }
            }
        }

        if stats.processed > 0 || stats.errors > 0 {
            info!(
                processed = stats.processed,
                published = stats.published,
                retried = stats.retried,
                exhausted = stats.exhausted,
                errors = stats.errors,
                "scan completed"
            );
        }
        ScanOutcome::Completed(stats)
    }

    /// Run the scanner on its own thread until the handle shuts it down.
    pub fn spawn(self: Arc<Self>) -> WorkerHandle {
        PeriodicWorker::spawn("publish-scanner", SCAN_INTERVAL, move || {
            self.scan(Utc::now());
            Ok::<(), Infallible>(())
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use postforge_content::{ContentItem, InMemoryContentStore, StaticConnections};
    use postforge_core::{Platform, TenantId};
    use postforge_events::InMemoryEventBus;
    use postforge_kv::InMemoryKvStore;

    use crate::publisher::{ChannelPublisher, PublishError, PublishReceipt, ScriptedPublisher};
    use postforge_content::PlatformConnection;

    use super::*;

    type TestScanner<P> = PublishScanner<
        Arc<InMemoryKvStore>,
        Arc<InMemoryContentStore>,
        Arc<StaticConnections>,
        P,
        Arc<InMemoryEventBus<OpsEvent>>,
    >;

    fn scanner_with<P: ChannelPublisher + Send + Sync + 'static>(
        content: Arc<InMemoryContentStore>,
        connections: Arc<StaticConnections>,
        publisher: P,
    ) -> TestScanner<P> {
        PublishScanner::new(
            Arc::new(InMemoryKvStore::new()),
            content,
            connections,
            publisher,
            Arc::new(InMemoryEventBus::new()),
        )
    }

    fn seed_due(content: &InMemoryContentStore, tenant: TenantId, n: usize) {
        let base = Utc::now() - ChronoDuration::hours(1);
        for i in 0..n {
            let item = ContentItem::scheduled(
                tenant,
                Platform::Facebook,
                format!("post {i}"),
                "body",
                base + ChronoDuration::seconds(i as i64),
            );
            content.upsert(item).unwrap();
        }
    }

    #[test]
    fn tick_is_capped_at_the_batch_limit() {
        let content = Arc::new(InMemoryContentStore::new());
        let connections = Arc::new(StaticConnections::new());
        let tenant = TenantId::new();
        connections.connect(tenant, Platform::Facebook, "page");
        seed_due(&content, tenant, 15);
        let scanner = scanner_with(
            content.clone(),
            connections,
            Arc::new(ScriptedPublisher::new()),
        );

        let ScanOutcome::Completed(stats) = scanner.scan(Utc::now()) else {
            panic!("tick skipped");
        };
        assert_eq!(stats.processed, 10);
        assert_eq!(stats.published, 10);

        // Remainder drains on the next tick.
        let ScanOutcome::Completed(stats) = scanner.scan(Utc::now()) else {
            panic!("tick skipped");
        };
        assert_eq!(stats.processed, 5);
    }

    #[test]
    fn one_failing_item_does_not_sink_the_batch() {
        let content = Arc::new(InMemoryContentStore::new());
        let connections = Arc::new(StaticConnections::new());
        let tenant = TenantId::new();
        connections.connect(tenant, Platform::Facebook, "page");
        seed_due(&content, tenant, 3);
        let publisher = Arc::new(ScriptedPublisher::new());
        let victim = content.due_items(Utc::now(), 10).unwrap()[1].id;
        publisher.fail_next(victim, 1, PublishError::Unavailable("503".to_string()));
        let scanner = scanner_with(content.clone(), connections, publisher);

        let ScanOutcome::Completed(stats) = scanner.scan(Utc::now()) else {
            panic!("tick skipped");
        };
        assert_eq!(stats.processed, 3);
        assert_eq!(stats.published, 2);
        assert_eq!(stats.retried, 1);
        assert_eq!(stats.errors, 0);
    }

    /// Publisher that parks on a channel so a scan can be held mid-flight
    /// from the test thread.
    struct BlockingPublisher {
        release: Mutex<std::sync::mpsc::Receiver<()>>,
    }

    impl ChannelPublisher for BlockingPublisher {
        fn publish(
            &self,
            _connection: &PlatformConnection,
            item: &ContentItem,
        ) -> Result<PublishReceipt, PublishError> {
            if let Ok(rx) = self.release.lock() {
                let _ = rx.recv();
            }
            Ok(PublishReceipt {
                reference: format!("{}:{}", item.platform, item.id),
            })
        }
    }

    #[test]
    fn overlapping_tick_is_skipped() {
        let content = Arc::new(InMemoryContentStore::new());
        let connections = Arc::new(StaticConnections::new());
        let tenant = TenantId::new();
        connections.connect(tenant, Platform::Facebook, "page");
        seed_due(&content, tenant, 1);

        let (release_tx, release_rx) = std::sync::mpsc::channel();
        let scanner = Arc::new(scanner_with(
            content.clone(),
            connections,
            BlockingPublisher {
                release: Mutex::new(release_rx),
            },
        ));

        let held = {
            let scanner = scanner.clone();
            std::thread::spawn(move || scanner.scan(Utc::now()))
        };
        // Wait until the first scan holds the tick lock (parked inside the
        // publisher).
        while scanner.in_flight.try_lock().is_ok() && !held.is_finished() {
            std::thread::sleep(Duration::from_millis(5));
        }

        assert_eq!(scanner.scan(Utc::now()), ScanOutcome::SkippedBusy);

        release_tx.send(()).unwrap();
        let first = held.join().unwrap();
        assert!(matches!(first, ScanOutcome::Completed(s) if s.published == 1));

        // With the first scan done, ticks run again.
        assert!(matches!(scanner.scan(Utc::now()), ScanOutcome::Completed(_)));
    }

    #[test]
    fn empty_backlog_is_a_quiet_tick() {
        let scanner = scanner_with(
            Arc::new(InMemoryContentStore::new()),
            Arc::new(StaticConnections::new()),
            Arc::new(ScriptedPublisher::new()),
        );
        assert_eq!(
            scanner.scan(Utc::now()),
            ScanOutcome::Completed(ScanStats::default())
        );
    }
}

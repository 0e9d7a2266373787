//! Daily failure digest: per-tenant rollup of unresolved alerts.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use postforge_core::TenantId;
use postforge_kv::KvStore;
use postforge_notify::{Notifier, NotifyMessage, Recipient};
use postforge_worker::{PeriodicWorker, WorkerHandle};

use crate::alert::FailureAlert;
use crate::store::AlertStore;

/// Cadence of the digest run.
pub const DIGEST_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Resolves a tenant's active administrators (external collaborator).
pub trait AdminDirectory: Send + Sync {
    fn active_admins(&self, tenant_id: TenantId) -> Result<Vec<Recipient>, String>;
}

/// In-memory directory for tests/dev.
#[derive(Debug, Default)]
pub struct StaticAdminDirectory {
    admins: RwLock<HashMap<TenantId, Vec<Recipient>>>,
}

impl StaticAdminDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_admin(&self, tenant_id: TenantId, admin: Recipient) {
        if let Ok(mut map) = self.admins.write() {
            map.entry(tenant_id).or_default().push(admin);
        }
    }
}

impl<D> AdminDirectory for Arc<D>
where
    D: AdminDirectory + ?Sized,
{
    fn active_admins(&self, tenant_id: TenantId) -> Result<Vec<Recipient>, String> {
        (**self).active_admins(tenant_id)
    }
}

impl AdminDirectory for StaticAdminDirectory {
    fn active_admins(&self, tenant_id: TenantId) -> Result<Vec<Recipient>, String> {
        let map = self.admins.read().map_err(|_| "directory lock poisoned".to_string())?;
        Ok(map.get(&tenant_id).cloned().unwrap_or_default())
    }
}

/// Counts from one digest run. The run itself never fails; everything is
/// per-send isolated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DigestOutcome {
    pub tenants_with_alerts: usize,
    pub digests_sent: usize,
    pub send_failures: usize,
}

/// Daily per-tenant failure rollup dispatcher.
pub struct FailureDigest<K, N, D> {
    alerts: AlertStore<K>,
    notifier: N,
    directory: D,
}

impl<K, N, D> FailureDigest<K, N, D>
where
    K: KvStore,
    N: Notifier,
    D: AdminDirectory,
{
    pub fn new(kv: K, notifier: N, directory: D) -> Self {
        Self {
            alerts: AlertStore::new(kv),
            notifier,
            directory,
        }
    }

    /// One daily run. A failure for one admin or tenant never blocks the
    /// rest.
    pub fn run(&self) -> DigestOutcome {
        let mut outcome = DigestOutcome::default();

        let tenants = match self.alerts.tenants_with_alerts() {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "failure digest could not enumerate tenants");
                return outcome;
            }
        };

        for tenant_id in tenants {
            let alerts = match self.alerts.list(tenant_id) {
                Ok(a) => a,
                Err(e) => {
                    warn!(tenant_id = %tenant_id, error = %e, "skipping tenant: alert read failed");
                    continue;
                }
            };
            if alerts.is_empty() {
                continue;
            }
            outcome.tenants_with_alerts += 1;

            let admins = match self.directory.active_admins(tenant_id) {
                Ok(a) => a,
                Err(e) => {
                    warn!(tenant_id = %tenant_id, error = %e, "skipping tenant: admin lookup failed");
                    continue;
                }
            };

            let message = digest_message(&alerts);
            for admin in &admins {
                match self.notifier.send(&message, admin) {
                    Ok(()) => outcome.digests_sent += 1,
                    Err(e) => {
                        outcome.send_failures += 1;
                        warn!(
                            tenant_id = %tenant_id,
                            recipient = %admin.email,
                            error = %e,
                            "digest send failed"
                        );
                    }
                }
            }
        }

        info!(
            tenants = outcome.tenants_with_alerts,
            sent = outcome.digests_sent,
            failed = outcome.send_failures,
            "failure digest run completed"
        );
        outcome
    }
}

impl<K, N, D> FailureDigest<K, N, D>
where
    K: KvStore + Send + Sync + 'static,
    N: Notifier + Send + Sync + 'static,
    D: AdminDirectory + Send + Sync + 'static,
{
    /// Run the digest on its own timer thread until shutdown.
    pub fn spawn(self: Arc<Self>) -> WorkerHandle {
        PeriodicWorker::spawn("failure-digest", DIGEST_INTERVAL, move || {
            self.run();
            Ok::<(), Infallible>(())
        })
    }
}

fn digest_message(alerts: &[FailureAlert]) -> NotifyMessage {
    let mut body = format!(
        "{} scheduled post(s) could not be delivered and need attention:\n",
        alerts.len()
    );
    for alert in alerts {
        body.push_str(&format!(
            "- \"{}\" ({}) failed {} time(s): {}\n",
            alert.title, alert.platform, alert.attempts, alert.error
        ));
    }
    NotifyMessage::new(
        format!("[Daily digest] {} undelivered scheduled post(s)", alerts.len()),
        body,
    )
}

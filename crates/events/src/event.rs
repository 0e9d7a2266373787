//! Operational events emitted by the publishing/ops subsystem.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use postforge_core::{ContentItemId, Platform, TenantId};

/// One successful delivery, recorded for the tenant's publish history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRecorded {
    pub tenant_id: TenantId,
    pub item_id: ContentItemId,
    pub platform: Platform,
    /// Reference returned by the delivery channel (post id/URL).
    pub reference: String,
    pub published_at: DateTime<Utc>,
}

/// Per-namespace deletion count from one retention purge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespacePurgeCount {
    pub namespace: String,
    pub deleted: usize,
}

/// Summary of one retention purge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeSummary {
    pub ran_at: DateTime<Utc>,
    pub counts: Vec<NamespacePurgeCount>,
}

impl PurgeSummary {
    pub fn total_deleted(&self) -> usize {
        self.counts.iter().map(|c| c.deleted).sum()
    }
}

/// Summary of one audit-log integrity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegritySummary {
    pub checked_at: DateTime<Utc>,
    pub healthy: bool,
    pub gaps: Vec<NaiveDate>,
}

/// Events published on the operational bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OpsEvent {
    PublishRecorded(PublishRecorded),
    PurgeCompleted(PurgeSummary),
    IntegrityChecked(IntegritySummary),
}

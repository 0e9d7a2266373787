//! Content items and their delivery lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use postforge_core::{ContentItemId, Platform, TenantId};

/// Delivery attempt budget. Once a scheduled item has failed this many
/// times it is exhausted: it keeps its `scheduled` status (plus an alert)
/// until a human retries or reschedules it.
pub const MAX_ATTEMPTS: u32 = 3;

/// Content item workflow status.
///
/// Creation and approval happen in an out-of-scope workflow; once an item is
/// `scheduled` only the delivery pipeline mutates it. `published` is
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    PendingReview,
    Approved,
    Rejected,
    Scheduled,
    Published,
}

/// Explicit delivery state, derived once from status + attempt counter so
/// "is this exhausted?" is answered in one place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryState {
    /// Waiting for its scheduled time, or mid retry budget.
    Scheduled { attempts: u32 },
    /// Delivered. Terminal, non-retryable.
    Published,
    /// Retry budget spent; waiting for a human requeue.
    Exhausted {
        error: String,
        failed_at: Option<DateTime<Utc>>,
    },
}

/// A tenant-owned content item with scheduling and retry metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: ContentItemId,
    pub tenant_id: TenantId,
    pub platform: Platform,
    pub title: String,
    pub body: String,
    pub status: ContentStatus,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Failed delivery attempts so far (0..=MAX_ATTEMPTS).
    pub attempts: u32,
    pub last_error: Option<String>,
    pub failed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// Create an approved item scheduled for delivery.
    pub fn scheduled(
        tenant_id: TenantId,
        platform: Platform,
        title: impl Into<String>,
        body: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ContentItemId::new(),
            tenant_id,
            platform,
            title: title.into(),
            body: body.into(),
            status: ContentStatus::Scheduled,
            scheduled_at: Some(scheduled_at),
            attempts: 0,
            last_error: None,
            failed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Delivery state for items in the delivery lifecycle; `None` for items
    /// still in the editorial workflow.
    pub fn delivery_state(&self) -> Option<DeliveryState> {
        match self.status {
            ContentStatus::Published => Some(DeliveryState::Published),
            ContentStatus::Scheduled if self.attempts >= MAX_ATTEMPTS => {
                Some(DeliveryState::Exhausted {
                    error: self
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "delivery failed".to_string()),
                    failed_at: self.failed_at,
                })
            }
            ContentStatus::Scheduled => Some(DeliveryState::Scheduled {
                attempts: self.attempts,
            }),
            _ => None,
        }
    }

    /// Whether the item is due for delivery at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ContentStatus::Scheduled
            && self.scheduled_at.map(|at| at <= now).unwrap_or(false)
    }

    /// Record a successful delivery. Clears retry metadata; terminal.
    pub fn mark_published(&mut self, now: DateTime<Utc>) {
        self.status = ContentStatus::Published;
        self.attempts = 0;
        self.last_error = None;
        self.failed_at = None;
        self.updated_at = now;
    }

    /// Record one failed delivery attempt. Status stays `scheduled`; the
    /// exhaustion stamp (`failed_at`) is set exactly when the budget is
    /// spent. Returns the new attempt count.
    pub fn record_failure(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> u32 {
        if self.attempts < MAX_ATTEMPTS {
            self.attempts += 1;
        }
        self.last_error = Some(error.into());
        if self.attempts >= MAX_ATTEMPTS && self.failed_at.is_none() {
            self.failed_at = Some(now);
        }
        self.updated_at = now;
        self.attempts
    }

    /// Human-initiated requeue: reset the retry budget so the item is
    /// re-evaluated on the next scan if still due.
    pub fn reset_retries(&mut self, now: DateTime<Utc>) {
        self.attempts = 0;
        self.last_error = None;
        self.failed_at = None;
        self.updated_at = now;
    }
}

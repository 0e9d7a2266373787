//! Failure alerts raised when an item exhausts its delivery budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use postforge_content::ContentItem;
use postforge_core::{ContentItemId, Platform, TenantId};

/// Operator-facing alert for one exhausted content item.
///
/// At most one exists per unresolved item per tenant; writers upsert by
/// `card_id` rather than appending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureAlert {
    /// The exhausted item's id; unique within the tenant's alert list.
    pub card_id: ContentItemId,
    pub tenant_id: TenantId,
    /// Title/platform snapshot taken at exhaustion time, so the alert stays
    /// readable even if the item is later edited.
    pub title: String,
    pub platform: Platform,
    pub failed_at: DateTime<Utc>,
    pub error: String,
    pub attempts: u32,
}

impl FailureAlert {
    /// Build an alert from an exhausted item, using its stored error and
    /// failure stamp so re-asserting is idempotent.
    pub fn from_item(item: &ContentItem, now: DateTime<Utc>) -> Self {
        Self {
            card_id: item.id,
            tenant_id: item.tenant_id,
            title: item.title.clone(),
            platform: item.platform,
            failed_at: item.failed_at.unwrap_or(now),
            error: item
                .last_error
                .clone()
                .unwrap_or_else(|| "delivery failed".to_string()),
            attempts: item.attempts,
        }
    }
}

//! Namespace key builders.
//!
//! All operational state lives under a handful of string namespaces; building
//! keys in one place keeps the formats greppable and the purge prefixes in
//! sync with the writers.

use chrono::NaiveDate;

use postforge_core::{ContentItemId, TenantId};

/// `autopublish_alerts:{tenant}` → `Vec<FailureAlert>`
pub const ALERTS_PREFIX: &str = "autopublish_alerts:";
/// `sla_config:{tenant}` → `SlaConfig`
pub const SLA_CONFIG_PREFIX: &str = "sla_config:";
/// `sla_esc:{date}:{tenant}:{item}` → escalation dedup marker
pub const ESCALATION_PREFIX: &str = "sla_esc:";
/// `security_audit_log:{date}` → `Vec<AuditEntry>`
pub const AUDIT_LOG_PREFIX: &str = "security_audit_log:";
/// `publish_history:{tenant}:{YYYY-MM}` → `Vec<PublishRecorded>`
pub const PUBLISH_HISTORY_PREFIX: &str = "publish_history:";
/// `notification_log:{date}` → sent-notification entries
pub const NOTIFICATION_LOG_PREFIX: &str = "notification_log:";
/// `usage_metrics:{YYYY-MM}` → aggregated usage blob
pub const USAGE_METRICS_PREFIX: &str = "usage_metrics:";

/// `data_retention_policy` → `RetentionPolicy` (global singleton)
pub const RETENTION_POLICY: &str = "data_retention_policy";
/// `audit_integrity_last_check` → last `AuditIntegrityResult`
pub const INTEGRITY_LAST_CHECK: &str = "audit_integrity_last_check";
/// `compliance_alert_recipients` → `Vec<Recipient>`
pub const COMPLIANCE_RECIPIENTS: &str = "compliance_alert_recipients";

pub fn alerts(tenant_id: TenantId) -> String {
    format!("{ALERTS_PREFIX}{tenant_id}")
}

pub fn sla_config(tenant_id: TenantId) -> String {
    format!("{SLA_CONFIG_PREFIX}{tenant_id}")
}

pub fn escalation_marker(date: NaiveDate, tenant_id: TenantId, item_id: ContentItemId) -> String {
    format!("{ESCALATION_PREFIX}{}:{tenant_id}:{item_id}", date.format("%Y-%m-%d"))
}

pub fn audit_log(date: NaiveDate) -> String {
    format!("{AUDIT_LOG_PREFIX}{}", date.format("%Y-%m-%d"))
}

pub fn publish_history(tenant_id: TenantId, month: &str) -> String {
    format!("{PUBLISH_HISTORY_PREFIX}{tenant_id}:{month}")
}

pub fn notification_log(date: NaiveDate) -> String {
    format!("{NOTIFICATION_LOG_PREFIX}{}", date.format("%Y-%m-%d"))
}

pub fn usage_metrics(month: &str) -> String {
    format!("{USAGE_METRICS_PREFIX}{month}")
}

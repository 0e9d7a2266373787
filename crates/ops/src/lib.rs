//! `postforge-ops` — operational housekeeping: the security audit log,
//! integrity checking over its day buckets, compliance recipients, and the
//! retention purge.

pub mod audit;
pub mod integrity;
pub mod recipients;
pub mod retention;

pub use audit::{AuditEntry, AuditLog};
pub use integrity::{
    AuditIntegrityChecker, AuditIntegrityResult, IntegrityError, IntegrityHealth,
    IntegrityTrigger, ManualCheckOutcome, CHECK_INTERVAL,
};
pub use recipients::RecipientStore;
pub use retention::{
    RetentionPolicy, RetentionPolicyStore, RetentionPurge, PURGE_INTERVAL,
};

//! `postforge-alerts` — failure alerts, SLA config, escalation, and the
//! daily failure digest.
//!
//! State lives in the key-value store under per-tenant keys; every
//! read-modify-write goes through versioned conditional writes so concurrent
//! mutations converge.

pub mod alert;
pub mod digest;
pub mod escalation;
pub mod sla;
pub mod store;

pub use alert::FailureAlert;
pub use digest::{
    AdminDirectory, DigestOutcome, FailureDigest, StaticAdminDirectory, DIGEST_INTERVAL,
};
pub use escalation::{EscalationEngine, EscalationError, EscalationMarker, EscalationSummary};
pub use sla::{SlaConfig, SlaConfigStore};
pub use store::{AlertError, AlertStore};

//! `postforge-events` — operational event bus and event types.
//!
//! Periodic components emit advisory summary events here; consumers
//! (dashboards, log shippers) subscribe and must be idempotent.

pub mod bus;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use event::{IntegritySummary, NamespacePurgeCount, OpsEvent, PublishRecorded, PurgeSummary};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};

//! `postforge-content` — content items, delivery state, and the stores the
//! delivery subsystem reads them from.

pub mod connection;
pub mod item;
pub mod store;

pub use connection::{ConnectionError, ConnectionResolver, PlatformConnection, StaticConnections};
pub use item::{ContentItem, ContentStatus, DeliveryState, MAX_ATTEMPTS};
pub use store::{ContentStore, ContentStoreError, InMemoryContentStore};

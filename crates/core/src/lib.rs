//! `postforge-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod platform;

pub use error::{DomainError, DomainResult};
pub use id::{ContentItemId, TenantId, UserId};
pub use platform::Platform;

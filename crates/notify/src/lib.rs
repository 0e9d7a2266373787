//! `postforge-notify` — operator notification seam.
//!
//! The real transport (SMTP, chat webhook) lives outside this subsystem; the
//! trait here covers what the escalation engine, failure digest, and
//! integrity checker need, including the "no transport configured" case.

pub mod notifier;

pub use notifier::{
    NotifyError, NotifyMessage, Notifier, Recipient, RecordingNotifier, UnconfiguredNotifier,
};

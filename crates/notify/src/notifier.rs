//! Notifier trait and test doubles.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use postforge_core::{DomainError, DomainResult};

/// A notification recipient (operator or tenant admin).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: String,
    pub name: Option<String>,
}

impl Recipient {
    /// Validate and build a recipient. Rejects empty or obviously malformed
    /// addresses synchronously, before any send is attempted.
    pub fn new(email: impl Into<String>) -> DomainResult<Self> {
        let email = email.into();
        let trimmed = email.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("recipient email is required"));
        }
        if !trimmed.contains('@') {
            return Err(DomainError::validation(format!(
                "recipient email is malformed: {trimmed}"
            )));
        }
        Ok(Self {
            email: trimmed.to_string(),
            name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// A templated message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyMessage {
    pub subject: String,
    pub body: String,
}

impl NotifyMessage {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
        }
    }
}

/// Notification error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NotifyError {
    /// No delivery transport is configured for this deployment.
    #[error("no notification transport configured")]
    NotConfigured,
    /// The transport accepted the message but delivery failed.
    #[error("send failed to {recipient}: {reason}")]
    Send { recipient: String, reason: String },
}

/// Sends a templated message to one recipient.
///
/// Sends are best-effort: callers treat each recipient independently and
/// never let one failure abort a batch.
pub trait Notifier: Send + Sync {
    /// Whether a transport is configured at all. When false, callers
    /// suppress sends (and may still write dedup markers) instead of
    /// accumulating doomed retries.
    fn is_configured(&self) -> bool;

    fn send(&self, message: &NotifyMessage, recipient: &Recipient) -> Result<(), NotifyError>;
}

impl<N> Notifier for Arc<N>
where
    N: Notifier + ?Sized,
{
    fn is_configured(&self) -> bool {
        (**self).is_configured()
    }

    fn send(&self, message: &NotifyMessage, recipient: &Recipient) -> Result<(), NotifyError> {
        (**self).send(message, recipient)
    }
}

/// Test notifier that records every send and can fail selected recipients.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(Recipient, NotifyMessage)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends to `email` fail from now on.
    pub fn fail_for(&self, email: impl Into<String>) {
        if let Ok(mut f) = self.failing.lock() {
            f.insert(email.into());
        }
    }

    pub fn sent(&self) -> Vec<(Recipient, NotifyMessage)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().map(|s| s.len()).unwrap_or(0)
    }
}

impl Notifier for RecordingNotifier {
    fn is_configured(&self) -> bool {
        true
    }

    fn send(&self, message: &NotifyMessage, recipient: &Recipient) -> Result<(), NotifyError> {
        let failing = self
            .failing
            .lock()
            .map(|f| f.contains(&recipient.email))
            .unwrap_or(false);
        if failing {
            return Err(NotifyError::Send {
                recipient: recipient.email.clone(),
                reason: "injected failure".to_string(),
            });
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((recipient.clone(), message.clone()));
        }
        Ok(())
    }
}

/// Notifier standing in for a deployment with no transport configured.
#[derive(Debug, Default)]
pub struct UnconfiguredNotifier;

impl Notifier for UnconfiguredNotifier {
    fn is_configured(&self) -> bool {
        false
    }

    fn send(&self, _message: &NotifyMessage, _recipient: &Recipient) -> Result<(), NotifyError> {
        Err(NotifyError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_validation() {
        assert!(Recipient::new("ops@example.com").is_ok());
        assert!(Recipient::new("   ").is_err());
        assert!(Recipient::new("not-an-address").is_err());
    }

    #[test]
    fn recording_notifier_records_and_fails_on_demand() {
        let n = RecordingNotifier::new();
        let msg = NotifyMessage::new("s", "b");
        let ok = Recipient::new("a@example.com").unwrap();
        let bad = Recipient::new("b@example.com").unwrap();
        n.fail_for("b@example.com");

        assert!(n.send(&msg, &ok).is_ok());
        assert!(n.send(&msg, &bad).is_err());
        assert_eq!(n.sent_count(), 1);
    }
}

//! Channel publisher seam: one trait over the external delivery APIs.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use postforge_content::{ContentItem, PlatformConnection};
use postforge_core::ContentItemId;

/// Reference handed back by a delivery channel on success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishReceipt {
    /// Channel-side identifier of the published post (id or URL).
    pub reference: String,
}

/// Delivery failure reported by a channel.
///
/// Causes are not distinguished for retry purposes: every failure costs one
/// attempt from the budget.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    #[error("channel rejected the post: {0}")]
    Rejected(String),
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

/// Attempts delivery of one item over one platform connection.
pub trait ChannelPublisher: Send + Sync {
    fn publish(
        &self,
        connection: &PlatformConnection,
        item: &ContentItem,
    ) -> Result<PublishReceipt, PublishError>;
}

impl<P> ChannelPublisher for Arc<P>
where
    P: ChannelPublisher + ?Sized,
{
    fn publish(
        &self,
        connection: &PlatformConnection,
        item: &ContentItem,
    ) -> Result<PublishReceipt, PublishError> {
        (**self).publish(connection, item)
    }
}

/// Test publisher: succeeds by default, with per-item scripted failures.
#[derive(Debug, Default)]
pub struct ScriptedPublisher {
    scripted_failures: Mutex<HashMap<ContentItemId, VecDeque<PublishError>>>,
    published: Mutex<Vec<(ContentItemId, String)>>,
}

impl ScriptedPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `count` failures for `item` before it succeeds.
    pub fn fail_next(&self, item: ContentItemId, count: usize, error: PublishError) {
        if let Ok(mut script) = self.scripted_failures.lock() {
            let queue = script.entry(item).or_default();
            for _ in 0..count {
                queue.push_back(error.clone());
            }
        }
    }

    pub fn published(&self) -> Vec<(ContentItemId, String)> {
        self.published.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn publish_count(&self) -> usize {
        self.published.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl ChannelPublisher for ScriptedPublisher {
    fn publish(
        &self,
        connection: &PlatformConnection,
        item: &ContentItem,
    ) -> Result<PublishReceipt, PublishError> {
        if let Ok(mut script) = self.scripted_failures.lock() {
            if let Some(queue) = script.get_mut(&item.id) {
                if let Some(err) = queue.pop_front() {
                    return Err(err);
                }
            }
        }
        let reference = format!("{}:{}", connection.platform, item.id);
        if let Ok(mut published) = self.published.lock() {
            published.push((item.id, reference.clone()));
        }
        Ok(PublishReceipt { reference })
    }
}

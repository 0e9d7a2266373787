//! Content item storage abstraction.
//!
//! The relational store holding content rows is an external collaborator;
//! this trait covers exactly what the delivery subsystem needs from it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use postforge_core::{ContentItemId, TenantId};

use crate::item::ContentItem;

/// Content store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ContentStoreError {
    #[error("content item not found: {0}")]
    NotFound(ContentItemId),
    #[error("tenant isolation violation")]
    TenantIsolation,
    #[error("storage error: {0}")]
    Storage(String),
}

/// Read/write access to content items, scoped to delivery concerns.
pub trait ContentStore: Send + Sync {
    fn get(
        &self,
        tenant_id: TenantId,
        id: ContentItemId,
    ) -> Result<Option<ContentItem>, ContentStoreError>;

    /// Insert or replace an item (editorial workflow writes arrive here).
    fn upsert(&self, item: ContentItem) -> Result<(), ContentStoreError>;

    /// Persist pipeline mutations of an existing item.
    fn update(&self, item: &ContentItem) -> Result<(), ContentStoreError>;

    /// Items with status `scheduled` and `scheduled_at <= now`, oldest
    /// first, capped at `limit` to bound worst-case tick duration.
    fn due_items(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ContentItem>, ContentStoreError>;

    /// Reset an item's retry metadata (human requeue). Returns the updated
    /// item.
    fn reset_retries(
        &self,
        tenant_id: TenantId,
        id: ContentItemId,
        now: DateTime<Utc>,
    ) -> Result<ContentItem, ContentStoreError>;
}

impl<S> ContentStore for Arc<S>
where
    S: ContentStore + ?Sized,
{
    fn get(
        &self,
        tenant_id: TenantId,
        id: ContentItemId,
    ) -> Result<Option<ContentItem>, ContentStoreError> {
        (**self).get(tenant_id, id)
    }

    fn upsert(&self, item: ContentItem) -> Result<(), ContentStoreError> {
        (**self).upsert(item)
    }

    fn update(&self, item: &ContentItem) -> Result<(), ContentStoreError> {
        (**self).update(item)
    }

    fn due_items(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ContentItem>, ContentStoreError> {
        (**self).due_items(now, limit)
    }

    fn reset_retries(
        &self,
        tenant_id: TenantId,
        id: ContentItemId,
        now: DateTime<Utc>,
    ) -> Result<ContentItem, ContentStoreError> {
        (**self).reset_retries(tenant_id, id, now)
    }
}

/// In-memory content store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryContentStore {
    items: RwLock<HashMap<ContentItemId, ContentItem>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

fn poisoned() -> ContentStoreError {
    ContentStoreError::Storage("content lock poisoned".to_string())
}

impl ContentStore for InMemoryContentStore {
    fn get(
        &self,
        tenant_id: TenantId,
        id: ContentItemId,
    ) -> Result<Option<ContentItem>, ContentStoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        match items.get(&id) {
            Some(item) if item.tenant_id != tenant_id => Err(ContentStoreError::TenantIsolation),
            Some(item) => Ok(Some(item.clone())),
            None => Ok(None),
        }
    }

    fn upsert(&self, item: ContentItem) -> Result<(), ContentStoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        items.insert(item.id, item);
        Ok(())
    }

    fn update(&self, item: &ContentItem) -> Result<(), ContentStoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        if !items.contains_key(&item.id) {
            return Err(ContentStoreError::NotFound(item.id));
        }
        items.insert(item.id, item.clone());
        Ok(())
    }

    fn due_items(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ContentItem>, ContentStoreError> {
        let items = self.items.read().map_err(|_| poisoned())?;
        let mut due: Vec<ContentItem> = items
            .values()
            .filter(|i| i.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|i| i.scheduled_at);
        due.truncate(limit);
        Ok(due)
    }

    fn reset_retries(
        &self,
        tenant_id: TenantId,
        id: ContentItemId,
        now: DateTime<Utc>,
    ) -> Result<ContentItem, ContentStoreError> {
        let mut items = self.items.write().map_err(|_| poisoned())?;
        let item = items.get_mut(&id).ok_or(ContentStoreError::NotFound(id))?;
        if item.tenant_id != tenant_id {
            return Err(ContentStoreError::TenantIsolation);
        }
        item.reset_retries(now);
        Ok(item.clone())
    }
}

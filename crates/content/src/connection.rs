//! Platform connections (delivery credentials, resolved fresh per tick).

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use postforge_core::{Platform, TenantId};

/// A tenant's connected account on one delivery platform.
///
/// `credential_ref` is an opaque handle into the credential service;
/// encryption-at-rest is that service's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformConnection {
    pub tenant_id: TenantId,
    pub platform: Platform,
    pub handle: String,
    pub credential_ref: String,
}

/// Connection resolution error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection lookup failed: {0}")]
    Lookup(String),
}

/// Resolves a tenant's live platform connections.
pub trait ConnectionResolver: Send + Sync {
    fn connections(&self, tenant_id: TenantId) -> Result<Vec<PlatformConnection>, ConnectionError>;

    /// The tenant's connection for one platform, if any.
    fn for_platform(
        &self,
        tenant_id: TenantId,
        platform: Platform,
    ) -> Result<Option<PlatformConnection>, ConnectionError> {
        Ok(self
            .connections(tenant_id)?
            .into_iter()
            .find(|c| c.platform == platform))
    }
}

impl<R> ConnectionResolver for Arc<R>
where
    R: ConnectionResolver + ?Sized,
{
    fn connections(&self, tenant_id: TenantId) -> Result<Vec<PlatformConnection>, ConnectionError> {
        (**self).connections(tenant_id)
    }
}

/// In-memory resolver for tests/dev.
#[derive(Debug, Default)]
pub struct StaticConnections {
    by_tenant: RwLock<HashMap<TenantId, Vec<PlatformConnection>>>,
}

impl StaticConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, tenant_id: TenantId, platform: Platform, handle: impl Into<String>) {
        let conn = PlatformConnection {
            tenant_id,
            platform,
            handle: handle.into(),
            credential_ref: format!("cred-{platform}"),
        };
        if let Ok(mut map) = self.by_tenant.write() {
            map.entry(tenant_id).or_default().push(conn);
        }
    }
}

impl ConnectionResolver for StaticConnections {
    fn connections(&self, tenant_id: TenantId) -> Result<Vec<PlatformConnection>, ConnectionError> {
        let map = self
            .by_tenant
            .read()
            .map_err(|_| ConnectionError::Lookup("connections lock poisoned".to_string()))?;
        Ok(map.get(&tenant_id).cloned().unwrap_or_default())
    }
}

//! Compliance alert recipients (global operator list).

use tracing::warn;

use postforge_core::DomainResult;
use postforge_kv::{keys, KvError, KvStore, KvStoreExt};
use postforge_notify::Recipient;

/// Storage for `compliance_alert_recipients`.
pub struct RecipientStore<K> {
    kv: K,
}

impl<K: KvStore> RecipientStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// The configured recipients; absent or undecodable reads as empty.
    pub fn get(&self) -> Result<Vec<Recipient>, KvError> {
        match self.kv.get_typed::<Vec<Recipient>>(keys::COMPLIANCE_RECIPIENTS) {
            Ok(Some((recipients, _))) => Ok(recipients),
            Ok(None) => Ok(Vec::new()),
            Err(KvError::Codec { .. }) => {
                warn!("undecodable compliance recipient list, treating as empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Validate and persist a recipient list. Rejection happens before any
    /// write, so a list with one bad address leaves the stored list intact.
    pub fn set(&self, emails: &[String]) -> DomainResult<Vec<Recipient>> {
        let recipients = emails
            .iter()
            .map(|e| Recipient::new(e.clone()))
            .collect::<DomainResult<Vec<_>>>()?;
        self.kv
            .set_typed(keys::COMPLIANCE_RECIPIENTS, &recipients)
            .map_err(|e| postforge_core::DomainError::conflict(e.to_string()))?;
        Ok(recipients)
    }
}

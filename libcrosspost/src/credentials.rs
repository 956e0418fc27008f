//! Token storage for platform credentials
//!
//! `TokenStore` is the interface the adapters and the HTTP layer use to read
//! and write OAuth credentials. Two backends are provided:
//!
//! - [`crate::db::Database`]: SQLite, the production store
//! - [`MemoryTokenStore`]: in-process, for tests and embedding
//!
//! # Example
//!
//! ```no_run
//! use libcrosspost::credentials::{MemoryTokenStore, TokenStore};
//! use libcrosspost::types::{Credential, CredentialLookup, Secrets};
//!
//! # async fn example() -> libcrosspost::Result<()> {
//! let store = MemoryTokenStore::new();
//! store
//!     .upsert(&Credential::new("user-1", "twitter", "12345", Secrets::bearer("token")))
//!     .await?;
//!
//! let found = store
//!     .find("twitter", &CredentialLookup::UserId("user-1".to_string()))
//!     .await?;
//! assert!(found.is_some());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::Result;
use crate::types::{Credential, CredentialLookup, Identity};

/// Persistent credential storage
///
/// Every lookup only considers active records and returns the most recently
/// updated match. "Not found" is `Ok(None)`, never an error.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Find the active credential for `platform` matching `lookup`
    async fn find(&self, platform: &str, lookup: &CredentialLookup) -> Result<Option<Credential>>;

    /// Insert or replace the credential for (`user_id`, `platform`)
    ///
    /// The original `created_at` is kept when a record already exists.
    async fn upsert(&self, credential: &Credential) -> Result<()>;

    /// Record a looked-up display handle without touching the secrets.
    /// Returns whether a record changed.
    async fn update_handle(
        &self,
        user_id: &str,
        platform: &str,
        handle: &str,
        fetched_at: i64,
    ) -> Result<bool>;

    /// Flag the credential inactive. Returns whether a record changed.
    async fn deactivate(&self, user_id: &str, platform: &str) -> Result<bool>;

    /// Remove the credential. Returns whether a record existed.
    async fn delete(&self, user_id: &str, platform: &str) -> Result<bool>;

    /// Walk the identity's lookups in precedence order
    async fn find_for(&self, platform: &str, identity: &Identity) -> Result<Option<Credential>> {
        for lookup in identity.lookups() {
            if let Some(credential) = self.find(platform, &lookup).await? {
                return Ok(Some(credential));
            }
        }
        Ok(None)
    }
}

fn matches(credential: &Credential, platform: &str, lookup: &CredentialLookup) -> bool {
    if credential.platform != platform || !credential.is_active {
        return false;
    }
    match lookup {
        CredentialLookup::PlatformUserId(id) => &credential.platform_user_id == id,
        CredentialLookup::UserId(id) => &credential.user_id == id,
        CredentialLookup::Email(email) => credential.email.as_ref() == Some(email),
    }
}

/// In-memory token store keyed by (user id, platform)
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    records: DashMap<(String, String), Credential>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, active or not
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Fetch a record regardless of its active flag
    pub fn get(&self, user_id: &str, platform: &str) -> Option<Credential> {
        self.records
            .get(&(user_id.to_string(), platform.to_string()))
            .map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn find(&self, platform: &str, lookup: &CredentialLookup) -> Result<Option<Credential>> {
        Ok(self
            .records
            .iter()
            .filter(|entry| matches(entry.value(), platform, lookup))
            .max_by_key(|entry| entry.value().updated_at)
            .map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, credential: &Credential) -> Result<()> {
        let key = (credential.user_id.clone(), credential.platform.clone());
        let mut record = credential.clone();
        if let Some(existing) = self.records.get(&key) {
            record.created_at = existing.created_at;
        }
        self.records.insert(key, record);
        Ok(())
    }

    async fn update_handle(
        &self,
        user_id: &str,
        platform: &str,
        handle: &str,
        fetched_at: i64,
    ) -> Result<bool> {
        let key = (user_id.to_string(), platform.to_string());
        match self.records.get_mut(&key) {
            Some(mut entry) => {
                entry.cached_handle = Some(handle.to_string());
                entry.cached_handle_updated_at = Some(fetched_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate(&self, user_id: &str, platform: &str) -> Result<bool> {
        let key = (user_id.to_string(), platform.to_string());
        match self.records.get_mut(&key) {
            Some(mut entry) if entry.is_active => {
                entry.is_active = false;
                entry.updated_at = chrono::Utc::now().timestamp();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, user_id: &str, platform: &str) -> Result<bool> {
        let key = (user_id.to_string(), platform.to_string());
        Ok(self.records.remove(&key).is_some())
    }
}

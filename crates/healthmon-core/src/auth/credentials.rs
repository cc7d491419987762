use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use keyring::Entry;

use super::error::StoreError;

const SERVICE_NAME: &str = "healthmon";

/// Fixed keys under which the session is persisted.
pub mod keys {
    pub const AUTH_TOKEN: &str = "mdh_auth_token";
    pub const REFRESH_TOKEN: &str = "mdh_refresh_token";
    pub const PARTICIPANT_ID: &str = "mdh_participant_id";
    pub const TOKEN_EXPIRES_AT: &str = "mdh_token_expires_at";
    /// Transient: only present while an authorization round trip is in flight.
    pub const OAUTH_STATE: &str = "mdh_oauth_state";
    /// Stable device identity for the participant-token strategy.
    pub const USER_IDENTIFIER: &str = "user_identifier";

    /// Every key that `sign_out` removes.
    pub const SESSION_KEYS: [&str; 5] = [
        AUTH_TOKEN,
        REFRESH_TOKEN,
        PARTICIPANT_ID,
        TOKEN_EXPIRES_AT,
        OAUTH_STATE,
    ];
}

/// Durable, confidentiality-protected key-value storage for session secrets.
///
/// `get` returns `Ok(None)` for a missing key and `delete` of a missing key
/// succeeds, so callers never have to special-case first runs.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Secrets kept in the OS keychain.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a distinct keychain service, e.g. one per project.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry, StoreError> {
        Ok(Entry::new(&self.service, key)?)
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entry(key)?.set_password(value)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populated store, handy for restoring a known session.
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: Mutex::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }

    /// Synchronous peek for assertions and diagnostics.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_get_set_delete() {
        let store = MemoryStore::new();
        assert_eq!(store.get(keys::AUTH_TOKEN).await.unwrap(), None);

        store.set(keys::AUTH_TOKEN, "AT1").await.unwrap();
        assert_eq!(
            store.get(keys::AUTH_TOKEN).await.unwrap().as_deref(),
            Some("AT1")
        );

        store.delete(keys::AUTH_TOKEN).await.unwrap();
        store.delete(keys::AUTH_TOKEN).await.unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn test_session_keys_exclude_device_identity() {
        assert!(!keys::SESSION_KEYS.contains(&keys::USER_IDENTIFIER));
        assert!(keys::SESSION_KEYS.contains(&keys::OAUTH_STATE));
    }
}

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("secure store failure: {0}")]
    Backend(String),
}

/// Capability interface over the OS credential store.
///
/// Keys follow the `"<kind>_<account_id>"` convention (see
/// [`crate::core::models::account::secret_key`]). One process-wide instance
/// is constructed at startup and shared by reference; tests substitute
/// [`MemoryStore`].
pub trait SecureStore: Send + Sync {
    fn save(&self, key: &str, secret: &str) -> Result<(), StoreError>;
    /// Returns `Ok(None)` when no entry exists for the key.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// OS-keyring-backed store. All entries share one service name so they are
/// grouped together in the platform's credential manager.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Self {
        Self {
            service: "quotabar".to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, StoreError> {
        keyring::Entry::new(&self.service, key).map_err(|e| StoreError::Backend(e.to_string()))
    }
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecureStore for KeyringStore {
    fn save(&self, key: &str, secret: &str) -> Result<(), StoreError> {
        self.entry(key)?
            .set_password(secret)
            .map_err(|e| StoreError::Backend(e.to_string()))
    }

    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        match self.entry(key)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }
}

/// In-memory store used by tests in place of the real keyring.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
impl SecureStore for MemoryStore {
    fn save(&self, key: &str, secret: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), secret.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.load("claude_a1").unwrap(), None);

        store.save("claude_a1", "sessionKey=sk-test").unwrap();
        assert_eq!(
            store.load("claude_a1").unwrap().as_deref(),
            Some("sessionKey=sk-test")
        );

        store.delete("claude_a1").unwrap();
        assert_eq!(store.load("claude_a1").unwrap(), None);
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::new();
        store.save("glm_a2", "old").unwrap();
        store.save("glm_a2", "new").unwrap();
        assert_eq!(store.load("glm_a2").unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn memory_store_delete_missing_is_ok() {
        let store = MemoryStore::new();
        assert!(store.delete("never_saved").is_ok());
    }
}

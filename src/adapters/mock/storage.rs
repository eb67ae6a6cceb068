//! In-memory storage for testing.
//!
//! Provides a [`SecureStorage`] that keeps values in memory, suitable for
//! testing without file system access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::traits::{CredentialsError, SecureStorage, StorageKey};

/// In-memory storage for testing.
///
/// Clones share the same underlying map, so a test can keep a handle and
/// inspect what the code under test wrote.
///
/// # Example
///
/// ```ignore
/// use pocketbank::adapters::mock::InMemoryStorage;
/// use pocketbank::traits::{SecureStorage, StorageKey};
///
/// let storage = InMemoryStorage::new();
/// storage.store(StorageKey::DeviceId, Some("dev-1".into())).await?;
/// assert_eq!(storage.value(StorageKey::DeviceId).as_deref(), Some("dev-1"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryStorage {
    values: Arc<Mutex<HashMap<StorageKey, String>>>,
    save_should_fail: Arc<Mutex<bool>>,
    load_should_fail: Arc<Mutex<bool>>,
    batches: Arc<Mutex<usize>>,
}

impl InMemoryStorage {
    /// Create a new empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure whether writes should fail.
    pub fn set_save_should_fail(&self, should_fail: bool) {
        *self.save_should_fail.lock().unwrap() = should_fail;
    }

    /// Configure whether reads should fail.
    pub fn set_load_should_fail(&self, should_fail: bool) {
        *self.load_should_fail.lock().unwrap() = should_fail;
    }

    /// Get a value synchronously (for testing).
    pub fn value(&self, key: StorageKey) -> Option<String> {
        self.values.lock().unwrap().get(&key).cloned()
    }

    /// Set a value synchronously (for testing).
    pub fn set_value(&self, key: StorageKey, value: Option<&str>) {
        let mut values = self.values.lock().unwrap();
        match value {
            Some(v) => {
                values.insert(key, v.to_string());
            }
            None => {
                values.remove(&key);
            }
        }
    }

    /// Number of successful batch writes.
    pub fn batch_count(&self) -> usize {
        *self.batches.lock().unwrap()
    }
}

#[async_trait]
impl SecureStorage for InMemoryStorage {
    async fn load(&self, key: StorageKey) -> Result<Option<String>, CredentialsError> {
        if *self.load_should_fail.lock().unwrap() {
            return Err(CredentialsError::LoadFailed("Mock load failure".to_string()));
        }
        Ok(self.value(key))
    }

    async fn store_batch(
        &self,
        entries: &[(StorageKey, Option<String>)],
    ) -> Result<(), CredentialsError> {
        if *self.save_should_fail.lock().unwrap() {
            return Err(CredentialsError::SaveFailed("Mock save failure".to_string()));
        }
        let mut values = self.values.lock().unwrap();
        for (key, value) in entries {
            match value {
                Some(v) => {
                    values.insert(*key, v.clone());
                }
                None => {
                    values.remove(key);
                }
            }
        }
        *self.batches.lock().unwrap() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_and_load() {
        let storage = InMemoryStorage::new();
        assert!(storage.load(StorageKey::AccessToken).await.unwrap().is_none());

        storage
            .store(StorageKey::AccessToken, Some("tok".to_string()))
            .await
            .unwrap();
        assert_eq!(
            storage.load(StorageKey::AccessToken).await.unwrap().as_deref(),
            Some("tok")
        );

        storage.store(StorageKey::AccessToken, None).await.unwrap();
        assert!(storage.load(StorageKey::AccessToken).await.unwrap().is_none());
        assert_eq!(storage.batch_count(), 2);
    }

    #[tokio::test]
    async fn test_failures() {
        let storage = InMemoryStorage::new();
        storage.set_save_should_fail(true);
        assert!(storage
            .store(StorageKey::DeviceId, Some("x".to_string()))
            .await
            .is_err());
        assert!(storage.value(StorageKey::DeviceId).is_none());

        storage.set_load_should_fail(true);
        assert!(matches!(
            storage.load(StorageKey::DeviceId).await,
            Err(CredentialsError::LoadFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let storage = InMemoryStorage::new();
        let clone = storage.clone();
        clone.set_value(StorageKey::RememberedPhone, Some("+1555"));
        assert_eq!(
            storage.value(StorageKey::RememberedPhone).as_deref(),
            Some("+1555")
        );
    }
}

//! Secure storage trait abstraction.
//!
//! Provides a trait-based abstraction for the durable key/value storage that
//! backs session credentials, the device identity and a few user
//! preferences, enabling dependency injection and mocking in tests.

use async_trait::async_trait;

/// Keys persisted by the client. Each key is independent; values are
/// primitive scalars or opaque strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
    AccessToken,
    RefreshToken,
    DeviceId,
    RememberedPhone,
    OnboardingComplete,
    BiometricEnabled,
}

impl StorageKey {
    /// Name used by persistent backends.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKey::AccessToken => "access_token",
            StorageKey::RefreshToken => "refresh_token",
            StorageKey::DeviceId => "device_id",
            StorageKey::RememberedPhone => "remembered_phone",
            StorageKey::OnboardingComplete => "onboarding_complete",
            StorageKey::BiometricEnabled => "biometric_enabled",
        }
    }
}

/// Storage operation errors.
#[derive(Debug, Clone)]
pub enum CredentialsError {
    /// Failed to load a value
    LoadFailed(String),
    /// Failed to save a value
    SaveFailed(String),
    /// IO error
    Io(String),
    /// Encryption or decryption failed
    Crypto(String),
    /// Serialization/deserialization error
    Serialization(String),
}

impl std::fmt::Display for CredentialsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialsError::LoadFailed(msg) => write!(f, "Failed to load credentials: {}", msg),
            CredentialsError::SaveFailed(msg) => write!(f, "Failed to save credentials: {}", msg),
            CredentialsError::Io(msg) => write!(f, "IO error: {}", msg),
            CredentialsError::Crypto(msg) => write!(f, "Crypto error: {}", msg),
            CredentialsError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for CredentialsError {}

/// Trait for durable key/value storage.
///
/// Writes are last-writer-wins. A batch passed to [`store_batch`] must be
/// applied atomically: after it returns, either every entry is visible or
/// none is.
///
/// [`store_batch`]: SecureStorage::store_batch
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Load a value. `Ok(None)` when the key was never written or was removed.
    async fn load(&self, key: StorageKey) -> Result<Option<String>, CredentialsError>;

    /// Apply a batch of writes. `None` removes the key.
    async fn store_batch(
        &self,
        entries: &[(StorageKey, Option<String>)],
    ) -> Result<(), CredentialsError>;

    /// Write a single value.
    async fn store(&self, key: StorageKey, value: Option<String>) -> Result<(), CredentialsError> {
        self.store_batch(&[(key, value)]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_error_display() {
        assert_eq!(
            CredentialsError::LoadFailed("read error".to_string()).to_string(),
            "Failed to load credentials: read error"
        );
        assert_eq!(
            CredentialsError::SaveFailed("write error".to_string()).to_string(),
            "Failed to save credentials: write error"
        );
        assert_eq!(
            CredentialsError::Crypto("bad tag".to_string()).to_string(),
            "Crypto error: bad tag"
        );
    }

    #[test]
    fn test_storage_key_names_are_distinct() {
        let keys = [
            StorageKey::AccessToken,
            StorageKey::RefreshToken,
            StorageKey::DeviceId,
            StorageKey::RememberedPhone,
            StorageKey::OnboardingComplete,
            StorageKey::BiometricEnabled,
        ];
        let names: std::collections::HashSet<_> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(names.len(), keys.len());
    }
}

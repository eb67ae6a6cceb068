//! Credential storage for the session.
//!
//! [`CredentialStore`] sits on top of a [`SecureStorage`] backend and owns the
//! credential pair, the per-install device id and the small set of user
//! preferences the client persists. Read failures degrade to "absent" so a
//! broken store looks like a signed-out user instead of a fatal error.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::traits::{CredentialsError, SecureStorage, StorageKey};

/// Session credential pair. Both tokens are always written and cleared together.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Credentials {
    #[serde(alias = "access_token", rename = "accessToken")]
    pub access_token: String,
    #[serde(alias = "refresh_token", rename = "refreshToken")]
    pub refresh_token: String,
}

impl Credentials {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Which token to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    Access,
    Refresh,
}

impl CredentialKind {
    fn storage_key(self) -> StorageKey {
        match self {
            CredentialKind::Access => StorageKey::AccessToken,
            CredentialKind::Refresh => StorageKey::RefreshToken,
        }
    }
}

/// Credential and preference storage shared by every request path.
#[derive(Clone)]
pub struct CredentialStore {
    storage: Arc<dyn SecureStorage>,
    device_id: Arc<OnceCell<String>>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("device_id", &self.device_id.get())
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn SecureStorage>) -> Self {
        Self {
            storage,
            device_id: Arc::new(OnceCell::new()),
        }
    }

    /// Persist both tokens in one atomic write.
    pub async fn save(&self, credentials: &Credentials) -> Result<(), CredentialsError> {
        self.storage
            .store_batch(&[
                (
                    StorageKey::AccessToken,
                    Some(credentials.access_token.clone()),
                ),
                (
                    StorageKey::RefreshToken,
                    Some(credentials.refresh_token.clone()),
                ),
            ])
            .await?;
        debug!("Saved credential pair");
        Ok(())
    }

    /// Read one token. Storage failures read as absent.
    pub async fn get(&self, kind: CredentialKind) -> Option<String> {
        self.read(kind.storage_key()).await
    }

    /// Load the pair, present only when both tokens are stored.
    pub async fn load(&self) -> Option<Credentials> {
        let access = self.get(CredentialKind::Access).await?;
        let refresh = self.get(CredentialKind::Refresh).await?;
        Some(Credentials::new(access, refresh))
    }

    /// Remove both tokens. The device id and preferences are kept.
    pub async fn clear(&self) -> Result<(), CredentialsError> {
        self.storage
            .store_batch(&[
                (StorageKey::AccessToken, None),
                (StorageKey::RefreshToken, None),
            ])
            .await?;
        info!("Cleared stored credentials");
        Ok(())
    }

    /// Stable per-install identifier, generated on first use.
    pub async fn device_id(&self) -> String {
        self.device_id
            .get_or_init(|| async {
                if let Some(existing) = self.read(StorageKey::DeviceId).await {
                    return existing;
                }
                let generated = uuid::Uuid::new_v4().to_string();
                if let Err(e) = self
                    .storage
                    .store(StorageKey::DeviceId, Some(generated.clone()))
                    .await
                {
                    warn!("Failed to persist device id, using it for this process only: {}", e);
                } else {
                    info!(device_id = %generated, "Generated new device id");
                }
                generated
            })
            .await
            .clone()
    }

    pub async fn remembered_phone(&self) -> Option<String> {
        self.read(StorageKey::RememberedPhone).await
    }

    pub async fn set_remembered_phone(&self, phone: Option<&str>) -> Result<(), CredentialsError> {
        self.storage
            .store(StorageKey::RememberedPhone, phone.map(str::to_string))
            .await
    }

    pub async fn onboarding_complete(&self) -> bool {
        self.read_flag(StorageKey::OnboardingComplete).await
    }

    pub async fn set_onboarding_complete(&self, done: bool) -> Result<(), CredentialsError> {
        self.write_flag(StorageKey::OnboardingComplete, done).await
    }

    pub async fn biometric_enabled(&self) -> bool {
        self.read_flag(StorageKey::BiometricEnabled).await
    }

    pub async fn set_biometric_enabled(&self, enabled: bool) -> Result<(), CredentialsError> {
        self.write_flag(StorageKey::BiometricEnabled, enabled).await
    }

    async fn read(&self, key: StorageKey) -> Option<String> {
        match self.storage.load(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key = key.as_str(), "Storage read failed, treating as absent: {}", e);
                None
            }
        }
    }

    async fn read_flag(&self, key: StorageKey) -> bool {
        matches!(self.read(key).await.as_deref(), Some("true"))
    }

    async fn write_flag(&self, key: StorageKey, value: bool) -> Result<(), CredentialsError> {
        self.storage.store(key, Some(value.to_string())).await
    }
}

//! Encrypted file-based storage adapter.
//!
//! Values live in `~/.pocketbank/secure-store.json` as a flat JSON map of
//! sealed strings (see [`crate::auth::crypto`]). The AES key is kept in a
//! sibling key file created on first use with owner-only permissions.
//! Batches are written to a temporary file and renamed into place, so a
//! credential pair is never left half-written.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::auth::crypto::{self, KEY_LEN};
use crate::traits::{CredentialsError, SecureStorage, StorageKey};

/// The storage directory name under the home directory.
const STORAGE_DIR: &str = ".pocketbank";

/// The sealed values file name.
const STORE_FILE: &str = "secure-store.json";

/// The key file name.
const KEY_FILE: &str = ".storage.key";

/// File-backed [`SecureStorage`] with AES-256-GCM encrypted values.
#[derive(Debug)]
pub struct EncryptedFileStorage {
    dir: PathBuf,
    key: OnceCell<[u8; KEY_LEN]>,
    write_lock: Mutex<()>,
}

impl EncryptedFileStorage {
    /// Storage rooted at `dir`. Nothing is touched until first use.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            key: OnceCell::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Storage in `~/.pocketbank`.
    ///
    /// Returns `None` if the home directory cannot be determined.
    pub fn default_location() -> Option<Self> {
        let home = dirs::home_dir()?;
        Some(Self::new(home.join(STORAGE_DIR)))
    }

    /// Path to the sealed values file.
    pub fn store_path(&self) -> PathBuf {
        self.dir.join(STORE_FILE)
    }

    fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    async fn key(&self) -> Result<&[u8; KEY_LEN], CredentialsError> {
        self.key.get_or_try_init(|| self.load_or_create_key()).await
    }

    async fn load_or_create_key(&self) -> Result<[u8; KEY_LEN], CredentialsError> {
        let path = self.key_path();
        match tokio::fs::read_to_string(&path).await {
            Ok(encoded) => {
                let raw = STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| CredentialsError::Serialization(e.to_string()))?;
                raw.as_slice()
                    .try_into()
                    .map_err(|_| CredentialsError::Crypto("key file has wrong length".to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let key = crypto::generate_key()?;
                self.ensure_dir().await?;
                write_private(&path, STANDARD.encode(key).as_bytes()).await?;
                debug!(path = %path.display(), "Created storage key");
                Ok(key)
            }
            Err(e) => Err(CredentialsError::Io(e.to_string())),
        }
    }

    async fn ensure_dir(&self) -> Result<(), CredentialsError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| CredentialsError::Io(e.to_string()))
    }

    async fn read_document(&self) -> Result<HashMap<String, String>, CredentialsError> {
        match tokio::fs::read(self.store_path()).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| CredentialsError::Serialization(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(CredentialsError::Io(e.to_string())),
        }
    }
}

#[async_trait]
impl SecureStorage for EncryptedFileStorage {
    async fn load(&self, key: StorageKey) -> Result<Option<String>, CredentialsError> {
        let document = self.read_document().await?;
        let Some(sealed) = document.get(key.as_str()) else {
            return Ok(None);
        };
        let aes_key = self.key().await?;
        match crypto::open(sealed, aes_key) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = key.as_str(), "Stored value could not be decrypted: {}", e);
                Ok(None)
            }
        }
    }

    async fn store_batch(
        &self,
        entries: &[(StorageKey, Option<String>)],
    ) -> Result<(), CredentialsError> {
        let _guard = self.write_lock.lock().await;
        let aes_key = *self.key().await?;
        let mut document = self.read_document().await?;

        for (key, value) in entries {
            match value {
                Some(v) => {
                    document.insert(key.as_str().to_string(), crypto::seal(v, &aes_key)?);
                }
                None => {
                    document.remove(key.as_str());
                }
            }
        }

        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| CredentialsError::Serialization(e.to_string()))?;
        self.ensure_dir().await?;

        let tmp = self.dir.join(format!("{}.tmp", STORE_FILE));
        write_private(&tmp, &json)
            .await
            .map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;
        tokio::fs::rename(&tmp, self.store_path())
            .await
            .map_err(|e| CredentialsError::SaveFailed(e.to_string()))?;
        Ok(())
    }
}

/// Write a file readable only by the owner.
async fn write_private(path: &Path, contents: &[u8]) -> Result<(), CredentialsError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|e| CredentialsError::Io(e.to_string()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| CredentialsError::Io(e.to_string()))?;
    }
    Ok(())
}

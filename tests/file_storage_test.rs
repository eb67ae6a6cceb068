//! Encrypted file storage behind the credential store.

use std::sync::Arc;

use pocketbank::adapters::EncryptedFileStorage;
use pocketbank::auth::{CredentialKind, CredentialStore, Credentials};
use tempfile::TempDir;

fn store_in(dir: &TempDir) -> CredentialStore {
    CredentialStore::new(Arc::new(EncryptedFileStorage::new(dir.path())))
}

#[tokio::test]
async fn test_credentials_survive_restart() {
    let dir = TempDir::new().unwrap();
    let pair = Credentials::new("access-1", "refresh-1");

    store_in(&dir).save(&pair).await.unwrap();
    let reopened = store_in(&dir);

    assert_eq!(reopened.load().await, Some(pair));
    assert_eq!(
        reopened.get(CredentialKind::Refresh).await.as_deref(),
        Some("refresh-1")
    );
}

#[tokio::test]
async fn test_tokens_are_not_stored_in_plaintext() {
    let dir = TempDir::new().unwrap();
    let storage = EncryptedFileStorage::new(dir.path());
    let path = storage.store_path();
    let store = CredentialStore::new(Arc::new(storage));

    store
        .save(&Credentials::new("very-secret-access", "very-secret-refresh"))
        .await
        .unwrap();

    let raw = std::fs::read_to_string(path).unwrap();
    assert!(!raw.contains("very-secret-access"));
    assert!(!raw.contains("very-secret-refresh"));
}

#[tokio::test]
async fn test_clear_keeps_device_id_and_preferences() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let device_id = store.device_id().await;
    store.set_remembered_phone(Some("+15550100")).await.unwrap();
    store.set_biometric_enabled(true).await.unwrap();
    store.save(&Credentials::new("a", "r")).await.unwrap();

    store.clear().await.unwrap();
    let reopened = store_in(&dir);

    assert_eq!(reopened.load().await, None);
    assert_eq!(reopened.device_id().await, device_id);
    assert_eq!(reopened.remembered_phone().await.as_deref(), Some("+15550100"));
    assert!(reopened.biometric_enabled().await);
}

#[tokio::test]
async fn test_storage_is_shared_between_clones_of_the_store() {
    let dir = TempDir::new().unwrap();
    let store = store_in(&dir);
    let other = store.clone();

    store.save(&Credentials::new("a-2", "r-2")).await.unwrap();

    assert_eq!(
        other.get(CredentialKind::Access).await.as_deref(),
        Some("a-2")
    );
    assert!(!store.onboarding_complete().await);
}

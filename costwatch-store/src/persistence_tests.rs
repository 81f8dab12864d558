//! Persistence and settings file tests.

use std::path::PathBuf;
use tempfile::TempDir;

use crate::error::StoreError;
use crate::persistence::{ensure_dir, load_json, load_json_or_default, save_json};
use crate::settings_store::{LogLevel, Settings, SettingsStore, TenantConfig};

// ============================================================================
// JSON Persistence Tests
// ============================================================================

#[tokio::test]
async fn test_save_creates_parent_directories() {
    let temp_dir = TempDir::new().unwrap();
    let nested_path = temp_dir.path().join("deeply").join("nested").join("test.json");

    save_json(&nested_path, &serde_json::json!({"key": "value"}))
        .await
        .unwrap();

    assert!(nested_path.exists());
    assert!(!nested_path.with_extension("json.tmp").exists());
}

#[tokio::test]
async fn test_load_nonexistent_file() {
    let file_path = PathBuf::from("/nonexistent/path/settings.json");

    let result: Result<Settings, _> = load_json(&file_path).await;
    assert!(matches!(result, Err(StoreError::Io(_))));
}

#[tokio::test]
async fn test_load_or_default_on_corrupt_file() {
    let temp_dir = TempDir::new().unwrap();
    let file_path = temp_dir.path().join("settings.json");
    tokio::fs::write(&file_path, "{ broken").await.unwrap();

    let settings: Settings = load_json_or_default(&file_path).await;
    assert_eq!(settings, Settings::default());
}

#[tokio::test]
async fn test_ensure_dir_is_idempotent() {
    let temp_dir = TempDir::new().unwrap();
    let new_dir = temp_dir.path().join("data");

    ensure_dir(&new_dir).await.unwrap();
    ensure_dir(&new_dir).await.unwrap();
    assert!(new_dir.is_dir());
}

// ============================================================================
// Settings Store Tests
// ============================================================================

#[tokio::test]
async fn test_settings_save_and_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("costwatch").join("settings.json");

    let store = SettingsStore::new(path.clone());
    store
        .update(|s| {
            s.log_level = LogLevel::Debug;
            s.retry.max_attempts = 5;
            s.error_handling.escalation_threshold = 9;
        })
        .await;
    store
        .upsert_tenant(TenantConfig::new("acme", "https://billing.acme.test"))
        .await;
    store.save().await.unwrap();

    let reloaded = SettingsStore::load(path).await.unwrap();
    let settings = reloaded.get().await;
    assert_eq!(settings.log_level, LogLevel::Debug);
    assert_eq!(settings.retry.max_attempts, 5);
    assert_eq!(settings.error_handling.escalation_threshold, 9);
    assert_eq!(settings.tenant("acme").unwrap().gateway_url, "https://billing.acme.test");
}

#[tokio::test]
async fn test_settings_load_missing_file_uses_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let store = SettingsStore::load(temp_dir.path().join("absent.json"))
        .await
        .unwrap();
    assert_eq!(store.get().await, Settings::default());
}

#[tokio::test]
async fn test_settings_load_rejects_invalid_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    tokio::fs::write(&path, r#"{"retry": {"max_attempts": 0}}"#)
        .await
        .unwrap();

    assert!(matches!(
        SettingsStore::load(path).await,
        Err(StoreError::Config(_))
    ));
}

#[tokio::test]
async fn test_settings_save_refuses_invalid_values() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.json");
    let store = SettingsStore::new(path.clone());
    store.update(|s| s.collection.batch_days = 0).await;

    assert!(store.save().await.is_err());
    assert!(!path.exists());
}

//! Session store persistence and sweeping.

mod common;

use beeconnect::core::keys::storage as keys;
use beeconnect::storage::{self, data_dir};
use beeconnect::{FileStorage, MemoryStorage, Session, SessionManager, Storage, WalletRegistry};
use chrono::{Duration as ChronoDuration, Utc};
use common::{wallet, PUBLIC_KEY};
use once_cell::sync::Lazy;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// Serializes tests that mutate BEECONNECT_ROOT.
static ENV_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

fn idle_session(id: &str, hours: i64) -> Session {
    let at = Utc::now() - ChronoDuration::hours(hours);
    Session {
        session_id: id.into(),
        app_name: format!("app-{id}"),
        wallet_public_key: PUBLIC_KEY.into(),
        created_at: at,
        last_activity_at: at,
    }
}

#[tokio::test]
async fn create_get_then_clear() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let sessions = SessionManager::load(storage).await;

    let created = sessions.create_session("s1", "Hive", &wallet()).await;
    let fetched = sessions.get_session("s1").unwrap();
    assert_eq!(fetched, created);
    assert_eq!(fetched.wallet_public_key, wallet().public_key());
    assert_eq!(sessions.get_sessions_for_wallet(PUBLIC_KEY).len(), 1);

    sessions.clear_sessions().await;
    assert!(sessions.get_session("s1").is_none());
}

#[tokio::test]
async fn create_overwrites_on_collision() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let sessions = SessionManager::load(storage).await;
    sessions.create_session("s1", "First", &wallet()).await;
    sessions.create_session("s1", "Second", &wallet()).await;
    assert_eq!(sessions.list_sessions().len(), 1);
    assert_eq!(sessions.get_session("s1").unwrap().app_name, "Second");
}

#[tokio::test]
async fn sweep_removes_exactly_the_stale_session() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    storage::set_typed(storage.as_ref(), keys::SESSIONS, &vec![idle_session("recent", 1), idle_session("stale", 30)])
        .await
        .unwrap();
    let sessions = SessionManager::load(storage).await;

    assert_eq!(sessions.cleanup_inactive_sessions(24).await, 1);
    assert!(sessions.has_session("recent"));
    assert!(!sessions.has_session("stale"));
    assert_eq!(sessions.cleanup_inactive_sessions(24).await, 0);
}

#[tokio::test]
async fn removal_by_wallet_reports_count() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    let sessions = SessionManager::load(storage).await;
    sessions.create_session("a", "A", &wallet()).await;
    sessions.create_session("b", "B", &wallet()).await;

    assert_eq!(sessions.remove_sessions_for_wallet(&PUBLIC_KEY.to_uppercase()).await, 2);
    assert!(sessions.list_sessions().is_empty());
    assert!(!sessions.remove_session("a").await);
}

#[tokio::test]
async fn sessions_survive_restart_without_signers() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("storage.json");
    {
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::at(&path));
        let sessions = SessionManager::load(storage.clone()).await;
        sessions.create_session("s1", "Hive", &wallet()).await;
        WalletRegistry::load(storage).await.register(wallet()).await;
    }

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains("wallet_public_key"));
    assert!(!raw.contains("signer"));

    let storage: Arc<dyn Storage> = Arc::new(FileStorage::at(&path));
    let sessions = SessionManager::load(storage.clone()).await;
    assert_eq!(sessions.get_session("s1").unwrap().app_name, "Hive");

    let wallets = WalletRegistry::load(storage).await;
    assert!(wallets.list().is_empty());
    assert_eq!(wallets.stored_summaries()[0].public_key, PUBLIC_KEY);
    assert_eq!(wallets.stored_summaries()[0].address, wallet().address());
}

#[tokio::test]
async fn corrupt_storage_starts_empty() {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
    storage.set(keys::SESSIONS, serde_json::json!({"not": "a list"})).await.unwrap();
    let sessions = SessionManager::load(storage).await;
    assert!(sessions.list_sessions().is_empty());
}

#[test]
fn data_dir_honours_root_override() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|p| p.into_inner());
    let dir = TempDir::new().unwrap();
    std::env::set_var("BEECONNECT_ROOT", dir.path());
    assert_eq!(data_dir("wallet"), dir.path().join("wallet").join("data"));
    std::env::remove_var("BEECONNECT_ROOT");
}

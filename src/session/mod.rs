//! Session Manager - durable pairings between requesting apps and wallets.
//!
//! The in-memory map is authoritative for the process lifetime. Every
//! mutation persists the full set; storage failures are logged and
//! swallowed. Sweeping is driven by the engine, never self-scheduled.

use crate::core::keys::storage as keys;
use crate::storage::{self, Storage};
use crate::wallet::WalletHandle;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Pairing metadata. The wallet is referenced by public key only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub app_name: String,
    pub wallet_public_key: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

pub struct SessionManager {
    storage: Arc<dyn Storage>,
    sessions: RwLock<HashMap<String, Session>>,
    persist: tokio::sync::Mutex<()>,
}

impl SessionManager {
    /// Load the persisted set once. Unreadable storage starts empty.
    pub async fn load(storage: Arc<dyn Storage>) -> Self {
        let stored = match storage::get_typed::<Vec<Session>>(storage.as_ref(), keys::SESSIONS).await {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "sessions unreadable, starting empty");
                Vec::new()
            }
        };
        debug!(count = stored.len(), "sessions loaded");
        let sessions = stored.into_iter().map(|s| (s.session_id.clone(), s)).collect();
        Self {
            storage,
            sessions: RwLock::new(sessions),
            persist: tokio::sync::Mutex::new(()),
        }
    }

    /// Create (or overwrite) a session for `wallet`.
    pub async fn create_session(&self, session_id: &str, app_name: &str, wallet: &WalletHandle) -> Session {
        let now = Utc::now();
        let session = Session {
            session_id: session_id.to_string(),
            app_name: app_name.to_string(),
            wallet_public_key: wallet.public_key().to_string(),
            created_at: now,
            last_activity_at: now,
        };
        let cloned = session.clone();
        self.mutate(move |map| {
            map.insert(cloned.session_id.clone(), cloned);
        })
        .await;
        info!(session_id = %session_id, app = %app_name, "session created");
        session
    }

    pub fn get_session(&self, session_id: &str) -> Option<Session> {
        self.read().get(session_id).cloned()
    }

    pub fn has_session(&self, session_id: &str) -> bool {
        self.read().contains_key(session_id)
    }

    pub fn get_sessions_for_wallet(&self, public_key: &str) -> Vec<Session> {
        let public_key = public_key.to_ascii_lowercase();
        self.read()
            .values()
            .filter(|s| s.wallet_public_key == public_key)
            .cloned()
            .collect()
    }

    pub fn list_sessions(&self) -> Vec<Session> {
        let mut all: Vec<Session> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    /// Refresh `last_activity_at`. Returns false if the session is unknown.
    pub async fn touch_session(&self, session_id: &str) -> bool {
        let id = session_id.to_string();
        self.mutate(move |map| match map.get_mut(&id) {
            Some(session) => {
                session.last_activity_at = Utc::now();
                true
            }
            None => false,
        })
        .await
    }

    pub async fn remove_session(&self, session_id: &str) -> bool {
        let id = session_id.to_string();
        let removed = self.mutate(move |map| map.remove(&id).is_some()).await;
        if removed {
            info!(session_id = %session_id, "session removed");
        }
        removed
    }

    /// Remove every session bound to a wallet; returns how many went.
    pub async fn remove_sessions_for_wallet(&self, public_key: &str) -> usize {
        let key = public_key.to_ascii_lowercase();
        let removed = self
            .mutate(move |map| {
                let before = map.len();
                map.retain(|_, s| s.wallet_public_key != key);
                before - map.len()
            })
            .await;
        info!(wallet = %public_key, removed, "sessions removed for wallet");
        removed
    }

    pub async fn clear_sessions(&self) {
        self.mutate(|map| map.clear()).await;
        info!("sessions cleared");
    }

    /// Drop sessions idle longer than `max_inactive_hours`; returns the count.
    pub async fn cleanup_inactive_sessions(&self, max_inactive_hours: u64) -> usize {
        let cutoff = Utc::now() - ChronoDuration::hours(max_inactive_hours as i64);
        let removed = self
            .mutate(move |map| {
                let before = map.len();
                map.retain(|_, s| s.last_activity_at >= cutoff);
                before - map.len()
            })
            .await;
        if removed > 0 {
            info!(removed, max_inactive_hours, "inactive sessions swept");
        }
        removed
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Apply `f` under the write lock, then persist the resulting set once.
    async fn mutate<R>(&self, f: impl FnOnce(&mut HashMap<String, Session>) -> R) -> R {
        let _guard = self.persist.lock().await;
        let (result, snapshot) = {
            let mut map = self.sessions.write().unwrap_or_else(|p| p.into_inner());
            let result = f(&mut map);
            let snapshot: Vec<Session> = map.values().cloned().collect();
            (result, snapshot)
        };
        if let Err(e) = storage::set_typed(self.storage.as_ref(), keys::SESSIONS, &snapshot).await {
            warn!(error = %e, "failed to persist sessions");
        }
        result
    }
}

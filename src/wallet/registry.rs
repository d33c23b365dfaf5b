//! WalletRegistry - copy-on-write set of live wallets.

use super::{WalletHandle, WalletSummary};
use crate::core::keys::storage as keys;
use crate::storage::{self, Storage};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

pub struct WalletRegistry {
    storage: Arc<dyn Storage>,
    wallets: RwLock<Arc<Vec<WalletHandle>>>,
    stored: Vec<WalletSummary>,
    persist: tokio::sync::Mutex<()>,
}

impl WalletRegistry {
    /// Empty registry remembering whatever summaries were persisted last run.
    pub async fn load(storage: Arc<dyn Storage>) -> Self {
        let stored = match storage::get_typed::<Vec<WalletSummary>>(storage.as_ref(), keys::WALLETS).await {
            Ok(list) => list.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "wallet summaries unreadable, starting empty");
                Vec::new()
            }
        };
        debug!(count = stored.len(), "wallet summaries loaded");
        Self {
            storage,
            wallets: RwLock::new(Arc::new(Vec::new())),
            stored,
            persist: tokio::sync::Mutex::new(()),
        }
    }

    /// Summaries persisted by a previous run, so the host can re-attach signers.
    pub fn stored_summaries(&self) -> &[WalletSummary] {
        &self.stored
    }

    /// Add a wallet, replacing any wallet with the same public key.
    pub async fn register(&self, handle: WalletHandle) {
        let _guard = self.persist.lock().await;
        let snapshot = {
            let mut wallets = self.wallets.write().unwrap_or_else(|p| p.into_inner());
            let mut next: Vec<WalletHandle> = wallets
                .iter()
                .filter(|w| w.public_key() != handle.public_key())
                .cloned()
                .collect();
            next.push(handle);
            *wallets = Arc::new(next);
            wallets.clone()
        };
        self.persist(&snapshot).await;
    }

    pub async fn remove(&self, public_key: &str) -> bool {
        let _guard = self.persist.lock().await;
        let public_key = public_key.to_ascii_lowercase();
        let (removed, snapshot) = {
            let mut wallets = self.wallets.write().unwrap_or_else(|p| p.into_inner());
            let next: Vec<WalletHandle> = wallets
                .iter()
                .filter(|w| w.public_key() != public_key)
                .cloned()
                .collect();
            let removed = next.len() != wallets.len();
            *wallets = Arc::new(next);
            (removed, wallets.clone())
        };
        if removed {
            self.persist(&snapshot).await;
        }
        removed
    }

    pub fn list(&self) -> Arc<Vec<WalletHandle>> {
        self.wallets.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn get(&self, public_key: &str) -> Option<WalletHandle> {
        let public_key = public_key.to_ascii_lowercase();
        self.list().iter().find(|w| w.public_key() == public_key).cloned()
    }

    pub fn find_by_address(&self, address: &str) -> Option<WalletHandle> {
        self.list().iter().find(|w| w.address() == address).cloned()
    }

    pub fn summaries(&self) -> Vec<WalletSummary> {
        self.list().iter().map(WalletHandle::summary).collect()
    }

    async fn persist(&self, wallets: &[WalletHandle]) {
        let summaries: Vec<WalletSummary> = wallets.iter().map(WalletHandle::summary).collect();
        if let Err(e) = storage::set_typed(self.storage.as_ref(), keys::WALLETS, &summaries).await {
            warn!(error = %e, "failed to persist wallet summaries");
        }
    }
}

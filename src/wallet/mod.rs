//! Wallets offerable to requesting applications.
//!
//! # Architecture
//!
//! ```text
//! WalletRegistry (copy-on-write list, persisted summaries)
//!     │
//!     └── WalletHandle { public_key, version, signer }
//!                                              │
//!                                              ▼
//!                                  dyn WalletSigner (host-supplied:
//!                                  address, balance, state init, sign)
//! ```
//!
//! Key storage and contract encoding live behind [`WalletSigner`]; this crate
//! never sees private keys.

mod registry;

pub use registry::WalletRegistry;

use crate::error::{ConnectError, ConnectResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Wallet contract revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WalletVersion {
    #[serde(rename = "v3r2")]
    V3R2,
    #[default]
    #[serde(rename = "v4r2")]
    V4R2,
    #[serde(rename = "v5r1")]
    V5R1,
}

impl WalletVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalletVersion::V3R2 => "v3r2",
            WalletVersion::V4R2 => "v4r2",
            WalletVersion::V5R1 => "v5r1",
        }
    }
}

/// One outgoing message of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    pub address: String,
    /// Amount in nanotons, decimal string.
    pub amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_init: Option<String>,
}

/// Transfer the signer turns into a signed external message.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub messages: Vec<TransactionMessage>,
    pub valid_until: Option<i64>,
}

/// Blockchain/signing collaborator supplied by the host.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Raw address `<workchain>:<hex>`.
    fn address(&self) -> String;
    async fn balance(&self) -> anyhow::Result<u128>;
    /// Base64 state init of the wallet contract.
    async fn state_init(&self) -> anyhow::Result<String>;
    async fn sign(&self, bytes: &[u8]) -> anyhow::Result<Vec<u8>>;
    /// Signed external message (BoC bytes) carrying the transfer.
    async fn sign_transfer(&self, transfer: &TransferRequest) -> anyhow::Result<Vec<u8>>;
}

/// Live wallet. Identity is the public key; replaced wholesale, never mutated.
#[derive(Clone)]
pub struct WalletHandle {
    public_key: String,
    version: WalletVersion,
    signer: Arc<dyn WalletSigner>,
}

impl fmt::Debug for WalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletHandle")
            .field("public_key", &self.public_key)
            .field("version", &self.version)
            .field("address", &self.signer.address())
            .finish()
    }
}

impl WalletHandle {
    pub fn new(public_key: impl Into<String>, version: WalletVersion, signer: Arc<dyn WalletSigner>) -> Self {
        Self {
            public_key: public_key.into().to_ascii_lowercase(),
            version,
            signer,
        }
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn version(&self) -> WalletVersion {
        self.version
    }

    pub fn address(&self) -> String {
        self.signer.address()
    }

    pub async fn balance(&self) -> ConnectResult<u128> {
        self.signer.balance().await.map_err(ConnectError::Signing)
    }

    pub async fn state_init(&self) -> ConnectResult<String> {
        self.signer.state_init().await.map_err(ConnectError::Signing)
    }

    pub async fn sign(&self, bytes: &[u8]) -> ConnectResult<Vec<u8>> {
        self.signer.sign(bytes).await.map_err(ConnectError::Signing)
    }

    pub async fn sign_transfer(&self, transfer: &TransferRequest) -> ConnectResult<Vec<u8>> {
        self.signer.sign_transfer(transfer).await.map_err(ConnectError::Signing)
    }

    pub fn summary(&self) -> WalletSummary {
        WalletSummary {
            public_key: self.public_key.clone(),
            version: self.version,
            address: self.address(),
        }
    }
}

/// Persisted wallet metadata. The signer is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSummary {
    pub public_key: String,
    pub version: WalletVersion,
    pub address: String,
}

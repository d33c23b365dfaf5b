//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use beeconnect::router::AppManifest;
use beeconnect::transport::{EventCallback, EventListeners, TransportKind};
use beeconnect::wallet::TransferRequest;
use beeconnect::{
    ConnectResult, ManifestFetcher, OutboundMessage, RawWireEvent, Subscription, Transport, WalletHandle,
    WalletSigner, WalletVersion,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PUBLIC_KEY: &str = "8f3a6c1d2e4b5a69788796a5b4c3d2e1f00112233445566778899aabbccddeeff";

/// Remote-kind transport that records everything sent through it.
#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutboundMessage>>,
    pub opened: Mutex<Vec<String>>,
    pub closed: Mutex<Vec<String>>,
    pub listeners: EventListeners,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn push(&self, event: RawWireEvent) -> usize {
        self.listeners.emit(&event)
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Remote
    }

    async fn send(&self, message: OutboundMessage) -> ConnectResult<Value> {
        self.sent.lock().unwrap().push(message);
        Ok(Value::Null)
    }

    fn on_event(&self, callback: EventCallback) -> Subscription {
        self.listeners.subscribe(callback)
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn open_session(&self, session_id: &str) -> ConnectResult<()> {
        self.opened.lock().unwrap().push(session_id.to_string());
        Ok(())
    }

    async fn close_session(&self, session_id: &str) -> ConnectResult<()> {
        self.closed.lock().unwrap().push(session_id.to_string());
        Ok(())
    }

    async fn destroy(&self) {
        self.listeners.clear();
    }
}

/// Deterministic signer: the "signature" is the input reversed.
pub struct TestSigner;

#[async_trait]
impl WalletSigner for TestSigner {
    fn address(&self) -> String {
        format!("0:{}", "42".repeat(32))
    }

    async fn balance(&self) -> anyhow::Result<u128> {
        Ok(1_500_000_000)
    }

    async fn state_init(&self) -> anyhow::Result<String> {
        Ok("te6ccgEBAwEAAA==".into())
    }

    async fn sign(&self, bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
        Ok(bytes.iter().rev().copied().collect())
    }

    async fn sign_transfer(&self, transfer: &TransferRequest) -> anyhow::Result<Vec<u8>> {
        Ok(format!("boc:{}", transfer.messages.len()).into_bytes())
    }
}

pub fn wallet() -> WalletHandle {
    WalletHandle::new(PUBLIC_KEY, WalletVersion::V4R2, Arc::new(TestSigner))
}

pub struct StaticManifests;

#[async_trait]
impl ManifestFetcher for StaticManifests {
    async fn fetch(&self, url: &str) -> anyhow::Result<AppManifest> {
        if url.contains("broken") {
            anyhow::bail!("404");
        }
        Ok(AppManifest {
            name: "<b>Hive</b> Swap".into(),
            url: "https://hive.example".into(),
            icon_url: "https://hive.example/icon.png".into(),
        })
    }
}

/// Poll `check` until it holds or `limit` elapses.
pub async fn wait_until(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}

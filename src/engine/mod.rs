//! Engine - one running connect instance.
//!
//! Owns startup and shutdown ordering:
//!
//! ```text
//! start:  storage ─► sessions + wallets ─► router ─► processor
//!                 ─► transports (attach, subscribe, relay loop) ─► sweep loop
//! stop:   shutdown signal ─► cancel pending approvals ─► release subscriptions
//!                 ─► clear callbacks ─► destroy transports
//! ```
//!
//! Inbound events from either transport go through [`Engine::handle_event`]:
//! routed requests are tracked by the processor and handed to the
//! application callback, refused requests are answered with a protocol
//! error, unknown methods are dropped.

mod config;

pub use config::EngineConfig;

use crate::core::keys::reasons;
use crate::core::link::ConnectionLink;
use crate::core::protocol::{RawWireEvent, TransportKind};
use crate::error::{ConnectError, ConnectResult};
use crate::processor::{PendingSummary, RequestProcessor, SignDataResult, SignedTransaction};
use crate::router::{
    ConnectRequest, DomainRequest, HttpManifestFetcher, ManifestFetcher, RouteOutcome, Router, SignDataRequest,
    TransactionRequest, DisconnectEvent,
};
use crate::runtime::Shutdown;
use crate::session::{Session, SessionManager};
use crate::storage::{FileStorage, Storage};
use crate::subscription::Subscription;
use crate::transport::{FrameMessenger, HostBridge, LocalTransport, RelayState, RelayTransport, Transport};
use crate::wallet::{WalletHandle, WalletRegistry, WalletSummary};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// External pieces the engine is built from.
pub struct Collaborators {
    pub storage: Arc<dyn Storage>,
    pub manifests: Arc<dyn ManifestFetcher>,
    /// Host bridge for the local transport; none means no local transport.
    pub bridge: Option<Arc<dyn HostBridge>>,
    pub frames: Option<Arc<dyn FrameMessenger>>,
    /// Replaces the relay built from `relay_url`.
    pub remote: Option<Arc<dyn Transport>>,
}

impl Collaborators {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            manifests: Arc::new(HttpManifestFetcher::default()),
            bridge: None,
            frames: None,
            remote: None,
        }
    }

    /// File storage under the engine's data directory.
    pub fn for_app(app: &str) -> ConnectResult<Self> {
        Ok(Self::new(Arc::new(FileStorage::open(app)?)))
    }
    pub fn with_manifests(mut self, f: Arc<dyn ManifestFetcher>) -> Self { self.manifests = f; self }
    pub fn with_bridge(mut self, bridge: Arc<dyn HostBridge>, frames: Option<Arc<dyn FrameMessenger>>) -> Self {
        self.bridge = Some(bridge);
        self.frames = frames;
        self
    }
    pub fn with_remote(mut self, t: Arc<dyn Transport>) -> Self { self.remote = Some(t); self }
}

/// What happened to one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDisposition {
    /// Awaiting a decision under this pending key.
    Pending(String),
    /// Answered without human involvement (disconnect ack, refusal).
    Answered,
    Dropped,
}

/// Engine handle; cheap to clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    sessions: Arc<SessionManager>,
    wallets: Arc<WalletRegistry>,
    router: Router,
    processor: Arc<RequestProcessor>,
    relay: Option<Arc<RelayTransport>>,
    local: Option<Arc<LocalTransport>>,
    subscriptions: Mutex<Vec<Subscription>>,
    shutdown: Shutdown,
    stopped: AtomicBool,
}

impl Engine {
    /// Build and start an engine.
    pub async fn start(config: EngineConfig, collaborators: Collaborators) -> ConnectResult<Self> {
        config.validate()?;
        let storage = collaborators.storage;
        let sessions = Arc::new(SessionManager::load(storage.clone()).await);
        let wallets = Arc::new(WalletRegistry::load(storage).await);
        let router = Router::with_default_handlers(
            sessions.clone(),
            wallets.clone(),
            collaborators.manifests,
            config.network,
            config.device.max_messages,
        )?;
        let processor = RequestProcessor::new(
            sessions.clone(),
            config.network,
            config.device.clone(),
            config.approval_timeout,
        );

        let mut relay = None;
        let remote: Option<Arc<dyn Transport>> = match (collaborators.remote, config.relay_config()) {
            (Some(custom), _) => Some(custom),
            (None, Some(relay_config)) => {
                let transport = RelayTransport::new(relay_config);
                relay = Some(transport.clone());
                Some(transport)
            }
            (None, None) => None,
        };
        let local = collaborators
            .bridge
            .map(|bridge| LocalTransport::new(bridge, collaborators.frames, config.local_config()));

        let inner = Arc::new(EngineInner {
            config,
            sessions,
            wallets,
            router,
            processor,
            relay,
            local,
            subscriptions: Mutex::new(Vec::new()),
            shutdown: Shutdown::new(),
            stopped: AtomicBool::new(false),
        });

        let mut transports: Vec<Arc<dyn Transport>> = Vec::new();
        if let Some(remote) = remote {
            transports.push(remote);
        }
        if let Some(local) = &inner.local {
            transports.push(local.clone());
        }
        for transport in transports {
            let subscription = transport.on_event(event_sink(Arc::downgrade(&inner)));
            inner.lock_subscriptions().push(subscription);
            inner.processor.attach_transport(transport);
        }

        if let Some(local) = &inner.local {
            local.start();
        }
        if let Some(relay) = &inner.relay {
            let remote_sessions = inner
                .sessions
                .list_sessions()
                .into_iter()
                .filter(|s| !s.session_id.starts_with("local:"))
                .map(|s| s.session_id);
            relay.start(remote_sessions);
        }
        spawn_sweep(Arc::downgrade(&inner), inner.config.sweep_interval, inner.shutdown.clone());

        info!(
            app = %inner.config.app,
            network = inner.config.network.chain_id(),
            relay = inner.config.relay_url.as_deref().unwrap_or("-"),
            local = inner.local.is_some(),
            sessions = inner.sessions.list_sessions().len(),
            "engine started"
        );
        Ok(Self { inner })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Stop everything. Idempotent.
    pub async fn stop(&self) {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.shutdown.trigger();
        let cancelled = inner.processor.cancel_all(reasons::SHUTTING_DOWN).await;
        let subscriptions: Vec<Subscription> = inner.lock_subscriptions().drain(..).collect();
        let released = subscriptions.len();
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
        inner.router.callbacks().clear();
        for transport in inner.processor.detach_transports() {
            transport.destroy().await;
        }
        info!(cancelled, released, "engine stopped");
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    /// Route one inbound event to completion.
    pub async fn handle_event(&self, event: RawWireEvent) -> EventDisposition {
        self.inner.handle_event(event).await
    }

    /// Feed a pasted or scanned connection link into the relay path.
    pub async fn handle_connection_link(&self, link: &str) -> ConnectResult<EventDisposition> {
        let link = ConnectionLink::parse(link)?;
        if self.inner.processor.transport(TransportKind::Remote).is_none() {
            return Err(ConnectError::Transport("no relay configured".into()));
        }
        info!(client_id = %link.client_id, "connection link received");
        Ok(self.handle_event(link.into_event()).await)
    }

    // ------------------------------------------------------------------
    // Callbacks
    // ------------------------------------------------------------------

    pub fn on_connect(&self, cb: impl Fn(ConnectRequest) + Send + Sync + 'static) -> Subscription {
        self.inner.router.callbacks().on_connect(cb)
    }

    pub fn on_transaction(&self, cb: impl Fn(TransactionRequest) + Send + Sync + 'static) -> Subscription {
        self.inner.router.callbacks().on_transaction(cb)
    }

    pub fn on_sign_data(&self, cb: impl Fn(SignDataRequest) + Send + Sync + 'static) -> Subscription {
        self.inner.router.callbacks().on_sign_data(cb)
    }

    pub fn on_disconnect(&self, cb: impl Fn(DisconnectEvent) + Send + Sync + 'static) -> Subscription {
        self.inner.router.callbacks().on_disconnect(cb)
    }

    // ------------------------------------------------------------------
    // Decisions
    // ------------------------------------------------------------------

    pub async fn approve_connect(&self, request: &ConnectRequest) -> ConnectResult<Session> {
        self.inner.processor.approve_connect(request).await
    }

    pub async fn reject_connect(&self, request: &ConnectRequest, reason: Option<&str>) -> ConnectResult<()> {
        self.inner.processor.reject_connect(request, reason).await
    }

    pub async fn approve_transaction(&self, request: &TransactionRequest) -> ConnectResult<SignedTransaction> {
        self.inner.processor.approve_transaction(request).await
    }

    pub async fn reject_transaction(&self, request: &TransactionRequest, reason: Option<&str>) -> ConnectResult<()> {
        self.inner.processor.reject_transaction(request, reason).await
    }

    pub async fn approve_sign_data(&self, request: &SignDataRequest) -> ConnectResult<SignDataResult> {
        self.inner.processor.approve_sign_data(request).await
    }

    pub async fn reject_sign_data(&self, request: &SignDataRequest, reason: Option<&str>) -> ConnectResult<()> {
        self.inner.processor.reject_sign_data(request, reason).await
    }

    pub fn pending_requests(&self) -> Vec<PendingSummary> {
        self.inner.processor.pending()
    }

    /// Approve a pending request by key. Connects need the wallet to pair with.
    pub async fn approve_pending(&self, key: &str, wallet_public_key: Option<&str>) -> ConnectResult<Value> {
        let request = self
            .inner
            .processor
            .pending_request(key)
            .ok_or_else(|| ConnectError::UnknownRequest(key.to_string()))?;
        match request {
            DomainRequest::Connect(request) => {
                let wallet = match wallet_public_key {
                    Some(public_key) => self.inner.wallets.get(public_key),
                    None => self.inner.wallets.list().first().cloned(),
                }
                .ok_or_else(|| ConnectError::NoWallet(request.id.clone()))?;
                let session = self.approve_connect(&request.with_wallet(wallet)).await?;
                Ok(serde_json::to_value(session)?)
            }
            DomainRequest::Transaction(request) => Ok(serde_json::to_value(self.approve_transaction(&request).await?)?),
            DomainRequest::SignData(request) => Ok(serde_json::to_value(self.approve_sign_data(&request).await?)?),
            DomainRequest::Disconnect(_) => Err(ConnectError::UnknownRequest(key.to_string())),
        }
    }

    pub async fn reject_pending(&self, key: &str, reason: Option<&str>) -> ConnectResult<()> {
        let request = self
            .inner
            .processor
            .pending_request(key)
            .ok_or_else(|| ConnectError::UnknownRequest(key.to_string()))?;
        match request {
            DomainRequest::Connect(request) => self.reject_connect(&request, reason).await,
            DomainRequest::Transaction(request) => self.reject_transaction(&request, reason).await,
            DomainRequest::SignData(request) => self.reject_sign_data(&request, reason).await,
            DomainRequest::Disconnect(_) => Err(ConnectError::UnknownRequest(key.to_string())),
        }
    }

    // ------------------------------------------------------------------
    // Wallets and sessions
    // ------------------------------------------------------------------

    pub async fn register_wallet(&self, wallet: WalletHandle) {
        info!(wallet = %wallet.public_key(), version = wallet.version().as_str(), "wallet registered");
        self.inner.wallets.register(wallet).await;
    }

    /// Remove a wallet and disconnect every session bound to it.
    pub async fn remove_wallet(&self, public_key: &str) -> bool {
        for session in self.inner.sessions.get_sessions_for_wallet(public_key) {
            self.inner.processor.disconnect_session(&session.session_id).await;
        }
        self.inner.wallets.remove(public_key).await
    }

    pub fn wallets(&self) -> Vec<WalletSummary> {
        self.inner.wallets.summaries()
    }

    pub fn stored_wallets(&self) -> Vec<WalletSummary> {
        self.inner.wallets.stored_summaries().to_vec()
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.inner.sessions.list_sessions()
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.inner.sessions.get_session(session_id)
    }

    pub async fn disconnect_session(&self, session_id: &str) -> bool {
        self.inner.processor.disconnect_session(session_id).await
    }

    pub async fn disconnect_all(&self) -> usize {
        self.inner.processor.disconnect_all().await
    }

    /// Sweep idle sessions now; the background loop does this every `sweep_interval`.
    pub async fn sweep_sessions(&self) -> usize {
        self.inner.sweep().await
    }

    pub fn relay_state(&self) -> Option<RelayState> {
        self.inner.relay.as_ref().map(|r| r.state())
    }

    pub fn local_transport(&self) -> Option<Arc<LocalTransport>> {
        self.inner.local.clone()
    }

    pub fn status(&self) -> Value {
        json!({
            "app": self.inner.config.app,
            "running": self.is_running(),
            "network": self.inner.config.network.chain_id(),
            "relay": self.relay_state(),
            "local": self.inner.local.as_ref().map(|l| l.frame_id().to_string()),
            "wallets": self.inner.wallets.list().len(),
            "sessions": self.inner.sessions.list_sessions().len(),
            "pending": self.inner.processor.pending().len(),
        })
    }
}

impl EngineInner {
    async fn handle_event(&self, event: RawWireEvent) -> EventDisposition {
        if self.stopped.load(Ordering::SeqCst) {
            debug!(id = %event.id, "engine stopped, event ignored");
            return EventDisposition::Dropped;
        }
        match self.router.route_event(event).await {
            RouteOutcome::Routed(DomainRequest::Disconnect(disconnect)) => {
                if let Err(e) = self.processor.acknowledge_disconnect(&disconnect).await {
                    warn!(id = %disconnect.id, error = %e, "disconnect acknowledgement failed");
                }
                self.router.dispatch(DomainRequest::Disconnect(disconnect));
                EventDisposition::Answered
            }
            RouteOutcome::Routed(request) => {
                let key = self.processor.track(&request);
                self.router.dispatch(request);
                EventDisposition::Pending(key)
            }
            RouteOutcome::Rejected { id, origin, method, error } => {
                if let Err(e) = self.processor.send_error(&origin, &id, method, &error).await {
                    warn!(id = %id, error = %e, "refusal not delivered");
                }
                EventDisposition::Answered
            }
            RouteOutcome::Dropped { .. } => EventDisposition::Dropped,
        }
    }

    async fn sweep(&self) -> usize {
        let before = self.sessions.list_sessions();
        let removed = self
            .sessions
            .cleanup_inactive_sessions(self.config.session_max_inactive_hours)
            .await;
        if removed > 0 {
            if let Some(remote) = self.processor.transport(TransportKind::Remote) {
                for session in before.iter().filter(|s| !self.sessions.has_session(&s.session_id)) {
                    if session.session_id.starts_with("local:") {
                        continue;
                    }
                    if let Err(e) = remote.close_session(&session.session_id).await {
                        debug!(session_id = %session.session_id, error = %e, "relay session close failed");
                    }
                }
            }
        }
        removed
    }

    fn lock_subscriptions(&self) -> std::sync::MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Transport listener: hand each event to the engine on the runtime.
fn event_sink(engine: Weak<EngineInner>) -> crate::transport::EventCallback {
    let runtime = tokio::runtime::Handle::current();
    Arc::new(move |event: RawWireEvent| {
        let Some(inner) = engine.upgrade() else {
            return;
        };
        runtime.spawn(async move {
            inner.handle_event(event).await;
        });
    })
}

/// Periodic expiry sweep. Stops on shutdown even when the signal fires
/// before the task is first polled.
fn spawn_sweep(engine: Weak<EngineInner>, interval: Duration, shutdown: Shutdown) -> JoinHandle<()> {
    tokio::spawn(async move {
        let stopped = shutdown.wait();
        tokio::pin!(stopped);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            tokio::select! {
                biased;
                _ = &mut stopped => break,
                _ = ticker.tick() => {
                    let Some(inner) = engine.upgrade() else { break };
                    inner.sweep().await;
                }
            }
        }
        debug!("session sweep stopped");
    })
}

//! Domain Event Router - raw wire events in, typed domain requests out.
//!
//! ```text
//! RawWireEvent ──► classify ──► Route::Claimed(handler) ──► handler.handle ──► DomainRequest
//!                          └──► Route::Unclaimed ──► logged, dropped (no response)
//! ```
//!
//! Exactly one handler may claim a [`WireMethod`]. Handlers receive a
//! [`RouteContext`] carrying the session and wallet resolved from the event's
//! origin; connect handling gets an empty context since the human picks the
//! wallet. Handler failures become [`RouteOutcome::Rejected`] so the caller
//! can answer the requester with a protocol error.

mod callbacks;
pub mod handlers;
pub mod manifest;
pub mod request;

pub use callbacks::RequestCallbacks;
pub use handlers::{ConnectHandler, DisconnectHandler, SignDataHandler, TransactionHandler};
pub use manifest::{AppManifest, HttpManifestFetcher, ManifestFetcher};
pub use request::{
    AppPreview, ConnectItem, ConnectRequest, DisconnectEvent, DomainRequest, RequestKind, SignDataPayload,
    SignDataRequest, TransactionRequest,
};

use crate::core::protocol::{Network, Origin, ProtocolError, RawWireEvent, WireMethod};
use crate::error::{ConnectError, ConnectResult};
use crate::session::{Session, SessionManager};
use crate::wallet::{WalletHandle, WalletRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Session state resolved for an inbound event.
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    pub session: Option<Session>,
    pub wallet: Option<WalletHandle>,
}

#[async_trait]
pub trait Handler: Send + Sync {
    fn method(&self) -> WireMethod;

    fn can_handle(&self, event: &RawWireEvent) -> bool {
        event.wire_method() == Some(self.method())
    }

    async fn handle(&self, event: &RawWireEvent, context: &RouteContext) -> ConnectResult<DomainRequest>;
}

/// Which handler, if any, owns an event.
pub enum Route {
    Claimed(Arc<dyn Handler>),
    Unclaimed,
}

#[derive(Debug)]
pub enum RouteOutcome {
    Routed(DomainRequest),
    /// Handler refused the event; the requester is owed this error.
    Rejected {
        id: String,
        origin: Origin,
        method: WireMethod,
        error: ProtocolError,
    },
    /// No handler claims the method. Nothing is sent.
    Dropped { method: String },
}

pub struct Router {
    handlers: HashMap<WireMethod, Arc<dyn Handler>>,
    sessions: Arc<SessionManager>,
    wallets: Arc<WalletRegistry>,
    callbacks: RequestCallbacks,
}

impl Router {
    pub fn new(sessions: Arc<SessionManager>, wallets: Arc<WalletRegistry>) -> Self {
        Self {
            handlers: HashMap::new(),
            sessions,
            wallets,
            callbacks: RequestCallbacks::default(),
        }
    }

    /// Router with the four built-in handlers.
    pub fn with_default_handlers(
        sessions: Arc<SessionManager>,
        wallets: Arc<WalletRegistry>,
        fetcher: Arc<dyn ManifestFetcher>,
        network: Network,
        max_messages: usize,
    ) -> ConnectResult<Self> {
        let mut router = Self::new(sessions, wallets);
        router.register_handler(Arc::new(ConnectHandler::new(fetcher)))?;
        router.register_handler(Arc::new(TransactionHandler::new(network, max_messages)))?;
        router.register_handler(Arc::new(SignDataHandler))?;
        router.register_handler(Arc::new(DisconnectHandler))?;
        Ok(router)
    }

    pub fn register_handler(&mut self, handler: Arc<dyn Handler>) -> ConnectResult<()> {
        let method = handler.method();
        if self.handlers.contains_key(&method) {
            return Err(ConnectError::DuplicateHandler(method.as_str()));
        }
        self.handlers.insert(method, handler);
        Ok(())
    }

    pub fn callbacks(&self) -> &RequestCallbacks {
        &self.callbacks
    }

    pub fn classify(&self, event: &RawWireEvent) -> Route {
        event
            .wire_method()
            .and_then(|method| self.handlers.get(&method))
            .filter(|handler| handler.can_handle(event))
            .map(|handler| Route::Claimed(handler.clone()))
            .unwrap_or(Route::Unclaimed)
    }

    /// Resolve session and wallet for the event's origin, refreshing activity.
    pub async fn context_for(&self, origin: &Origin) -> RouteContext {
        let key = origin.session_key();
        let Some(session) = self.sessions.get_session(&key) else {
            return RouteContext::default();
        };
        self.sessions.touch_session(&key).await;
        let wallet = self.wallets.get(&session.wallet_public_key);
        if wallet.is_none() {
            warn!(session_id = %key, wallet = %session.wallet_public_key, "session wallet not registered");
        }
        RouteContext { session: Some(session), wallet }
    }

    pub async fn route_event(&self, event: RawWireEvent) -> RouteOutcome {
        let handler = match self.classify(&event) {
            Route::Claimed(handler) => handler,
            Route::Unclaimed => {
                warn!(id = %event.id, method = %event.method, "unknown method, event dropped");
                return RouteOutcome::Dropped { method: event.method };
            }
        };

        let method = handler.method();
        let context = match method {
            WireMethod::StartConnect => RouteContext::default(),
            _ => self.context_for(&event.origin).await,
        };

        match handler.handle(&event, &context).await {
            Ok(request) => {
                debug!(id = %event.id, method = method.as_str(), "event routed");
                RouteOutcome::Routed(request)
            }
            Err(e) => {
                warn!(id = %event.id, method = method.as_str(), error = %e, "event rejected");
                RouteOutcome::Rejected {
                    id: event.id,
                    origin: event.origin,
                    method,
                    error: e.to_protocol(),
                }
            }
        }
    }

    /// Forward a routed request to its application callback.
    pub fn dispatch(&self, request: DomainRequest) -> bool {
        let id = request.id().to_string();
        let delivered = self.callbacks.dispatch(request);
        if !delivered {
            debug!(id = %id, "no callback registered, request waits for approval by id");
        }
        delivered
    }
}

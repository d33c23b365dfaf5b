//! Request/Response Processor - the one place a human decision becomes a
//! protocol message.
//!
//! ```text
//! Router ──► track(request) ──► pending table ──► application callback
//!                                   │
//!           approve_* / reject_* ───┤  claim: first settler wins
//!           approval timeout ───────┤
//!           cancel_all (stop) ──────┘
//!                                   ▼
//!                     transport_for(origin).send(response)
//! ```
//!
//! A request leaves the pending table exactly once, so every tracked request
//! yields exactly one terminal response whichever path settles it. Every
//! approve/reject path logs and returns its failure; an approval that fails
//! after claiming still sends an error response before returning. A response
//! that left through its transport is final even when the far side never
//! acknowledges it: no rollback, no second answer.

mod payload;

use crate::core::keys::reasons;
use crate::core::protocol::{
    connect_error_event, connect_event, disconnect_event, error_response, success_response, DeviceInfo, Network,
    Origin, OutboundMessage, ProtocolError, TransportKind, WireMethod,
};
use crate::core::random_id;
use crate::error::{ConnectError, ConnectResult};
use crate::router::request::{
    ConnectRequest, DisconnectEvent, DomainRequest, RequestKind, SignDataRequest, TransactionRequest,
};
use crate::session::{Session, SessionManager};
use crate::transport::Transport;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pending-table key: request ids are only unique per requester.
pub fn pending_key(origin: &Origin, id: &str) -> String {
    format!("{}~{}", origin.session_key(), id)
}

/// Listing view of a request awaiting a decision.
#[derive(Debug, Clone, Serialize)]
pub struct PendingSummary {
    pub key: String,
    pub received_at: DateTime<Utc>,
    pub request: Value,
}

/// Returned by a transaction approval so the caller need not re-derive it.
#[derive(Debug, Clone, Serialize)]
pub struct SignedTransaction {
    /// Signed external message, base64.
    pub boc: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignDataResult {
    pub signature: Vec<u8>,
    pub address: String,
    pub timestamp: i64,
}

struct PendingApproval {
    request: DomainRequest,
    received_at: DateTime<Utc>,
    timer: Option<JoinHandle<()>>,
}

pub struct RequestProcessor {
    sessions: Arc<SessionManager>,
    transports: RwLock<HashMap<TransportKind, Arc<dyn Transport>>>,
    pending: Mutex<HashMap<String, PendingApproval>>,
    network: Network,
    device: DeviceInfo,
    approval_timeout: Duration,
    this: Weak<RequestProcessor>,
}

impl RequestProcessor {
    pub fn new(
        sessions: Arc<SessionManager>,
        network: Network,
        device: DeviceInfo,
        approval_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            sessions,
            transports: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            network,
            device,
            approval_timeout,
            this: this.clone(),
        })
    }

    pub fn attach_transport(&self, transport: Arc<dyn Transport>) {
        let kind = transport.kind();
        self.transports.write().unwrap_or_else(|p| p.into_inner()).insert(kind, transport);
    }

    pub fn detach_transports(&self) -> Vec<Arc<dyn Transport>> {
        self.transports
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .drain()
            .map(|(_, t)| t)
            .collect()
    }

    pub fn transport(&self, kind: TransportKind) -> Option<Arc<dyn Transport>> {
        self.transports.read().unwrap_or_else(|p| p.into_inner()).get(&kind).cloned()
    }

    // ------------------------------------------------------------------
    // Pending approvals
    // ------------------------------------------------------------------

    /// Start the approval clock for a routed request. Disconnects are not
    /// tracked; they are acknowledged immediately.
    pub fn track(&self, request: &DomainRequest) -> String {
        let key = pending_key(request.origin(), request.id());
        let timer = self.this.upgrade().map(|processor| {
            let key = key.clone();
            let timeout = self.approval_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                processor.expire(&key).await;
            })
        });
        let previous = self.lock_pending().insert(
            key.clone(),
            PendingApproval { request: request.clone(), received_at: Utc::now(), timer },
        );
        if let Some(previous) = previous {
            // Same requester reused an id; the newer request supersedes.
            if let Some(timer) = previous.timer {
                timer.abort();
            }
            warn!(key = %key, "request id reused while pending");
        }
        debug!(key = %key, kind = ?request.kind(), timeout_s = self.approval_timeout.as_secs(), "awaiting approval");
        key
    }

    pub fn pending(&self) -> Vec<PendingSummary> {
        let mut list: Vec<PendingSummary> = self
            .lock_pending()
            .iter()
            .map(|(key, p)| PendingSummary {
                key: key.clone(),
                received_at: p.received_at,
                request: p.request.summary(),
            })
            .collect();
        list.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        list
    }

    pub fn pending_request(&self, key: &str) -> Option<DomainRequest> {
        self.lock_pending().get(key).map(|p| p.request.clone())
    }

    pub fn is_pending(&self, origin: &Origin, id: &str) -> bool {
        self.lock_pending().contains_key(&pending_key(origin, id))
    }

    /// Remove a request from the pending table. Only one caller ever succeeds.
    fn claim(&self, origin: &Origin, id: &str) -> ConnectResult<DomainRequest> {
        let entry = self.lock_pending().remove(&pending_key(origin, id));
        match entry {
            Some(entry) => {
                if let Some(timer) = entry.timer {
                    timer.abort();
                }
                Ok(entry.request)
            }
            None => Err(ConnectError::AlreadySettled(id.to_string())),
        }
    }

    async fn expire(&self, key: &str) {
        let entry = self.lock_pending().remove(key);
        let Some(entry) = entry else {
            return;
        };
        let request = entry.request;
        info!(key = %key, kind = ?request.kind(), "approval timed out");
        let error = ProtocolError::unknown(reasons::EXPIRED);
        if let Err(e) = self.send_terminal_error(&request, &error).await {
            warn!(key = %key, error = %e, "expiry response not delivered");
        }
    }

    /// Reject every pending request; used on shutdown.
    pub async fn cancel_all(&self, reason: &str) -> usize {
        let drained: Vec<PendingApproval> = self.lock_pending().drain().map(|(_, p)| p).collect();
        let count = drained.len();
        let error = ProtocolError::unknown(reason);
        for entry in drained {
            if let Some(timer) = entry.timer {
                timer.abort();
            }
            if let Err(e) = self.send_terminal_error(&entry.request, &error).await {
                debug!(id = %entry.request.id(), error = %e, "cancellation not delivered");
            }
        }
        if count > 0 {
            info!(count, "pending requests cancelled");
        }
        count
    }

    // ------------------------------------------------------------------
    // Connect
    // ------------------------------------------------------------------

    /// Pair the requester with the chosen wallet and answer with the items it asked for.
    pub async fn approve_connect(&self, request: &ConnectRequest) -> ConnectResult<Session> {
        let wallet = request.wallet.clone().ok_or_else(|| ConnectError::NoWallet(request.id.clone()))?;
        self.claim(&request.origin, &request.id)?;

        let session_id = request.origin.session_key();
        let result: ConnectResult<Session> = async {
            let session = self.sessions.create_session(&session_id, &request.app_name, &wallet).await;
            if let Origin::Remote { session_id } = &request.origin {
                self.require(TransportKind::Remote)?.open_session(session_id).await?;
            }
            let payload = payload::connect_payload(request, &wallet, self.network, &self.device).await?;
            self.deliver(&request.origin, &request.id, connect_event(&request.id, payload)).await?;
            Ok(session)
        }
        .await;

        match result {
            Ok(session) => {
                info!(id = %request.id, session_id = %session_id, app = %request.app_name, "connect approved");
                Ok(session)
            }
            Err(e) => {
                warn!(id = %request.id, session_id = %session_id, error = %e, "connect approval failed");
                self.sessions.remove_session(&session_id).await;
                let body = connect_error_event(&request.id, &e.to_protocol());
                let _ = self.deliver(&request.origin, &request.id, body).await;
                Err(e)
            }
        }
    }

    pub async fn reject_connect(&self, request: &ConnectRequest, reason: Option<&str>) -> ConnectResult<()> {
        self.claim(&request.origin, &request.id)?;
        let error = ProtocolError::user_rejected(reason, reasons::CONNECT_DECLINED);
        info!(id = %request.id, reason = %error.message, "connect rejected");
        self.deliver(&request.origin, &request.id, connect_error_event(&request.id, &error)).await
    }

    // ------------------------------------------------------------------
    // Transaction
    // ------------------------------------------------------------------

    pub async fn approve_transaction(&self, request: &TransactionRequest) -> ConnectResult<SignedTransaction> {
        self.claim(&request.origin, &request.id)?;
        let signed = match request.wallet.sign_transfer(&request.transfer()).await {
            Ok(bytes) => SignedTransaction { boc: base64::engine::general_purpose::STANDARD.encode(bytes) },
            Err(e) => return Err(self.fail(&request.origin, &request.id, e).await),
        };
        info!(id = %request.id, messages = request.messages.len(), "transaction approved");
        self.deliver(&request.origin, &request.id, success_response(&request.id, json!(signed.boc)))
            .await?;
        Ok(signed)
    }

    pub async fn reject_transaction(&self, request: &TransactionRequest, reason: Option<&str>) -> ConnectResult<()> {
        self.claim(&request.origin, &request.id)?;
        let error = ProtocolError::user_rejected(reason, reasons::TRANSACTION_DECLINED);
        info!(id = %request.id, reason = %error.message, "transaction rejected");
        self.deliver(&request.origin, &request.id, error_response(&request.id, &error)).await
    }

    // ------------------------------------------------------------------
    // Sign data
    // ------------------------------------------------------------------

    pub async fn approve_sign_data(&self, request: &SignDataRequest) -> ConnectResult<SignDataResult> {
        self.claim(&request.origin, &request.id)?;
        let signature = match request.payload.bytes() {
            Ok(bytes) => request.wallet.sign(&bytes).await,
            Err(e) => Err(e),
        };
        let signature = match signature {
            Ok(signature) => signature,
            Err(e) => return Err(self.fail(&request.origin, &request.id, e).await),
        };
        let result = SignDataResult {
            signature,
            address: request.wallet.address(),
            timestamp: Utc::now().timestamp(),
        };
        info!(id = %request.id, "sign data approved");
        let body = success_response(
            &request.id,
            json!({
                "signature": result.signature,
                "address": result.address,
                "timestamp": result.timestamp,
                "payload": request.payload,
            }),
        );
        self.deliver(&request.origin, &request.id, body).await?;
        Ok(result)
    }

    pub async fn reject_sign_data(&self, request: &SignDataRequest, reason: Option<&str>) -> ConnectResult<()> {
        self.claim(&request.origin, &request.id)?;
        let error = ProtocolError::user_rejected(reason, reasons::SIGN_DATA_DECLINED);
        info!(id = %request.id, reason = %error.message, "sign data rejected");
        self.deliver(&request.origin, &request.id, error_response(&request.id, &error)).await
    }

    // ------------------------------------------------------------------
    // Disconnect
    // ------------------------------------------------------------------

    /// Requester ended its session: drop it and acknowledge.
    pub async fn acknowledge_disconnect(&self, event: &DisconnectEvent) -> ConnectResult<()> {
        let session_id = event.origin.session_key();
        self.sessions.remove_session(&session_id).await;
        self.close_relay_session(&event.origin).await;
        info!(id = %event.id, session_id = %session_id, "requester disconnected");
        self.deliver(&event.origin, &event.id, success_response(&event.id, json!({}))).await
    }

    /// Wallet-initiated disconnect of one session. Notifying the requester is best effort.
    pub async fn disconnect_session(&self, session_id: &str) -> bool {
        if !self.sessions.has_session(session_id) {
            return false;
        }
        let origin = Origin::from_session_key(session_id);
        let id = random_id();
        if let Err(e) = self.transmit(&origin, &id, disconnect_event(&id)).await {
            debug!(session_id, error = %e, "disconnect notice not delivered");
        }
        self.close_relay_session(&origin).await;
        self.sessions.remove_session(session_id).await
    }

    pub async fn disconnect_all(&self) -> usize {
        let mut count = 0;
        for session in self.sessions.list_sessions() {
            if self.disconnect_session(&session.session_id).await {
                count += 1;
            }
        }
        count
    }

    // ------------------------------------------------------------------
    // Errors and transmission
    // ------------------------------------------------------------------

    /// Answer a request the Router refused before it reached a human.
    pub async fn send_error(&self, origin: &Origin, id: &str, method: WireMethod, error: &ProtocolError) -> ConnectResult<()> {
        let body = match method {
            WireMethod::StartConnect => connect_error_event(id, error),
            _ => error_response(id, error),
        };
        self.deliver(origin, id, body).await
    }

    async fn send_terminal_error(&self, request: &DomainRequest, error: &ProtocolError) -> ConnectResult<()> {
        let id = request.id();
        let body = match request.kind() {
            RequestKind::Connect => connect_error_event(id, error),
            _ => error_response(id, error),
        };
        self.deliver(request.origin(), id, body).await
    }

    /// Approval failed after claiming: still owe the requester an answer.
    async fn fail(&self, origin: &Origin, id: &str, error: ConnectError) -> ConnectError {
        warn!(id, error = %error, "approval failed");
        let _ = self.deliver(origin, id, error_response(id, &error.to_protocol())).await;
        error
    }

    async fn close_relay_session(&self, origin: &Origin) {
        let Origin::Remote { session_id } = origin else {
            return;
        };
        if let Some(remote) = self.transport(TransportKind::Remote) {
            if let Err(e) = remote.close_session(session_id).await {
                debug!(session_id = %session_id, error = %e, "relay session close failed");
            }
        }
    }

    fn require(&self, kind: TransportKind) -> ConnectResult<Arc<dyn Transport>> {
        self.transport(kind)
            .ok_or_else(|| ConnectError::Transport(format!("no {} transport attached", kind.as_str())))
    }

    async fn transmit(&self, origin: &Origin, id: &str, body: Value) -> ConnectResult<Value> {
        let transport = self.require(origin.transport())?;
        transport.send(OutboundMessage::new(origin.clone(), id, body)).await
    }

    /// Send a terminal message. Once it has left through the transport the
    /// request counts as answered, acknowledged or not.
    async fn deliver(&self, origin: &Origin, id: &str, body: Value) -> ConnectResult<()> {
        match self.transmit(origin, id, body).await {
            Ok(_) => Ok(()),
            Err(e) if e.was_delivered() => {
                warn!(id, transport = origin.transport().as_str(), error = %e, "response delivered, no acknowledgement");
                Ok(())
            }
            Err(e) => {
                warn!(id, transport = origin.transport().as_str(), error = %e, "response not delivered");
                Err(e)
            }
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingApproval>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }
}

//! Local transport - same-process bridge exposed by the hosting page.
//!
//! No network. The host exposes a bridge object with synchronous primitives
//! and two notification slots this transport installs on `start`:
//!
//! ```text
//! send(msg) ──► post_message(payload) ──► host
//!                                          │
//! on_response_ready(id) ◄──────────────────┘  (notify)
//!     └─► pull_response(id) ──► resolve PendingCorrelation   (pull)
//!
//! on_event_ready() ──► while has_event(frame) { pull_event(frame) } ──► listeners
//!
//! every notification ──► FrameMessenger::deliver(child, notice) for each child frame
//! ```
//!
//! Notifications carry ids only; bodies are pulled separately so payload size
//! never rides on the notification channel. Each frame runs its own instance
//! and ignores correlation ids it did not issue.

use super::{EventCallback, EventListeners, Transport, TransportKind};
use crate::core::keys::{DEFAULT_CORRELATION_TIMEOUT, TOP_FRAME_ID};
use crate::core::protocol::{OutboundMessage, Origin, ProtocolError, RawWireEvent};
use crate::core::random_id;
use crate::error::{ConnectError, ConnectResult};
use crate::subscription::Subscription;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Host-exposed bridge object.
pub trait HostBridge: Send + Sync {
    fn post_message(&self, payload: &str) -> anyhow::Result<()>;
    fn pull_response(&self, message_id: &str) -> Option<String>;
    fn pull_event(&self, frame_id: &str) -> Option<String>;
    fn has_event(&self, frame_id: &str) -> bool;
    /// Install (`Some`) or detach (`None`) the notification slots.
    fn set_callbacks(&self, callbacks: Option<BridgeCallbacks>);
}

/// Notification entry points handed to the host.
#[derive(Clone)]
pub struct BridgeCallbacks {
    pub on_response_ready: Arc<dyn Fn(&str) + Send + Sync>,
    pub on_event_ready: Arc<dyn Fn() + Send + Sync>,
}

/// Notification rebroadcast to child frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FrameNotice {
    ResponseReady { message_id: String },
    EventReady,
}

/// Generic cross-frame messaging primitive.
pub trait FrameMessenger: Send + Sync {
    fn child_frames(&self) -> Vec<String>;
    fn deliver(&self, frame: &str, notice: &FrameNotice) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub top_frame: bool,
    pub timeout: Duration,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self { top_frame: true, timeout: DEFAULT_CORRELATION_TIMEOUT }
    }
}

struct PendingCorrelation {
    created_at: Instant,
    sender: oneshot::Sender<ConnectResult<Value>>,
}

pub struct LocalTransport {
    bridge: Arc<dyn HostBridge>,
    frames: Option<Arc<dyn FrameMessenger>>,
    frame_id: String,
    timeout: Duration,
    pending: Mutex<HashMap<String, PendingCorrelation>>,
    listeners: EventListeners,
    started: AtomicBool,
    destroyed: AtomicBool,
}

impl LocalTransport {
    pub fn new(bridge: Arc<dyn HostBridge>, frames: Option<Arc<dyn FrameMessenger>>, config: LocalConfig) -> Arc<Self> {
        let frame_id = if config.top_frame { TOP_FRAME_ID.to_string() } else { random_id() };
        Arc::new(Self {
            bridge,
            frames,
            frame_id,
            timeout: config.timeout,
            pending: Mutex::new(HashMap::new()),
            listeners: EventListeners::default(),
            started: AtomicBool::new(false),
            destroyed: AtomicBool::new(false),
        })
    }

    /// Install the notification slots on the host bridge.
    pub fn start(self: &Arc<Self>) {
        if self.destroyed.load(Ordering::SeqCst) || self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let on_response = Arc::downgrade(self);
        let on_event = Arc::downgrade(self);
        self.bridge.set_callbacks(Some(BridgeCallbacks {
            on_response_ready: Arc::new(move |message_id: &str| {
                if let Some(transport) = on_response.upgrade() {
                    transport.handle_response_ready(message_id);
                }
            }),
            on_event_ready: Arc::new(move || {
                if let Some(transport) = on_event.upgrade() {
                    transport.handle_event_ready();
                }
            }),
        }));
        debug!(frame_id = %self.frame_id, "local transport started");
    }

    pub fn frame_id(&self) -> &str {
        &self.frame_id
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Entry point for notices rebroadcast by a parent frame.
    pub fn handle_notice(&self, notice: &FrameNotice) {
        match notice {
            FrameNotice::ResponseReady { message_id } => self.handle_response_ready(message_id),
            FrameNotice::EventReady => self.handle_event_ready(),
        }
    }

    /// Host signalled that a response body is ready to pull.
    pub fn handle_response_ready(&self, message_id: &str) {
        let entry = self.lock_pending().remove(message_id);
        match entry {
            Some(pending) => {
                let result = match self.bridge.pull_response(message_id) {
                    Some(raw) => parse_response(&raw),
                    None => Err(ConnectError::Unacknowledged(format!("response {message_id} not available"))),
                };
                debug!(
                    message_id,
                    elapsed_ms = pending.created_at.elapsed().as_millis() as u64,
                    ok = result.is_ok(),
                    "correlation settled"
                );
                let _ = pending.sender.send(result);
            }
            None => debug!(message_id, "no pending correlation, notification ignored"),
        }
        self.rebroadcast(&FrameNotice::ResponseReady { message_id: message_id.to_string() });
    }

    /// Host signalled buffered events; drain this frame's queue.
    pub fn handle_event_ready(&self) {
        let mut drained = 0usize;
        while self.bridge.has_event(&self.frame_id) {
            let Some(raw) = self.bridge.pull_event(&self.frame_id) else {
                break;
            };
            drained += 1;
            match parse_event(&raw, &self.frame_id) {
                Ok(event) => {
                    self.listeners.emit(&event);
                }
                Err(e) => warn!(frame_id = %self.frame_id, error = %e, "malformed bridge event dropped"),
            }
        }
        debug!(frame_id = %self.frame_id, drained, "event queue drained");
        self.rebroadcast(&FrameNotice::EventReady);
    }

    fn rebroadcast(&self, notice: &FrameNotice) {
        let Some(frames) = &self.frames else {
            return;
        };
        for frame in frames.child_frames() {
            if let Err(e) = frames.deliver(&frame, notice) {
                debug!(frame = %frame, error = %e, "frame unreachable, skipped");
            }
        }
    }

    fn lock_pending(&self) -> std::sync::MutexGuard<'_, HashMap<String, PendingCorrelation>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Local
    }

    async fn send(&self, message: OutboundMessage) -> ConnectResult<Value> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ConnectError::Destroyed);
        }
        let correlation_id = random_id();
        let payload = json!({
            "id": correlation_id,
            "frameId": self.frame_id,
            "origin": message.origin,
            "requestId": message.id,
            "body": message.body,
        })
        .to_string();

        let (tx, rx) = oneshot::channel();
        self.lock_pending().insert(
            correlation_id.clone(),
            PendingCorrelation { created_at: Instant::now(), sender: tx },
        );

        if let Err(e) = self.bridge.post_message(&payload) {
            self.lock_pending().remove(&correlation_id);
            return Err(ConnectError::Transport(format!("post_message: {e}")));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConnectError::Destroyed),
            Err(_) => {
                self.lock_pending().remove(&correlation_id);
                warn!(correlation_id = %correlation_id, timeout_ms = self.timeout.as_millis() as u64, "correlation timed out");
                Err(ConnectError::Timeout(self.timeout))
            }
        }
    }

    fn on_event(&self, callback: EventCallback) -> Subscription {
        self.listeners.subscribe(callback)
    }

    fn is_available(&self) -> bool {
        self.started.load(Ordering::SeqCst) && !self.destroyed.load(Ordering::SeqCst)
    }

    async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        let pending: Vec<PendingCorrelation> = self.lock_pending().drain().map(|(_, p)| p).collect();
        let cancelled = pending.len();
        for entry in pending {
            let _ = entry.sender.send(Err(ConnectError::Destroyed));
        }
        self.listeners.clear();
        self.bridge.set_callbacks(None);
        debug!(frame_id = %self.frame_id, cancelled, "local transport destroyed");
    }
}

fn parse_response(raw: &str) -> ConnectResult<Value> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| ConnectError::Unacknowledged(format!("malformed host response: {e}")))?;
    if let Some(error) = value.get("error") {
        let parsed = serde_json::from_value::<ProtocolError>(error.clone())
            .unwrap_or_else(|_| ProtocolError::unknown(error.to_string()));
        return Err(ConnectError::Protocol(parsed));
    }
    Ok(value.get("result").cloned().unwrap_or(value))
}

/// The origin is the frame whose queue produced the event; anything the
/// payload claims about its source is ignored.
fn parse_event(raw: &str, frame_id: &str) -> ConnectResult<RawWireEvent> {
    let value: Value = serde_json::from_str(raw)?;
    RawWireEvent::from_wire(&value, Origin::local(frame_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_error_is_a_protocol_failure() {
        let err = parse_response(r#"{"error":{"code":300,"message":"no"}}"#).unwrap_err();
        assert!(matches!(err, ConnectError::Protocol(ProtocolError { code: 300, .. })));
        assert_eq!(parse_response(r#"{"result":{"ok":true}}"#).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn event_origin_is_the_pulling_frame() {
        let event = parse_event(r#"{"id":5,"method":"signData","params":[]}"#, "top").unwrap();
        assert_eq!(event.id, "5");
        assert_eq!(event.origin, Origin::local("top"));
        let event = parse_event(r#"{"id":"a","method":"x","source":"f2"}"#, "top").unwrap();
        assert_eq!(event.origin, Origin::local("top"));
        assert!(parse_event(r#"{"method":"x"}"#, "top").is_err());
    }
}

//! Relay transport - tokio-tungstenite WebSocket to a message relay.
//!
//! One socket carries every paired session. The relay speaks JSON frames
//! tagged by `type`:
//!
//! | Direction | Frame | Meaning |
//! |-----------|-------|---------|
//! | out | `subscribe { sessions }` | deliver requests for these sessions |
//! | out | `unsubscribe { session_id }` | stop delivering for one session |
//! | out | `message { session_id, id, body }` | response or event for a requester |
//! | out | `ping` | heartbeat |
//! | in  | `request { session_id, message }` | requester message `{id, method, params}` |
//! | in  | `notice { message }` | relay diagnostics |
//! | in  | `pong` | heartbeat answer |
//!
//! Reconnection is internal: after any disconnect the transport waits
//! `reconnect_delay`, reconnects and re-sends its whole subscription set.
//! Outbound frames posted while the socket is down wait in a bounded
//! backlog and go out, in order, once the next connection has subscribed.

use super::{EventCallback, EventListeners, Transport, TransportKind};
use crate::core::keys::{DEFAULT_RELAY_HEARTBEAT, DEFAULT_RELAY_RECONNECT_DELAY, RELAY_BACKLOG};
use crate::core::protocol::{OutboundMessage, Origin, RawWireEvent};
use crate::error::{ConnectError, ConnectResult};
use crate::runtime::Shutdown;
use crate::subscription::Subscription;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Relay connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    pub heartbeat: Duration,
}

impl RelayConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: DEFAULT_RELAY_RECONNECT_DELAY,
            heartbeat: DEFAULT_RELAY_HEARTBEAT,
        }
    }
}

/// Frames exchanged with the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayFrame {
    Subscribe { sessions: Vec<String> },
    Unsubscribe { session_id: String },
    Message { session_id: String, id: String, body: Value },
    Request { session_id: String, message: Value },
    Notice { message: String },
    Ping,
    Pong,
}

impl RelayFrame {
    fn encode(&self) -> ConnectResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Parse relay text frame
pub fn parse_relay_frame(raw: &str) -> Option<RelayFrame> {
    serde_json::from_str(raw).ok()
}

pub struct RelayTransport {
    config: RelayConfig,
    state: RwLock<RelayState>,
    sessions: Mutex<BTreeSet<String>>,
    started: AtomicBool,
    outbound: mpsc::Sender<String>,
    /// Drained by whichever connection is live; frames stay queued between connections.
    backlog: tokio::sync::Mutex<mpsc::Receiver<String>>,
    listeners: EventListeners,
    shutdown: Shutdown,
}

impl RelayTransport {
    pub fn new(config: RelayConfig) -> Arc<Self> {
        let (outbound, backlog) = mpsc::channel(RELAY_BACKLOG);
        Arc::new(Self {
            config,
            state: RwLock::new(RelayState::Disconnected),
            sessions: Mutex::new(BTreeSet::new()),
            started: AtomicBool::new(false),
            outbound,
            backlog: tokio::sync::Mutex::new(backlog),
            listeners: EventListeners::default(),
            shutdown: Shutdown::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn state(&self) -> RelayState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    pub fn sessions(&self) -> Vec<String> {
        self.lock_sessions().iter().cloned().collect()
    }

    /// Start the connection loop with automatic reconnection.
    pub fn start(self: &Arc<Self>, initial_sessions: impl IntoIterator<Item = String>) {
        self.lock_sessions().extend(initial_sessions);
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        let transport = self.clone();
        tokio::spawn(async move {
            loop {
                if transport.shutdown.is_triggered() {
                    break;
                }
                transport.set_state(RelayState::Connecting);
                match connect_async(transport.config.url.as_str()).await {
                    Ok((ws, _)) => {
                        info!(url = %transport.config.url, "relay connected");
                        transport.run_connection(ws).await;
                    }
                    Err(e) => warn!(url = %transport.config.url, error = %e, "relay connect failed"),
                }
                transport.set_state(RelayState::Disconnected);

                tokio::select! {
                    _ = tokio::time::sleep(transport.config.reconnect_delay) => {
                        info!(url = %transport.config.url, "Reconnecting to relay");
                    }
                    _ = transport.shutdown.wait() => break,
                }
            }
            debug!(url = %transport.config.url, "relay loop stopped");
        });
    }

    async fn run_connection<S>(&self, ws: tokio_tungstenite::WebSocketStream<S>)
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws.split();
        let mut backlog = self.backlog.lock().await;

        // Same lock as open/close_session: a session added from here on sees
        // Connected and posts its own subscribe behind this snapshot.
        let sessions = {
            let guard = self.lock_sessions();
            self.set_state(RelayState::Connected);
            let snapshot: Vec<String> = guard.iter().cloned().collect();
            snapshot
        };
        if !sessions.is_empty() {
            match (RelayFrame::Subscribe { sessions }).encode() {
                Ok(frame) => {
                    if write.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                Err(e) => warn!(error = %e, "subscription frame not encodable"),
            }
        }

        let start = tokio::time::Instant::now() + self.config.heartbeat;
        let mut heartbeat = tokio::time::interval_at(start, self.config.heartbeat);
        let mut shutdown = self.shutdown.subscribe();
        if self.shutdown.is_triggered() {
            let _ = write.close().await;
            return;
        }

        loop {
            tokio::select! {
                outgoing = backlog.recv() => {
                    let Some(text) = outgoing else { break };
                    if let Err(e) = write.send(Message::Text(text)).await {
                        warn!(error = %e, "relay write failed");
                        break;
                    }
                }
                incoming = read.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text),
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "relay read failed");
                        break;
                    }
                },
                _ = heartbeat.tick() => {
                    if let Ok(frame) = RelayFrame::Ping.encode() {
                        if write.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    let _ = write.close().await;
                    break;
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match parse_relay_frame(text) {
            Some(RelayFrame::Request { session_id, message }) => {
                if !self.lock_sessions().contains(&session_id) {
                    debug!(session_id = %session_id, "request for unsubscribed session ignored");
                    return;
                }
                match RawWireEvent::from_wire(&message, Origin::remote(session_id.clone())) {
                    Ok(event) => {
                        debug!(session_id = %session_id, id = %event.id, method = %event.method, "relay request");
                        self.listeners.emit(&event);
                    }
                    Err(e) => warn!(session_id = %session_id, error = %e, "malformed relay request dropped"),
                }
            }
            Some(RelayFrame::Notice { message }) => info!(url = %self.config.url, notice = %message, "relay notice"),
            Some(RelayFrame::Pong) => debug!("relay pong"),
            Some(other) => debug!(frame = ?other, "unexpected relay frame ignored"),
            None => warn!("unparseable relay frame dropped"),
        }
    }

    /// Queue a frame for the current or next connection.
    fn post(&self, frame: RelayFrame) -> ConnectResult<()> {
        if !self.started.load(Ordering::SeqCst) {
            return Err(ConnectError::Transport("relay not started".into()));
        }
        match self.outbound.try_send(frame.encode()?) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(ConnectError::Transport("relay backlog full".into())),
            Err(TrySendError::Closed(_)) => Err(ConnectError::Destroyed),
        }
    }

    fn set_state(&self, state: RelayState) {
        *self.state.write().unwrap_or_else(|p| p.into_inner()) = state;
    }

    fn lock_sessions(&self) -> std::sync::MutexGuard<'_, BTreeSet<String>> {
        self.sessions.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl Transport for RelayTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Remote
    }

    async fn send(&self, message: OutboundMessage) -> ConnectResult<Value> {
        let Origin::Remote { session_id } = message.origin else {
            return Err(ConnectError::Transport("relay cannot address a local origin".into()));
        };
        if self.shutdown.is_triggered() {
            return Err(ConnectError::Destroyed);
        }
        let id = message.id;
        let connected = self.state() == RelayState::Connected;
        self.post(RelayFrame::Message { session_id: session_id.clone(), id: id.clone(), body: message.body })?;
        debug!(session_id = %session_id, id = %id, connected, "relay message queued");
        Ok(json!({"delivered": connected, "queued": !connected}))
    }

    fn on_event(&self, callback: EventCallback) -> Subscription {
        self.listeners.subscribe(callback)
    }

    fn is_available(&self) -> bool {
        !self.shutdown.is_triggered() && self.state() == RelayState::Connected
    }

    async fn open_session(&self, session_id: &str) -> ConnectResult<()> {
        let connected = {
            let mut sessions = self.lock_sessions();
            if !sessions.insert(session_id.to_string()) {
                return Ok(());
            }
            self.state() == RelayState::Connected
        };
        // Offline: the next connection subscribes the full set.
        if connected {
            self.post(RelayFrame::Subscribe { sessions: vec![session_id.to_string()] })?;
        }
        debug!(session_id, "relay session opened");
        Ok(())
    }

    async fn close_session(&self, session_id: &str) -> ConnectResult<()> {
        let connected = {
            let mut sessions = self.lock_sessions();
            sessions.remove(session_id) && self.state() == RelayState::Connected
        };
        if connected {
            self.post(RelayFrame::Unsubscribe { session_id: session_id.to_string() })?;
        }
        Ok(())
    }

    async fn destroy(&self) {
        if self.shutdown.is_triggered() {
            return;
        }
        self.shutdown.trigger();
        self.listeners.clear();
        self.set_state(RelayState::Disconnected);
        info!(url = %self.config.url, "relay transport destroyed");
    }
}

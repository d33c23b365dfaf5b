//! Bridges carrying protocol messages between the wallet and requesters.
//!
//! | Transport | Carrier | Origin |
//! |-----------|---------|--------|
//! | [`RelayTransport`] | WebSocket relay, reconnecting | `Origin::Remote { session_id }` |
//! | [`LocalTransport`] | host bridge object + frame rebroadcast | `Origin::Local { frame_id }` |
//!
//! Both implement [`Transport`], so routing and processing never care which
//! one an event came from.

pub mod local;
pub mod relay;

pub use local::{BridgeCallbacks, FrameMessenger, FrameNotice, HostBridge, LocalConfig, LocalTransport};
pub use relay::{RelayConfig, RelayState, RelayTransport};

pub use crate::core::protocol::TransportKind;
use crate::core::protocol::{OutboundMessage, RawWireEvent};
use crate::error::ConnectResult;
use crate::subscription::Subscription;
use async_trait::async_trait;
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::error;

pub type EventCallback = Arc<dyn Fn(RawWireEvent) + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Deliver a message; resolves with whatever the far side answered.
    async fn send(&self, message: OutboundMessage) -> ConnectResult<Value>;

    fn on_event(&self, callback: EventCallback) -> Subscription;

    fn is_available(&self) -> bool;

    /// Start receiving traffic for a newly paired session.
    async fn open_session(&self, _session_id: &str) -> ConnectResult<()> {
        Ok(())
    }

    async fn close_session(&self, _session_id: &str) -> ConnectResult<()> {
        Ok(())
    }

    async fn destroy(&self);
}

/// Inbound event subscribers of one transport instance.
#[derive(Clone, Default)]
pub struct EventListeners {
    inner: Arc<Mutex<Vec<(u64, EventCallback)>>>,
    next_id: Arc<AtomicU64>,
}

impl EventListeners {
    pub fn subscribe(&self, callback: EventCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).push((id, callback));
        let listeners = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.lock().unwrap_or_else(|p| p.into_inner()).retain(|(i, _)| *i != id);
            }
        })
    }

    /// Deliver to every listener; a panicking listener does not stop the rest.
    /// Returns how many listeners completed.
    pub fn emit(&self, event: &RawWireEvent) -> usize {
        let snapshot: Vec<EventCallback> = self
            .inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();
        let mut delivered = 0;
        for callback in snapshot {
            match catch_unwind(AssertUnwindSafe(|| callback(event.clone()))) {
                Ok(()) => delivered += 1,
                Err(_) => error!(id = %event.id, method = %event.method, "event listener panicked"),
            }
        }
        delivered
    }

    pub fn clear(&self) {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

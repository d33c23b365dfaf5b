//! One application callback per request kind.

use super::request::{ConnectRequest, DisconnectEvent, DomainRequest, SignDataRequest, TransactionRequest};
use crate::subscription::Subscription;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Callback<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Slot<T> {
    inner: Arc<Mutex<Option<(u64, Callback<T>)>>>,
}

impl<T: 'static> Slot<T> {
    fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(None)) }
    }

    fn set(&self, id: u64, callback: Callback<T>) -> Subscription {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner()) = Some((id, callback));
        let slot = Arc::downgrade(&self.inner);
        Subscription::new(id, move || {
            if let Some(slot) = slot.upgrade() {
                let mut guard = slot.lock().unwrap_or_else(|p| p.into_inner());
                // A newer registration owns the slot now.
                if guard.as_ref().map(|(current, _)| *current) == Some(id) {
                    *guard = None;
                }
            }
        })
    }

    fn get(&self) -> Option<Callback<T>> {
        self.inner
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .map(|(_, cb)| cb.clone())
    }

    fn clear(&self) {
        *self.inner.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }

    fn call(&self, value: T) -> bool {
        match self.get() {
            Some(cb) => {
                cb(value);
                true
            }
            None => false,
        }
    }
}

pub struct RequestCallbacks {
    connect: Slot<ConnectRequest>,
    transaction: Slot<TransactionRequest>,
    sign_data: Slot<SignDataRequest>,
    disconnect: Slot<DisconnectEvent>,
    next_id: AtomicU64,
}

impl Default for RequestCallbacks {
    fn default() -> Self {
        Self {
            connect: Slot::new(),
            transaction: Slot::new(),
            sign_data: Slot::new(),
            disconnect: Slot::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl RequestCallbacks {
    fn next(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Replaces any previous connect callback.
    pub fn on_connect(&self, cb: impl Fn(ConnectRequest) + Send + Sync + 'static) -> Subscription {
        self.connect.set(self.next(), Arc::new(cb))
    }

    pub fn on_transaction(&self, cb: impl Fn(TransactionRequest) + Send + Sync + 'static) -> Subscription {
        self.transaction.set(self.next(), Arc::new(cb))
    }

    pub fn on_sign_data(&self, cb: impl Fn(SignDataRequest) + Send + Sync + 'static) -> Subscription {
        self.sign_data.set(self.next(), Arc::new(cb))
    }

    pub fn on_disconnect(&self, cb: impl Fn(DisconnectEvent) + Send + Sync + 'static) -> Subscription {
        self.disconnect.set(self.next(), Arc::new(cb))
    }

    /// Hand a request to its callback. False when none is registered.
    pub fn dispatch(&self, request: DomainRequest) -> bool {
        match request {
            DomainRequest::Connect(r) => self.connect.call(r),
            DomainRequest::Transaction(r) => self.transaction.call(r),
            DomainRequest::SignData(r) => self.sign_data.call(r),
            DomainRequest::Disconnect(r) => self.disconnect.call(r),
        }
    }

    pub fn clear(&self) {
        self.connect.clear();
        self.transaction.clear();
        self.sign_data.clear();
        self.disconnect.clear();
    }
}

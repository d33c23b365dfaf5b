//! Beeconnect: wallet-side connect engine. Untrusted apps ask, a human decides,
//! exactly one answer goes back.
//!
//! # Architecture
//!
//! ```text
//! Engine (entry point)
//!   │
//!   ├── SessionManager ── Storage (opaque async key-value)
//!   ├── WalletRegistry ── WalletHandle ── dyn WalletSigner (host-supplied)
//!   │
//!   ├── Router
//!   │     ├── ConnectHandler ──► ManifestFetcher (HTTP, non-fatal)
//!   │     ├── TransactionHandler
//!   │     ├── SignDataHandler
//!   │     └── DisconnectHandler
//!   │
//!   ├── RequestProcessor (pending approvals, approve/reject, timeouts)
//!   │
//!   └── Transports
//!         ├── RelayTransport  (WebSocket relay, reconnecting)
//!         └── LocalTransport  (host bridge, notify + pull, frame fan-out)
//! ```
//!
//! # Request flow
//!
//! | Step | Component | Result |
//! |------|-----------|--------|
//! | 1 | transport | `RawWireEvent` with its `Origin` |
//! | 2 | `Router::route_event` | `DomainRequest`, protocol refusal, or drop |
//! | 3 | `RequestProcessor::track` | approval clock started |
//! | 4 | application callback | human sees a sanitized request |
//! | 5 | `approve_*` / `reject_*` / timeout | exactly one response on the origin transport |
//!
//! # Usage
//!
//! ```ignore
//! use beeconnect::{Collaborators, Engine, EngineConfig};
//!
//! let engine = Engine::start(
//!     EngineConfig::new("mywallet").with_relay("wss://relay.example/bridge"),
//!     Collaborators::for_app("mywallet")?,
//! ).await?;
//!
//! engine.register_wallet(wallet).await;
//! let on_connect = engine.clone();
//! let _sub = engine.on_connect(move |request| {
//!     // show request.preview to the user, later:
//!     // on_connect.approve_connect(&request.with_wallet(chosen)).await
//! });
//! engine.handle_connection_link("tc://?v=2&id=...&r=...").await?;
//! ```

pub mod core;
pub mod engine;
pub mod error;
pub mod logging;
pub mod processor;
pub mod router;
pub mod runtime;
pub mod session;
pub mod storage;
pub mod subscription;
pub mod transport;
pub mod wallet;

#[cfg(feature = "server")]
pub mod server;

// =============================================================================
// Re-exports
// =============================================================================
pub use crate::core::link::ConnectionLink;
pub use crate::core::protocol::{DeviceInfo, Network, Origin, OutboundMessage, ProtocolError, RawWireEvent, WireMethod};
pub use engine::{Collaborators, Engine, EngineConfig, EventDisposition};
pub use error::{ConnectError, ConnectResult};
pub use processor::{PendingSummary, RequestProcessor, SignDataResult, SignedTransaction};
pub use router::{
    ConnectRequest, DisconnectEvent, DomainRequest, ManifestFetcher, SignDataRequest, TransactionRequest,
};
pub use runtime::{install_signal_handlers, Shutdown};
pub use session::{Session, SessionManager};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use subscription::Subscription;
pub use transport::{HostBridge, FrameMessenger, LocalTransport, RelayTransport, Transport};
pub use wallet::{WalletHandle, WalletRegistry, WalletSigner, WalletVersion};

#[cfg(feature = "server")]
pub use server::{create_router, ServerConfig};

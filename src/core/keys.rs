//! Storage keys and default timings.

use std::time::Duration;

/// Storage keys
pub mod storage {
    pub const SESSIONS: &str = "sessions";
    pub const WALLETS: &str = "wallets";
}

/// Frame id of the top-level page.
pub const TOP_FRAME_ID: &str = "top";

pub const DEFAULT_CORRELATION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SESSION_MAX_INACTIVE_HOURS: u64 = 24;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_RELAY_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_RELAY_HEARTBEAT: Duration = Duration::from_secs(30);
/// Frames held for the relay while it is reconnecting.
pub const RELAY_BACKLOG: usize = 256;
pub const DEFAULT_MANIFEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Default rejection reasons
pub mod reasons {
    pub const CONNECT_DECLINED: &str = "User declined the connection";
    pub const TRANSACTION_DECLINED: &str = "User declined the transaction";
    pub const SIGN_DATA_DECLINED: &str = "User declined to sign data";
    pub const EXPIRED: &str = "Request expired before the user answered";
    pub const SHUTTING_DOWN: &str = "Wallet is shutting down";
}

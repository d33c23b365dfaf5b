//! Engine configuration - constructed by the application host

use crate::core::keys::{
    DEFAULT_APPROVAL_TIMEOUT, DEFAULT_CORRELATION_TIMEOUT, DEFAULT_RELAY_HEARTBEAT, DEFAULT_RELAY_RECONNECT_DELAY,
    DEFAULT_SESSION_MAX_INACTIVE_HOURS, DEFAULT_SWEEP_INTERVAL,
};
use crate::core::protocol::{DeviceInfo, Network};
use crate::error::{ConnectError, ConnectResult};
use crate::transport::{LocalConfig, RelayConfig};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Storage namespace.
    pub app: String,
    pub relay_url: Option<String>,
    pub network: Network,
    pub device: DeviceInfo,
    pub approval_timeout: Duration,
    pub correlation_timeout: Duration,
    pub session_max_inactive_hours: u64,
    pub sweep_interval: Duration,
    pub relay_reconnect_delay: Duration,
    pub relay_heartbeat: Duration,
    pub top_frame: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app: "beeconnect".into(),
            relay_url: None,
            network: Network::default(),
            device: DeviceInfo::default(),
            approval_timeout: DEFAULT_APPROVAL_TIMEOUT,
            correlation_timeout: DEFAULT_CORRELATION_TIMEOUT,
            session_max_inactive_hours: DEFAULT_SESSION_MAX_INACTIVE_HOURS,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            relay_reconnect_delay: DEFAULT_RELAY_RECONNECT_DELAY,
            relay_heartbeat: DEFAULT_RELAY_HEARTBEAT,
            top_frame: true,
        }
    }
}

impl EngineConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }
    pub fn with_relay(mut self, url: impl Into<String>) -> Self { self.relay_url = Some(url.into()); self }
    pub fn with_network(mut self, network: Network) -> Self { self.network = network; self }
    pub fn with_device(mut self, device: DeviceInfo) -> Self { self.device = device; self }
    pub fn with_approval_timeout(mut self, t: Duration) -> Self { self.approval_timeout = t; self }
    pub fn with_correlation_timeout(mut self, t: Duration) -> Self { self.correlation_timeout = t; self }
    pub fn with_session_max_inactive_hours(mut self, hours: u64) -> Self { self.session_max_inactive_hours = hours; self }
    pub fn with_sweep_interval(mut self, t: Duration) -> Self { self.sweep_interval = t; self }
    pub fn nested_frame(mut self) -> Self { self.top_frame = false; self }

    pub fn validate(&self) -> ConnectResult<()> {
        if self.app.trim().is_empty() {
            return Err(ConnectError::Config("app name is empty".into()));
        }
        if let Some(url) = &self.relay_url {
            let parsed = url::Url::parse(url).map_err(|e| ConnectError::Config(format!("relay url: {e}")))?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(ConnectError::Config(format!("relay url must be ws(s): {url}")));
            }
        }
        if self.approval_timeout.is_zero() || self.correlation_timeout.is_zero() || self.sweep_interval.is_zero() {
            return Err(ConnectError::Config("timeouts and intervals must be non-zero".into()));
        }
        if self.device.max_messages == 0 {
            return Err(ConnectError::Config("device must accept at least one message".into()));
        }
        Ok(())
    }

    pub fn relay_config(&self) -> Option<RelayConfig> {
        self.relay_url.as_ref().map(|url| RelayConfig {
            url: url.clone(),
            reconnect_delay: self.relay_reconnect_delay,
            heartbeat: self.relay_heartbeat,
        })
    }

    pub fn local_config(&self) -> LocalConfig {
        LocalConfig { top_frame: self.top_frame, timeout: self.correlation_timeout }
    }

    /// Overrides from `BEECONNECT_*` environment variables.
    pub fn apply_env(mut self) -> Self {
        if let Ok(url) = std::env::var("BEECONNECT_RELAY_URL") {
            if !url.trim().is_empty() {
                self.relay_url = Some(url.trim().to_string());
            }
        }
        if let Some(network) = std::env::var("BEECONNECT_NETWORK").ok().and_then(|v| Network::from_str(&v)) {
            self.network = network;
        }
        if let Some(secs) = std::env::var("BEECONNECT_APPROVAL_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()) {
            self.approval_timeout = Duration::from_secs(secs);
        }
        if let Some(hours) = std::env::var("BEECONNECT_SESSION_MAX_INACTIVE_HOURS").ok().and_then(|v| v.parse().ok()) {
            self.session_max_inactive_hours = hours;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::new("wallet");
        assert!(config.validate().is_ok());
        assert_eq!(config.session_max_inactive_hours, 24);
        assert_eq!(config.local_config().timeout, Duration::from_secs(30));
        assert!(config.relay_config().is_none());
    }

    #[test]
    fn rejects_non_websocket_relay() {
        let config = EngineConfig::new("wallet").with_relay("https://relay.example");
        assert!(matches!(config.validate(), Err(ConnectError::Config(_))));
        let config = EngineConfig::new("wallet").with_relay("wss://relay.example/bridge");
        assert_eq!(config.relay_config().unwrap().url, "wss://relay.example/bridge");
    }
}

//! Wire vocabulary shared by both bridges.
//!
//! Inbound traffic arrives as [`RawWireEvent`]s; outbound traffic leaves as
//! [`OutboundMessage`]s whose body is one of the response/event shapes built
//! here. Nothing in this module performs I/O.

use crate::error::{ConnectError, ConnectResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Wire error codes understood by requesting applications.
pub mod codes {
    pub const UNKNOWN: u16 = 0;
    pub const BAD_REQUEST: u16 = 1;
    pub const MANIFEST_NOT_FOUND: u16 = 2;
    pub const UNKNOWN_APP: u16 = 100;
    pub const USER_REJECTED: u16 = 300;
    pub const METHOD_NOT_SUPPORTED: u16 = 400;
}

/// Highest protocol version this wallet speaks.
pub const PROTOCOL_VERSION: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolError {
    pub code: u16,
    pub message: String,
}

impl ProtocolError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
    pub fn unknown(message: impl Into<String>) -> Self { Self::new(codes::UNKNOWN, message) }
    pub fn bad_request(message: impl Into<String>) -> Self { Self::new(codes::BAD_REQUEST, message) }
    pub fn unknown_app(message: impl Into<String>) -> Self { Self::new(codes::UNKNOWN_APP, message) }
    pub fn method_not_supported(message: impl Into<String>) -> Self {
        Self::new(codes::METHOD_NOT_SUPPORTED, message)
    }

    /// "User rejected" with a fallback reason.
    pub fn user_rejected(reason: Option<&str>, default: &str) -> Self {
        let message = reason
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(default);
        Self::new(codes::USER_REJECTED, message)
    }

    pub fn to_wire(&self) -> Value {
        json!({"code": self.code, "message": self.message})
    }
}

/// Closed set of wire methods a handler can claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WireMethod {
    StartConnect,
    SendTransaction,
    SignData,
    Disconnect,
}

impl WireMethod {
    pub const ALL: [WireMethod; 4] = [
        WireMethod::StartConnect,
        WireMethod::SendTransaction,
        WireMethod::SignData,
        WireMethod::Disconnect,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WireMethod::StartConnect => "startConnect",
            WireMethod::SendTransaction => "sendTransaction",
            WireMethod::SignData => "signData",
            WireMethod::Disconnect => "disconnect",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        WireMethod::ALL.into_iter().find(|m| m.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Remote,
    Local,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Remote => "remote",
            TransportKind::Local => "local",
        }
    }
}

/// Routing address of an inbound event: where its answer must go.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "lowercase")]
pub enum Origin {
    Remote { session_id: String },
    Local { frame_id: String },
}

impl Origin {
    pub fn remote(session_id: impl Into<String>) -> Self {
        Origin::Remote { session_id: session_id.into() }
    }

    pub fn local(frame_id: impl Into<String>) -> Self {
        Origin::Local { frame_id: frame_id.into() }
    }

    pub fn transport(&self) -> TransportKind {
        match self {
            Origin::Remote { .. } => TransportKind::Remote,
            Origin::Local { .. } => TransportKind::Local,
        }
    }

    /// Session id under which a pairing from this origin is stored.
    pub fn session_key(&self) -> String {
        match self {
            Origin::Remote { session_id } => session_id.clone(),
            Origin::Local { frame_id } => format!("local:{frame_id}"),
        }
    }

    /// Inverse of [`Origin::session_key`].
    pub fn from_session_key(key: &str) -> Self {
        match key.strip_prefix("local:") {
            Some(frame_id) => Origin::local(frame_id),
            None => Origin::remote(key),
        }
    }
}

/// An inbound message before normalization. Never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawWireEvent {
    pub id: String,
    pub method: String,
    pub origin: Origin,
    #[serde(default)]
    pub params: Value,
    pub timestamp: DateTime<Utc>,
}

impl RawWireEvent {
    pub fn new(id: impl Into<String>, method: impl Into<String>, origin: Origin, params: Value) -> Self {
        Self {
            id: id.into(),
            method: method.into(),
            origin,
            params,
            timestamp: Utc::now(),
        }
    }

    /// Build from a `{id, method, params}` message as sent by requesters.
    pub fn from_wire(value: &Value, origin: Origin) -> ConnectResult<Self> {
        let id = match value.get("id") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(ConnectError::Protocol(ProtocolError::bad_request("message id missing"))),
        };
        let method = value.get("method").and_then(Value::as_str).unwrap_or_default();
        let params = value.get("params").cloned().unwrap_or(Value::Null);
        Ok(Self::new(id, method, origin, params))
    }

    pub fn wire_method(&self) -> Option<WireMethod> {
        WireMethod::parse(&self.method)
    }

    /// Request parameters as a single JSON object.
    ///
    /// Requesters send either an object, or an array whose first element is
    /// the object or its JSON-encoded string.
    pub fn params_object(&self) -> ConnectResult<Value> {
        let first = match &self.params {
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        let value = match first {
            Value::String(s) => serde_json::from_str(&s)
                .map_err(|e| ProtocolError::bad_request(format!("params not JSON: {e}")))?,
            other => other,
        };
        if !value.is_object() {
            return Err(ConnectError::Protocol(ProtocolError::bad_request("params must be an object")));
        }
        Ok(value)
    }
}

/// Message handed to a transport for delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub origin: Origin,
    pub id: String,
    pub body: Value,
}

impl OutboundMessage {
    pub fn new(origin: Origin, id: impl Into<String>, body: Value) -> Self {
        Self { origin, id: id.into(), body }
    }
}

pub fn success_response(id: &str, result: Value) -> Value {
    json!({"id": id, "result": result})
}

pub fn error_response(id: &str, error: &ProtocolError) -> Value {
    json!({"id": id, "error": error.to_wire()})
}

pub fn connect_event(id: &str, payload: Value) -> Value {
    json!({"event": "connect", "id": id, "payload": payload})
}

pub fn connect_error_event(id: &str, error: &ProtocolError) -> Value {
    json!({"event": "connect_error", "id": id, "payload": error.to_wire()})
}

pub fn disconnect_event(id: &str) -> Value {
    json!({"event": "disconnect", "id": id, "payload": {}})
}

/// Chain the wallet operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    /// Chain id as written on the wire.
    pub fn chain_id(&self) -> &'static str {
        match self {
            Network::Mainnet => "-239",
            Network::Testnet => "-3",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mainnet" | "-239" => Some(Network::Mainnet),
            "testnet" | "-3" => Some(Network::Testnet),
            _ => None,
        }
    }
}

/// Wallet device description sent with every connect success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub platform: String,
    pub app_name: String,
    pub app_version: String,
    pub max_messages: usize,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            platform: std::env::consts::OS.to_string(),
            app_name: "beeconnect".into(),
            app_version: env!("CARGO_PKG_VERSION").into(),
            max_messages: 4,
        }
    }
}

impl DeviceInfo {
    pub fn to_wire(&self) -> Value {
        json!({
            "platform": self.platform,
            "appName": self.app_name,
            "appVersion": self.app_version,
            "maxProtocolVersion": PROTOCOL_VERSION,
            "features": [
                "SendTransaction",
                {"name": "SendTransaction", "maxMessages": self.max_messages},
                {"name": "SignData", "types": ["text", "binary", "cell"]}
            ]
        })
    }
}

//! Error types shared by every component.

use crate::core::protocol::ProtocolError;
use thiserror::Error;

pub type ConnectResult<T> = Result<T, ConnectError>;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("storage: {0}")]
    Storage(String),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("transport: {0}")]
    Transport(String),

    /// A correlated request saw no response before its deadline.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("transport destroyed")]
    Destroyed,

    /// The message was handed over but its acknowledgement was unusable.
    #[error("delivered, acknowledgement unusable: {0}")]
    Unacknowledged(String),

    /// Error reported by, or to be reported to, the requesting application.
    #[error("protocol error {}: {}", .0.code, .0.message)]
    Protocol(ProtocolError),

    #[error("no wallet selected for request {0}")]
    NoWallet(String),

    #[error("no session: {0}")]
    NoSession(String),

    #[error("signing failed: {0}")]
    Signing(#[source] anyhow::Error),

    #[error("request {0} already settled")]
    AlreadySettled(String),

    #[error("unknown request: {0}")]
    UnknownRequest(String),

    #[error("invalid connection link: {0}")]
    InvalidLink(String),

    #[error("config: {0}")]
    Config(String),

    #[error("handler already registered for {0}")]
    DuplicateHandler(&'static str),
}

impl ConnectError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ConnectError::Timeout(_))
    }

    /// The message left through the transport; only the far side's
    /// acknowledgement failed or never came. Must not be answered again.
    pub fn was_delivered(&self) -> bool {
        matches!(
            self,
            ConnectError::Timeout(_) | ConnectError::Protocol(_) | ConnectError::Unacknowledged(_)
        )
    }

    /// Protocol-level error to send back when this failure ends a request.
    pub fn to_protocol(&self) -> ProtocolError {
        match self {
            ConnectError::Protocol(e) => e.clone(),
            ConnectError::NoSession(_) | ConnectError::NoWallet(_) => {
                ProtocolError::unknown_app("No active session for this application")
            }
            other => ProtocolError::unknown(other.to_string()),
        }
    }
}

impl From<ProtocolError> for ConnectError {
    fn from(e: ProtocolError) -> Self {
        ConnectError::Protocol(e)
    }
}

//! Per-method handlers. Each claims exactly one wire method.

mod connect;
mod disconnect;
mod sign_data;
mod transaction;

pub use connect::ConnectHandler;
pub use disconnect::DisconnectHandler;
pub use sign_data::SignDataHandler;
pub use transaction::TransactionHandler;

use crate::core::protocol::ProtocolError;
use crate::error::ConnectError;

fn bad_request(message: impl Into<String>) -> ConnectError {
    ConnectError::Protocol(ProtocolError::bad_request(message))
}

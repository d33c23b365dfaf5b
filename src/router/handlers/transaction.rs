//! sendTransaction - validates the transfer against the session wallet.

use super::bad_request;
use crate::core::protocol::{Network, RawWireEvent, WireMethod};
use crate::error::{ConnectError, ConnectResult};
use crate::router::request::{DomainRequest, TransactionRequest};
use crate::router::{Handler, RouteContext};
use crate::wallet::TransactionMessage;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

pub struct TransactionHandler {
    network: Network,
    max_messages: usize,
}

impl TransactionHandler {
    pub fn new(network: Network, max_messages: usize) -> Self {
        Self { network, max_messages }
    }
}

#[async_trait]
impl Handler for TransactionHandler {
    fn method(&self) -> WireMethod {
        WireMethod::SendTransaction
    }

    async fn handle(&self, event: &RawWireEvent, context: &RouteContext) -> ConnectResult<DomainRequest> {
        let wallet = context
            .wallet
            .clone()
            .ok_or_else(|| ConnectError::NoSession(event.origin.session_key()))?;
        let params = event.params_object()?;

        let messages: Vec<TransactionMessage> = match params.get("messages") {
            Some(raw) => serde_json::from_value(raw.clone()).map_err(|e| bad_request(format!("messages: {e}")))?,
            None => return Err(bad_request("messages missing")),
        };
        if messages.is_empty() {
            return Err(bad_request("messages empty"));
        }
        if messages.len() > self.max_messages {
            return Err(bad_request(format!("at most {} messages per transaction", self.max_messages)));
        }
        for message in &messages {
            if message.address.trim().is_empty() {
                return Err(bad_request("message address missing"));
            }
            if message.amount.is_empty() || !message.amount.chars().all(|c| c.is_ascii_digit()) {
                return Err(bad_request(format!("invalid amount: {}", message.amount)));
            }
        }

        let valid_until = params
            .get("valid_until")
            .or_else(|| params.get("validUntil"))
            .and_then(Value::as_i64);
        if let Some(deadline) = valid_until {
            if deadline < Utc::now().timestamp() {
                return Err(bad_request("transaction already expired"));
            }
        }

        let from = params.get("from").and_then(Value::as_str).map(str::to_string);
        if let Some(from) = &from {
            if *from != wallet.address() {
                return Err(bad_request("from does not match the connected wallet"));
            }
        }
        if let Some(network) = params.get("network").and_then(Value::as_str) {
            if network != self.network.chain_id() {
                return Err(bad_request(format!("wrong network {network}")));
            }
        }

        Ok(DomainRequest::Transaction(TransactionRequest {
            id: event.id.clone(),
            origin: event.origin.clone(),
            messages,
            valid_until,
            from,
            wallet,
        }))
    }
}

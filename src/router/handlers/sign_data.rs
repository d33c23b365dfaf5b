//! signData - text, binary or cell payloads.

use super::bad_request;
use crate::core::protocol::{RawWireEvent, WireMethod};
use crate::error::{ConnectError, ConnectResult};
use crate::router::request::{DomainRequest, SignDataPayload, SignDataRequest};
use crate::router::{Handler, RouteContext};
use async_trait::async_trait;

pub struct SignDataHandler;

#[async_trait]
impl Handler for SignDataHandler {
    fn method(&self) -> WireMethod {
        WireMethod::SignData
    }

    async fn handle(&self, event: &RawWireEvent, context: &RouteContext) -> ConnectResult<DomainRequest> {
        let wallet = context
            .wallet
            .clone()
            .ok_or_else(|| ConnectError::NoSession(event.origin.session_key()))?;
        let payload: SignDataPayload = serde_json::from_value(event.params_object()?)
            .map_err(|e| bad_request(format!("sign data payload: {e}")))?;
        // Reject undecodable payloads before they reach a human.
        payload.bytes()?;

        Ok(DomainRequest::SignData(SignDataRequest {
            id: event.id.clone(),
            origin: event.origin.clone(),
            payload,
            wallet,
        }))
    }
}

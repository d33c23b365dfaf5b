//! disconnect - requester ends its session.

use crate::core::protocol::{RawWireEvent, WireMethod};
use crate::error::ConnectResult;
use crate::router::request::{DisconnectEvent, DomainRequest};
use crate::router::{Handler, RouteContext};
use async_trait::async_trait;

pub struct DisconnectHandler;

#[async_trait]
impl Handler for DisconnectHandler {
    fn method(&self) -> WireMethod {
        WireMethod::Disconnect
    }

    async fn handle(&self, event: &RawWireEvent, context: &RouteContext) -> ConnectResult<DomainRequest> {
        Ok(DomainRequest::Disconnect(DisconnectEvent {
            id: event.id.clone(),
            origin: event.origin.clone(),
            wallet_address: context.wallet.as_ref().map(|w| w.address()),
        }))
    }
}

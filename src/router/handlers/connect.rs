//! startConnect - builds a ConnectRequest, fetching the app manifest.

use super::bad_request;
use crate::core::protocol::{RawWireEvent, WireMethod};
use crate::core::sanitize::{sanitize, sanitize_url};
use crate::error::ConnectResult;
use crate::router::manifest::ManifestFetcher;
use crate::router::request::{AppPreview, ConnectItem, ConnectRequest, DomainRequest};
use crate::router::{Handler, RouteContext};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Longest proof payload accepted from a requester.
const MAX_PROOF_PAYLOAD: usize = 512;

pub struct ConnectHandler {
    fetcher: Arc<dyn ManifestFetcher>,
}

impl ConnectHandler {
    pub fn new(fetcher: Arc<dyn ManifestFetcher>) -> Self {
        Self { fetcher }
    }

    async fn preview(&self, manifest_url: &str) -> AppPreview {
        match self.fetcher.fetch(manifest_url).await {
            Ok(manifest) => manifest.preview(),
            Err(e) => {
                warn!(manifest_url, error = %e, "manifest fetch failed, continuing without preview");
                AppPreview::default()
            }
        }
    }
}

#[async_trait]
impl Handler for ConnectHandler {
    fn method(&self) -> WireMethod {
        WireMethod::StartConnect
    }

    async fn handle(&self, event: &RawWireEvent, _context: &RouteContext) -> ConnectResult<DomainRequest> {
        let params = event.params_object()?;
        let manifest_url = sanitize_url(params.get("manifestUrl").and_then(Value::as_str).unwrap_or(""));
        if manifest_url.is_empty() {
            return Err(bad_request("manifestUrl missing or not an http(s) URL"));
        }
        let items = parse_items(params.get("items"))?;
        let preview = self.preview(&manifest_url).await;

        let mut request = ConnectRequest {
            id: event.id.clone(),
            origin: event.origin.clone(),
            app_name: preview.name.clone(),
            manifest_url,
            preview,
            items,
            wallet: None,
        };
        if request.app_name.is_empty() {
            request.app_name = sanitize(&request.domain());
        }
        debug!(id = %request.id, app = %request.app_name, "connect request parsed");
        Ok(DomainRequest::Connect(request))
    }
}

fn parse_items(raw: Option<&Value>) -> ConnectResult<Vec<ConnectItem>> {
    let Some(Value::Array(entries)) = raw else {
        return Ok(vec![ConnectItem::TonAddr]);
    };
    let mut items = Vec::new();
    for entry in entries {
        match serde_json::from_value::<ConnectItem>(entry.clone()) {
            Ok(ConnectItem::TonProof { payload }) if payload.len() > MAX_PROOF_PAYLOAD => {
                return Err(bad_request("ton_proof payload too long"));
            }
            Ok(item) if !items.contains(&item) => items.push(item),
            Ok(_) => {}
            Err(_) => debug!(item = %entry, "ignoring unsupported connect item"),
        }
    }
    if !items.contains(&ConnectItem::TonAddr) {
        items.insert(0, ConnectItem::TonAddr);
    }
    Ok(items)
}

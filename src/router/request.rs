//! Typed domain requests handed to application callbacks.

use crate::core::protocol::{Origin, ProtocolError};
use crate::error::{ConnectError, ConnectResult};
use crate::wallet::{TransactionMessage, TransferRequest, WalletHandle};
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Sanitized description of a requesting application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPreview {
    pub name: String,
    pub url: String,
    pub icon_url: String,
}

/// Item a requester asks for on connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ConnectItem {
    TonAddr,
    TonProof { payload: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Connect,
    Transaction,
    SignData,
    Disconnect,
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub id: String,
    pub origin: Origin,
    pub app_name: String,
    pub manifest_url: String,
    pub preview: AppPreview,
    pub items: Vec<ConnectItem>,
    /// Chosen by the human before approval.
    pub wallet: Option<WalletHandle>,
}

impl ConnectRequest {
    pub fn with_wallet(mut self, wallet: WalletHandle) -> Self {
        self.wallet = Some(wallet);
        self
    }

    pub fn proof_payload(&self) -> Option<&str> {
        self.items.iter().find_map(|item| match item {
            ConnectItem::TonProof { payload } => Some(payload.as_str()),
            ConnectItem::TonAddr => None,
        })
    }

    /// Host of the manifest URL, used as the proof domain.
    pub fn domain(&self) -> String {
        url::Url::parse(&self.manifest_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub id: String,
    pub origin: Origin,
    pub messages: Vec<TransactionMessage>,
    pub valid_until: Option<i64>,
    pub from: Option<String>,
    pub wallet: WalletHandle,
}

impl TransactionRequest {
    pub fn transfer(&self) -> TransferRequest {
        TransferRequest {
            messages: self.messages.clone(),
            valid_until: self.valid_until,
        }
    }
}

/// Data a requester wants signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignDataPayload {
    Text { text: String },
    Binary { bytes: String },
    Cell { schema: String, cell: String },
}

impl SignDataPayload {
    /// Bytes handed to the signer.
    pub fn bytes(&self) -> ConnectResult<Vec<u8>> {
        let decode = |b64: &str| {
            base64::engine::general_purpose::STANDARD
                .decode(b64)
                .map_err(|e| ConnectError::Protocol(ProtocolError::bad_request(format!("payload not base64: {e}"))))
        };
        match self {
            SignDataPayload::Text { text } => Ok(text.as_bytes().to_vec()),
            SignDataPayload::Binary { bytes } => decode(bytes),
            SignDataPayload::Cell { cell, .. } => decode(cell),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignDataRequest {
    pub id: String,
    pub origin: Origin,
    pub payload: SignDataPayload,
    pub wallet: WalletHandle,
}

#[derive(Debug, Clone)]
pub struct DisconnectEvent {
    pub id: String,
    pub origin: Origin,
    pub wallet_address: Option<String>,
}

/// One variant per wire method.
#[derive(Debug, Clone)]
pub enum DomainRequest {
    Connect(ConnectRequest),
    Transaction(TransactionRequest),
    SignData(SignDataRequest),
    Disconnect(DisconnectEvent),
}

impl DomainRequest {
    pub fn id(&self) -> &str {
        match self {
            DomainRequest::Connect(r) => &r.id,
            DomainRequest::Transaction(r) => &r.id,
            DomainRequest::SignData(r) => &r.id,
            DomainRequest::Disconnect(r) => &r.id,
        }
    }

    pub fn origin(&self) -> &Origin {
        match self {
            DomainRequest::Connect(r) => &r.origin,
            DomainRequest::Transaction(r) => &r.origin,
            DomainRequest::SignData(r) => &r.origin,
            DomainRequest::Disconnect(r) => &r.origin,
        }
    }

    pub fn kind(&self) -> RequestKind {
        match self {
            DomainRequest::Connect(_) => RequestKind::Connect,
            DomainRequest::Transaction(_) => RequestKind::Transaction,
            DomainRequest::SignData(_) => RequestKind::SignData,
            DomainRequest::Disconnect(_) => RequestKind::Disconnect,
        }
    }

    /// JSON view for listings. Signers are never exposed.
    pub fn summary(&self) -> Value {
        let base = json!({"id": self.id(), "kind": self.kind(), "origin": self.origin()});
        let detail = match self {
            DomainRequest::Connect(r) => json!({
                "app_name": r.app_name,
                "manifest_url": r.manifest_url,
                "preview": r.preview,
                "items": r.items,
            }),
            DomainRequest::Transaction(r) => json!({
                "messages": r.messages,
                "valid_until": r.valid_until,
                "wallet": r.wallet.public_key(),
            }),
            DomainRequest::SignData(r) => json!({
                "payload": r.payload,
                "wallet": r.wallet.public_key(),
            }),
            DomainRequest::Disconnect(r) => json!({"wallet_address": r.wallet_address}),
        };
        merge(base, detail)
    }
}

fn merge(mut base: Value, extra: Value) -> Value {
    if let (Some(target), Value::Object(extra)) = (base.as_object_mut(), extra) {
        target.extend(extra);
    }
    base
}

//! Connect success payload, built from exactly the items the requester asked for.

use crate::core::proof::{ProofMessage, RawAddress};
use crate::core::protocol::{DeviceInfo, Network};
use crate::error::ConnectResult;
use crate::router::request::{ConnectItem, ConnectRequest};
use crate::wallet::WalletHandle;
use base64::Engine;
use chrono::Utc;
use serde_json::{json, Value};

pub(crate) async fn connect_payload(
    request: &ConnectRequest,
    wallet: &WalletHandle,
    network: Network,
    device: &DeviceInfo,
) -> ConnectResult<Value> {
    let mut items = Vec::with_capacity(request.items.len());
    for item in &request.items {
        items.push(match item {
            ConnectItem::TonAddr => address_item(wallet, network).await?,
            ConnectItem::TonProof { payload } => proof_item(wallet, &request.domain(), payload).await?,
        });
    }
    Ok(json!({"items": items, "device": device.to_wire()}))
}

async fn address_item(wallet: &WalletHandle, network: Network) -> ConnectResult<Value> {
    Ok(json!({
        "name": "ton_addr",
        "address": wallet.address(),
        "network": network.chain_id(),
        "publicKey": wallet.public_key(),
        "walletStateInit": wallet.state_init().await?,
    }))
}

async fn proof_item(wallet: &WalletHandle, domain: &str, payload: &str) -> ConnectResult<Value> {
    let message = ProofMessage {
        address: RawAddress::parse(&wallet.address())?,
        domain: domain.to_string(),
        timestamp: Utc::now().timestamp().max(0) as u64,
        payload: payload.to_string(),
    };
    let signature = wallet.sign(&message.signing_bytes()).await?;
    Ok(json!({
        "name": "ton_proof",
        "proof": {
            "timestamp": message.timestamp,
            "domain": {"lengthBytes": domain.len(), "value": domain},
            "signature": base64::engine::general_purpose::STANDARD.encode(signature),
            "payload": payload,
        }
    }))
}

//! Engine flows end to end over a recording remote transport.

mod common;

use base64::Engine as _;
use beeconnect::core::keys::reasons;
use beeconnect::{
    Collaborators, ConnectError, ConnectRequest, Engine, EngineConfig, EventDisposition, MemoryStorage, Network,
    Origin, RawWireEvent,
};
use common::{wait_until, wallet, RecordingTransport, StaticManifests, PUBLIC_KEY};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::unbounded_channel;

const APP: &str = "c1";

async fn engine_with(config: EngineConfig) -> (Engine, Arc<RecordingTransport>) {
    let remote = RecordingTransport::new();
    let collaborators = Collaborators::new(Arc::new(MemoryStorage::new()))
        .with_manifests(Arc::new(StaticManifests))
        .with_remote(remote.clone());
    let engine = Engine::start(config, collaborators).await.unwrap();
    engine.register_wallet(wallet()).await;
    (engine, remote)
}

fn connect_event(id: &str) -> RawWireEvent {
    RawWireEvent::new(
        id,
        "startConnect",
        Origin::remote(APP),
        json!({
            "manifestUrl": "https://hive.example/tonconnect-manifest.json",
            "items": [{"name": "ton_addr"}, {"name": "ton_proof", "payload": "nonce-1"}]
        }),
    )
}

fn transaction_event(id: &str) -> RawWireEvent {
    let valid_until = chrono::Utc::now().timestamp() + 600;
    RawWireEvent::new(
        id,
        "sendTransaction",
        Origin::remote(APP),
        json!([{
            "valid_until": valid_until,
            "messages": [{"address": format!("0:{}", "ab".repeat(32)), "amount": "1000"}]
        }]),
    )
}

/// Engine with `APP` already paired to the test wallet.
async fn paired(config: EngineConfig) -> (Engine, Arc<RecordingTransport>) {
    let (engine, remote) = engine_with(config).await;
    let (tx, mut rx) = unbounded_channel::<ConnectRequest>();
    let sub = engine.on_connect(move |request| {
        let _ = tx.send(request);
    });
    engine.handle_event(connect_event("0")).await;
    let request = rx.recv().await.unwrap();
    engine.approve_connect(&request.with_wallet(wallet())).await.unwrap();
    sub.unsubscribe();
    (engine, remote)
}

fn last_body(remote: &RecordingTransport) -> Value {
    remote.sent().last().map(|m| m.body.clone()).unwrap_or(Value::Null)
}

#[tokio::test]
async fn connect_approval_pairs_and_answers_once() {
    let (engine, remote) = engine_with(EngineConfig::new("test").with_network(Network::Testnet)).await;
    let (tx, mut rx) = unbounded_channel::<ConnectRequest>();
    let _sub = engine.on_connect(move |request| {
        let _ = tx.send(request);
    });

    let disposition = engine.handle_event(connect_event("1")).await;
    assert_eq!(disposition, EventDisposition::Pending(format!("{APP}~1")));

    let request = rx.recv().await.unwrap();
    assert_eq!(request.app_name, "Hive Swap");
    assert_eq!(request.preview.icon_url, "https://hive.example/icon.png");
    assert!(request.wallet.is_none());

    let session = engine.approve_connect(&request.clone().with_wallet(wallet())).await.unwrap();
    assert_eq!(session.wallet_public_key, PUBLIC_KEY);
    assert_eq!(engine.session(APP).unwrap().app_name, "Hive Swap");
    assert_eq!(remote.opened.lock().unwrap().clone(), vec![APP.to_string()]);

    let sent = remote.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].origin, Origin::remote(APP));
    let body = &sent[0].body;
    assert_eq!(body["event"], "connect");
    assert_eq!(body["id"], "1");
    let items = body["payload"]["items"].as_array().unwrap();
    assert_eq!(items[0]["name"], "ton_addr");
    assert_eq!(items[0]["network"], "-3");
    assert_eq!(items[0]["publicKey"], PUBLIC_KEY);
    assert_eq!(items[1]["name"], "ton_proof");
    assert_eq!(items[1]["proof"]["domain"]["value"], "hive.example");
    assert_eq!(items[1]["proof"]["domain"]["lengthBytes"], 12);
    assert_eq!(items[1]["proof"]["payload"], "nonce-1");
    assert_eq!(body["payload"]["device"]["maxProtocolVersion"], 2);

    let err = engine.reject_connect(&request, None).await.unwrap_err();
    assert!(matches!(err, ConnectError::AlreadySettled(_)));
    assert_eq!(remote.sent().len(), 1);
}

#[tokio::test]
async fn connect_rejection_uses_default_reason() {
    let (engine, remote) = engine_with(EngineConfig::new("test")).await;
    let (tx, mut rx) = unbounded_channel::<ConnectRequest>();
    let _sub = engine.on_connect(move |request| {
        let _ = tx.send(request);
    });
    engine.handle_event(connect_event("5")).await;
    let request = rx.recv().await.unwrap();

    engine.reject_connect(&request, None).await.unwrap();
    let body = last_body(&remote);
    assert_eq!(body["event"], "connect_error");
    assert_eq!(body["payload"]["code"], 300);
    assert_eq!(body["payload"]["message"], reasons::CONNECT_DECLINED);
    assert!(engine.sessions().is_empty());
}

#[tokio::test]
async fn undecided_request_times_out_with_exactly_one_response() {
    let config = EngineConfig::new("test").with_approval_timeout(Duration::from_millis(150));
    let (engine, remote) = paired(config).await;
    let before = remote.sent().len();

    let disposition = engine.handle_event(transaction_event("2")).await;
    assert!(matches!(disposition, EventDisposition::Pending(_)));
    assert_eq!(engine.pending_requests().len(), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    let sent = remote.sent();
    assert_eq!(sent.len(), before + 1);
    assert_eq!(sent[before].body["id"], "2");
    assert_eq!(sent[before].body["error"]["code"], 0);
    assert_eq!(sent[before].body["error"]["message"], reasons::EXPIRED);
    assert!(engine.pending_requests().is_empty());
}

#[tokio::test]
async fn transaction_approval_returns_the_signed_artifact() {
    let (engine, remote) = paired(EngineConfig::new("test")).await;
    let (tx, mut rx) = unbounded_channel();
    let _sub = engine.on_transaction(move |request| {
        let _ = tx.send(request);
    });

    engine.handle_event(transaction_event("3")).await;
    let request = rx.recv().await.unwrap();
    assert_eq!(request.messages.len(), 1);
    assert_eq!(request.wallet.public_key(), PUBLIC_KEY);

    let signed = engine.approve_transaction(&request).await.unwrap();
    assert_eq!(signed.boc, base64::engine::general_purpose::STANDARD.encode("boc:1"));
    let body = last_body(&remote);
    assert_eq!(body["id"], "3");
    assert_eq!(body["result"], json!(signed.boc));
}

#[tokio::test]
async fn sign_data_signature_travels_as_bytes() {
    let (engine, remote) = paired(EngineConfig::new("test")).await;
    let (tx, mut rx) = unbounded_channel();
    let _sub = engine.on_sign_data(move |request| {
        let _ = tx.send(request);
    });

    let event = RawWireEvent::new("4", "signData", Origin::remote(APP), json!({"type": "text", "text": "hello"}));
    engine.handle_event(event).await;
    let request = rx.recv().await.unwrap();

    let result = engine.approve_sign_data(&request).await.unwrap();
    assert_eq!(result.signature, b"olleh".to_vec());
    let body = last_body(&remote);
    assert_eq!(body["result"]["signature"], json!(b"olleh".to_vec()));
    assert_eq!(body["result"]["payload"]["text"], "hello");
}

#[tokio::test]
async fn transaction_rejection_carries_reason() {
    let (engine, remote) = paired(EngineConfig::new("test")).await;
    let (tx, mut rx) = unbounded_channel();
    let _sub = engine.on_transaction(move |request| {
        let _ = tx.send(request);
    });
    engine.handle_event(transaction_event("6")).await;
    let request = rx.recv().await.unwrap();

    engine.reject_transaction(&request, Some("too expensive")).await.unwrap();
    let body = last_body(&remote);
    assert_eq!(body["error"]["code"], 300);
    assert_eq!(body["error"]["message"], "too expensive");
}

#[tokio::test]
async fn unknown_method_is_silently_dropped() {
    let (engine, remote) = paired(EngineConfig::new("test")).await;
    let before = remote.sent().len();

    let event = RawWireEvent::new("7", "doesNotExist", Origin::remote(APP), json!({}));
    assert_eq!(engine.handle_event(event).await, EventDisposition::Dropped);
    assert_eq!(remote.sent().len(), before);
    assert!(engine.pending_requests().is_empty());
}

#[tokio::test]
async fn request_from_unpaired_app_gets_protocol_error() {
    let (engine, remote) = engine_with(EngineConfig::new("test")).await;
    let event = RawWireEvent::new("8", "signData", Origin::remote("stranger"), json!({"type": "text", "text": "x"}));

    assert_eq!(engine.handle_event(event).await, EventDisposition::Answered);
    let sent = remote.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].origin, Origin::remote("stranger"));
    assert_eq!(sent[0].body["error"]["code"], 100);
}

#[tokio::test]
async fn malformed_transaction_is_refused_before_the_user_sees_it() {
    let (engine, remote) = paired(EngineConfig::new("test")).await;
    let (tx, mut rx) = unbounded_channel();
    let _sub = engine.on_transaction(move |request| {
        let _ = tx.send(request);
    });
    let event = RawWireEvent::new(
        "10",
        "sendTransaction",
        Origin::remote(APP),
        json!({"messages": [{"address": "0:00", "amount": "-5"}]}),
    );

    assert_eq!(engine.handle_event(event).await, EventDisposition::Answered);
    assert_eq!(last_body(&remote)["error"]["code"], 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn app_disconnect_is_acknowledged_and_forgotten() {
    let (engine, remote) = paired(EngineConfig::new("test")).await;
    let (tx, mut rx) = unbounded_channel();
    let _sub = engine.on_disconnect(move |event| {
        let _ = tx.send(event);
    });

    let event = RawWireEvent::new("9", "disconnect", Origin::remote(APP), json!([]));
    assert_eq!(engine.handle_event(event).await, EventDisposition::Answered);

    assert!(engine.session(APP).is_none());
    assert_eq!(remote.closed.lock().unwrap().clone(), vec![APP.to_string()]);
    assert_eq!(last_body(&remote), json!({"id": "9", "result": {}}));
    let notified = rx.recv().await.unwrap();
    assert_eq!(notified.wallet_address.as_deref(), Some(wallet().address().as_str()));
}

#[tokio::test]
async fn wallet_initiated_disconnect_notifies_the_app() {
    let (engine, remote) = paired(EngineConfig::new("test")).await;

    assert!(engine.disconnect_session(APP).await);
    assert!(!engine.disconnect_session(APP).await);
    assert_eq!(last_body(&remote)["event"], "disconnect");
    assert!(engine.sessions().is_empty());
}

#[tokio::test]
async fn removing_a_wallet_disconnects_its_sessions() {
    let (engine, _remote) = paired(EngineConfig::new("test")).await;
    assert!(engine.remove_wallet(PUBLIC_KEY).await);
    assert!(engine.sessions().is_empty());
    assert!(engine.wallets().is_empty());
}

#[tokio::test]
async fn transport_events_reach_the_engine() {
    let (engine, remote) = paired(EngineConfig::new("test")).await;
    assert_eq!(remote.push(transaction_event("11")), 1);

    let listed = wait_until(Duration::from_secs(2), || engine.pending_requests().len() == 1).await;
    assert!(listed);
    assert_eq!(engine.pending_requests()[0].key, format!("{APP}~11"));
}

#[tokio::test]
async fn pending_requests_are_approvable_by_key() {
    let (engine, remote) = engine_with(EngineConfig::new("test")).await;
    let EventDisposition::Pending(key) = engine.handle_event(connect_event("12")).await else {
        panic!("connect not pending");
    };

    let result = engine.approve_pending(&key, None).await.unwrap();
    assert_eq!(result["wallet_public_key"], PUBLIC_KEY);
    assert_eq!(last_body(&remote)["event"], "connect");

    let err = engine.reject_pending(&key, None).await.unwrap_err();
    assert!(matches!(err, ConnectError::UnknownRequest(_)));
}

#[tokio::test]
async fn connection_link_enters_through_the_remote_path() {
    let (engine, _remote) = engine_with(EngineConfig::new("test")).await;
    let client = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";
    let request: String = url::form_urlencoded::byte_serialize(
        br#"{"manifestUrl":"https://hive.example/tonconnect-manifest.json","items":[{"name":"ton_addr"}]}"#,
    )
    .collect();

    let disposition = engine
        .handle_connection_link(&format!("tc://?v=2&id={client}&r={request}&ret=none"))
        .await
        .unwrap();
    match disposition {
        EventDisposition::Pending(key) => assert!(key.starts_with(client)),
        other => panic!("expected pending, got {other:?}"),
    }
    assert!(engine.handle_connection_link("tc://?v=9").await.is_err());
}

#[tokio::test]
async fn stop_cancels_pending_requests() {
    let (engine, remote) = paired(EngineConfig::new("test")).await;
    engine.handle_event(transaction_event("13")).await;
    let before = remote.sent().len();

    engine.stop().await;
    engine.stop().await;
    assert!(!engine.is_running());
    let sent = remote.sent();
    assert_eq!(sent.len(), before + 1);
    assert_eq!(sent[before].body["error"]["message"], reasons::SHUTTING_DOWN);

    assert_eq!(engine.handle_event(transaction_event("14")).await, EventDisposition::Dropped);
    assert!(remote.listeners.is_empty());
}

#[tokio::test]
async fn unreachable_manifest_still_yields_a_presentable_request() {
    let (engine, remote) = engine_with(EngineConfig::new("test")).await;
    let (tx, mut rx) = unbounded_channel::<ConnectRequest>();
    let _sub = engine.on_connect(move |request| {
        let _ = tx.send(request);
    });

    let event = RawWireEvent::new(
        "15",
        "startConnect",
        Origin::remote(APP),
        json!({"manifestUrl": "https://broken.example/tonconnect-manifest.json", "items": [{"name": "ton_addr"}]}),
    );
    assert_eq!(engine.handle_event(event).await, EventDisposition::Pending(format!("{APP}~15")));

    let request = rx.recv().await.unwrap();
    assert_eq!(request.app_name, "broken.example");
    assert!(request.preview.name.is_empty());
    assert!(request.preview.icon_url.is_empty());
    assert!(remote.sent().is_empty());

    let pending = engine.pending_requests();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request["app_name"], "broken.example");
    assert_eq!(pending[0].request["preview"], json!({"name": "", "url": "", "iconUrl": ""}));

    engine.approve_connect(&request.with_wallet(wallet())).await.unwrap();
    assert_eq!(engine.session(APP).unwrap().app_name, "broken.example");
    assert_eq!(last_body(&remote)["event"], "connect");
}

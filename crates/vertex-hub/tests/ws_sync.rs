//! End-to-end tests over a real WebSocket: a tokio-tungstenite client
//! plays the store side of the protocol against a running listener.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use vertex_hub::{
    HqServer, HqServerHandle, HubSettings, InboundSync, ServerSettings, SyncHub, SyncSettings,
};

type StoreSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(3);

async fn start_hub() -> (Arc<SyncHub>, mpsc::Receiver<InboundSync>, HqServerHandle) {
    let settings = HubSettings {
        server: ServerSettings {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
        },
        sync: SyncSettings {
            send_timeout_ms: 1_000,
            hello_deadline_secs: 2,
            ..SyncSettings::default()
        },
    };

    let (hub, applier_rx) = SyncHub::new(settings);
    let handle = HqServer::new(Arc::clone(&hub))
        .start()
        .await
        .expect("listener starts");
    (hub, applier_rx, handle)
}

/// Connects a store: dials the listener, sends hello, waits for welcome.
async fn connect_store(handle: &HqServerHandle, store_id: i64, firm_id: i64) -> StoreSocket {
    let url = format!("ws://{}/ws", handle.local_addr());
    let (mut socket, _) = connect_async(url.as_str()).await.expect("store connects");

    let hello = json!({"type": "hello", "store_id": store_id, "firm_id": firm_id});
    socket
        .send(Message::Text(hello.to_string().into()))
        .await
        .expect("hello sent");

    let welcome = next_json(&mut socket).await.expect("welcome arrives");
    assert_eq!(welcome["type"], "welcome");
    assert!(welcome["server_time"].is_string());

    socket
}

/// Next JSON text frame, skipping keepalive traffic.
async fn next_json(socket: &mut StoreSocket) -> Option<Value> {
    loop {
        match timeout(WAIT, socket.next()).await.ok()?? {
            Ok(Message::Text(text)) => {
                return Some(serde_json::from_str(&text).expect("valid frame json"))
            }
            Ok(Message::Ping(_) | Message::Pong(_)) => continue,
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
}

/// Admission completes just after the welcome frame is enqueued, so tests
/// wait for the registry to catch up before dispatching.
async fn wait_online(hub: &SyncHub, store_id: i64) {
    timeout(WAIT, async {
        while !hub.is_store_online(store_id).await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("store comes online");
}

async fn wait_offline(hub: &SyncHub, store_id: i64) {
    timeout(WAIT, async {
        while hub.is_store_online(store_id).await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("store goes offline");
}

#[tokio::test]
async fn push_reaches_connected_store_with_exact_wire_shape() {
    let (hub, _applier_rx, handle) = start_hub().await;
    let mut store = connect_store(&handle, 1, 10).await;
    wait_online(&hub, 1).await;

    let report = hub
        .dispatch_push(10, None, "price_list", json!({"items": [{"sku": "A-1", "price": 950}]}))
        .await;
    assert_eq!(report.success_count, 1);
    assert_eq!(report.total_targets, 1);

    let frame = next_json(&mut store).await.expect("envelope arrives");
    assert_eq!(frame["type"], "data_sync");
    assert_eq!(frame["action"], "merkez_to_sube");
    assert_eq!(frame["data_type"], "price_list");
    assert_eq!(frame["data"]["items"][0]["sku"], "A-1");
    assert!(frame["timestamp"].is_string());
}

#[tokio::test]
async fn data_request_and_store_reply_flow() {
    let (hub, mut applier_rx, handle) = start_hub().await;
    let mut store = connect_store(&handle, 2, 10).await;
    wait_online(&hub, 2).await;

    let report = hub.dispatch_request(10, None, "stock_levels").await;
    assert!(report.all_delivered());

    let frame = next_json(&mut store).await.expect("request arrives");
    assert_eq!(frame["type"], "data_request");
    assert_eq!(frame["data_type"], "stock_levels");
    assert!(frame.get("data").is_none());

    // The store answers over its own inbound channel.
    let reply = json!({
        "type": "data_sync",
        "data_type": "stock_levels",
        "data": {"sku": "A-1", "qty": 17},
    });
    store
        .send(Message::Text(reply.to_string().into()))
        .await
        .expect("reply sent");

    let event = timeout(WAIT, applier_rx.recv())
        .await
        .expect("applier receives in time")
        .expect("channel open");
    assert_eq!(event.store_id, 2);
    assert_eq!(event.firm_id, 10);
    assert_eq!(event.data_type, "stock_levels");
    assert_eq!(event.payload["qty"], 17);
}

#[tokio::test]
async fn reconnect_replaces_previous_socket() {
    let (hub, _applier_rx, handle) = start_hub().await;
    let mut first = connect_store(&handle, 3, 10).await;
    wait_online(&hub, 3).await;

    let mut second = connect_store(&handle, 3, 10).await;

    // The superseded socket is closed by the hub.
    assert!(next_json(&mut first).await.is_none());
    assert_eq!(hub.connection_count().await, 1);

    // Deliveries go to the replacement only.
    let report = hub.dispatch_push(10, None, "price_list", json!({"rev": 2})).await;
    assert_eq!(report.success_count, 1);
    let frame = next_json(&mut second).await.expect("replacement receives");
    assert_eq!(frame["data"]["rev"], 2);
}

#[tokio::test]
async fn connection_without_hello_is_rejected() {
    let (_hub, _applier_rx, handle) = start_hub().await;
    let url = format!("ws://{}/ws", handle.local_addr());
    let (mut socket, _) = connect_async(url.as_str()).await.expect("connects");

    let premature = json!({"type": "data_sync", "data_type": "price_list", "data": {}});
    socket
        .send(Message::Text(premature.to_string().into()))
        .await
        .expect("frame sent");

    let frame = timeout(WAIT, socket.next())
        .await
        .expect("reply in time")
        .expect("frame")
        .expect("no socket error");
    match frame {
        Message::Text(text) => {
            let value: Value = serde_json::from_str(&text).expect("valid json");
            assert_eq!(value["type"], "error");
            assert_eq!(value["code"], "INVALID_HELLO");
        }
        other => panic!("expected error frame, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_updates_liveness_but_not_topology() {
    let (hub, _applier_rx, handle) = start_hub().await;
    let mut first = connect_store(&handle, 4, 11).await;
    let _second = connect_store(&handle, 5, 11).await;
    wait_online(&hub, 4).await;
    wait_online(&hub, 5).await;

    assert_eq!(hub.online_stores(11).await, vec![4, 5]);

    first.close(None).await.expect("clean close");
    wait_offline(&hub, 4).await;

    assert_eq!(hub.online_stores(11).await, vec![5]);
    // Organizational membership survives the disconnect.
    assert_eq!(hub.declared_stores(11).await, vec![4, 5]);

    // Fan-out now covers the reachable store only.
    let report = hub.dispatch_push(11, None, "price_list", json!({})).await;
    assert_eq!(report.total_targets, 1);
    assert_eq!(report.per_target[0].store_id, 5);
}

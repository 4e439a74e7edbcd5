//! # Headquarters Listener
//!
//! The WebSocket server stores connect to.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Headquarters Listener                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      HqServer (Axum)                            │   │
//! │  │                                                                 │   │
//! │  │  /ws endpoint ──▶ WebSocket upgrade                            │   │
//! │  │                        │                                        │   │
//! │  │                        ▼                                        │   │
//! │  │               hello { store_id, firm_id }                       │   │
//! │  │                        │                                        │   │
//! │  │                        ▼                                        │   │
//! │  │              ┌──────────────────┐                               │   │
//! │  │              │ admit → registry │  one writer task + one        │   │
//! │  │              │ welcome → store  │  read loop per connection     │   │
//! │  │              └────────┬─────────┘                               │   │
//! │  │                       │                                         │   │
//! │  │         ┌─────────────┼─────────────┐                          │   │
//! │  │         ▼             ▼             ▼                          │   │
//! │  │  ┌──────────┐  ┌──────────┐  ┌──────────┐                      │   │
//! │  │  │ Store #1 │  │ Store #2 │  │ Store #3 │   Connected stores   │   │
//! │  │  └──────────┘  └──────────┘  └──────────┘                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Message Flow:                                                          │
//! │  ─────────────                                                          │
//! │  1. Store connects and sends hello                                     │
//! │  2. Listener admits the connection and replies with welcome            │
//! │  3. Registry sends flow through the per-connection writer task         │
//! │  4. Store-originated data_sync frames are routed to the intake         │
//! │  5. Socket teardown removes exactly this connection instance           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout, Duration};
use tracing::{debug, error, info, warn};

use crate::error::{HubError, HubResult};
use crate::hub::SyncHub;
use crate::protocol::{ErrorFrame, InboundFrame, OutboundFrame, WelcomeFrame};
use crate::transport::StoreTransport;
use crate::types::{FirmId, StoreId};

// =============================================================================
// Constants
// =============================================================================

/// Ping interval to keep connections alive.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum message size (1MB).
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

// =============================================================================
// Server
// =============================================================================

/// The store-facing WebSocket server.
pub struct HqServer {
    hub: Arc<SyncHub>,
}

/// Handle for a running listener.
pub struct HqServerHandle {
    local_addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
}

impl HqServerHandle {
    /// The address the listener actually bound (relevant with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shuts the listener down gracefully.
    pub async fn shutdown(&self) -> HubResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| HubError::ChannelClosed("listener shutdown"))
    }
}

/// Builds the store-facing router. Exposed separately so an embedding
/// binary can merge it with its own routes.
pub fn router(hub: Arc<SyncHub>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(hub)
}

impl HqServer {
    pub fn new(hub: Arc<SyncHub>) -> Self {
        HqServer { hub }
    }

    /// Binds the configured address and starts serving. Returns a handle
    /// carrying the bound address and a shutdown trigger.
    pub async fn start(self) -> HubResult<HqServerHandle> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let bind_addr = self.hub.settings().bind_address();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| HubError::Bind {
                addr: bind_addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| HubError::Bind {
            addr: bind_addr,
            reason: e.to_string(),
        })?;

        let app = router(Arc::clone(&self.hub));

        info!(addr = %local_addr, "Headquarters listener started");

        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                shutdown_rx.recv().await;
                info!("Headquarters listener shutting down");
            })
            .await
            .ok();
        });

        Ok(HqServerHandle {
            local_addr,
            shutdown_tx,
        })
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    "OK"
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(hub): State<Arc<SyncHub>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    info!(addr = %addr, "New store connection");
    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, hub, addr))
}

/// Drives one store connection from handshake to teardown.
async fn handle_socket(socket: WebSocket, hub: Arc<SyncHub>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    let hello_deadline = hub.settings().hello_deadline();
    let (store_id, firm_id) = match receive_hello(&mut receiver, hello_deadline).await {
        Ok(ids) => ids,
        Err(e) => {
            warn!(addr = %addr, error = %e, "Hello handshake failed, closing connection");
            send_error_frame(&mut sender, "INVALID_HELLO", &e.to_string()).await;
            return;
        }
    };

    // The transport goes to the registry; the receiver half feeds this
    // connection's writer task. The welcome is enqueued before the registry
    // takes ownership so it is the first frame on the wire.
    let (transport, outbound_rx) = StoreTransport::channel(hub.settings().sync.outbound_capacity);
    let send_timeout = hub.settings().send_timeout();
    if transport
        .send(OutboundFrame::Welcome(WelcomeFrame::now()), send_timeout)
        .await
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(write_loop(sender, outbound_rx));

    let conn_id = match hub.admit(store_id, firm_id, transport).await {
        Ok(conn_id) => conn_id,
        Err(e) => {
            warn!(store_id, error = %e, "Admission failed, closing connection");
            writer.abort();
            return;
        }
    };

    info!(store_id, firm_id, addr = %addr, "Store connected");

    // Main receive loop: one logical worker per open store connection.
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                handle_store_frame(&hub, store_id, firm_id, &text).await;
            }
            Some(Ok(Message::Binary(data))) => {
                match std::str::from_utf8(&data) {
                    Ok(text) => handle_store_frame(&hub, store_id, firm_id, text).await,
                    Err(_) => debug!(store_id, "Ignoring non-UTF8 binary frame"),
                }
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Keepalive; answered by the socket layer.
            }
            Some(Ok(Message::Close(_))) => {
                info!(store_id, "Store requested close");
                break;
            }
            Some(Err(e)) => {
                warn!(store_id, error = %e, "WebSocket error");
                break;
            }
            None => {
                info!(store_id, "Store disconnected");
                break;
            }
        }
    }

    // Remove exactly this instance: if the store reconnected meanwhile,
    // the replacement connection must survive this teardown.
    hub.registry().remove_instance(store_id, conn_id).await;
}

/// Parses and routes one frame received from a store.
async fn handle_store_frame(hub: &Arc<SyncHub>, store_id: StoreId, firm_id: FirmId, text: &str) {
    match InboundFrame::from_json(text) {
        Ok(InboundFrame::DataSync {
            data_type, data, ..
        }) => {
            if let Err(e) = hub.ingest(store_id, firm_id, data_type, data).await {
                warn!(store_id, error = %e, "Failed to ingest store event");
            }
        }
        Ok(InboundFrame::Hello { .. }) => {
            debug!(store_id, "Ignoring repeated hello");
        }
        Err(e) => {
            debug!(store_id, error = %e, "Invalid message format");
        }
    }
}

/// Writer task: drains the outbound channel onto the socket and keeps the
/// connection alive with periodic pings. Channel closure is the close
/// signal from the registry.
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
) {
    let mut ping = interval(PING_INTERVAL);
    // The first tick fires immediately; skip it so pings start one
    // interval after connect.
    ping.tick().await;

    loop {
        tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(frame) => match frame.to_json() {
                    Ok(json) => {
                        if sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => error!(error = %e, "Failed to serialize outbound frame"),
                },
                None => {
                    // Registry dropped the transport: close the socket.
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if sender.send(Message::Ping(axum::body::Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Receives and parses the hello frame, bounded by the handshake deadline.
async fn receive_hello(
    receiver: &mut SplitStream<WebSocket>,
    deadline: Duration,
) -> HubResult<(StoreId, FirmId)> {
    match timeout(deadline, receiver.next()).await {
        Ok(Some(Ok(msg))) => {
            let text = match msg {
                Message::Text(t) => t.to_string(),
                Message::Binary(b) => String::from_utf8_lossy(&b).to_string(),
                _ => {
                    return Err(HubError::HandshakeFailed(
                        "expected a text hello frame".into(),
                    ))
                }
            };

            match InboundFrame::from_json(&text) {
                Ok(InboundFrame::Hello { store_id, firm_id }) => Ok((store_id, firm_id)),
                Ok(_) => Err(HubError::HandshakeFailed(
                    "first frame must be hello".into(),
                )),
                Err(e) => Err(HubError::HandshakeFailed(format!("invalid hello: {e}"))),
            }
        }
        Ok(Some(Err(e))) => Err(HubError::HandshakeFailed(format!("socket error: {e}"))),
        Ok(None) => Err(HubError::HandshakeFailed(
            "connection closed before hello".into(),
        )),
        Err(_) => Err(HubError::HandshakeFailed("hello timeout".into())),
    }
}

/// Best-effort error frame before dropping a connection.
async fn send_error_frame(sender: &mut SplitSink<WebSocket, Message>, code: &str, message: &str) {
    let frame = OutboundFrame::Error(ErrorFrame::new(code, message));
    if let Ok(json) = frame.to_json() {
        let _ = sender.send(Message::Text(json.into())).await;
    }
}

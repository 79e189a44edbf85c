//! WebSocket acceptor built on warp
//!
//! WebSocket messages are already length-delimited, so an incoming message
//! is the frame starting at its size prefix; the prefix is dropped here
//! and the rest decoded like any TCP body. Outgoing packets keep the full
//! framing so both transports emit identical bytes.

use std::sync::Arc;

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use warp::ws::{Message, WebSocket};
use warp::Filter;

use crate::constants::WS_PATH;
use crate::core::client_registry::ClientRegistry;
use crate::core::thread_pool::SharedThreadPool;
use crate::protocol::packet::{PacketType, Request, Response};
use crate::protocol::router::Router;

/// Build the warp routes: the websocket endpoint plus a health check.
pub fn routes(
    router: Arc<Router>,
    clients: Arc<ClientRegistry>,
    pool: SharedThreadPool,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let context = warp::any().map(move || (router.clone(), clients.clone(), pool.clone()));

    let ws_route = warp::path(WS_PATH)
        .and(warp::ws())
        .and(context)
        .map(
            |ws: warp::ws::Ws,
             (router, clients, pool): (Arc<Router>, Arc<ClientRegistry>, SharedThreadPool)| {
                info!("New websocket connection");
                ws.on_upgrade(move |socket| handle_ws_client(socket, router, clients, pool))
            },
        );

    let health_route = warp::path("health").map(|| "OK");

    ws_route.or(health_route)
}

/// Serve one upgraded WebSocket connection.
pub async fn handle_ws_client(
    ws: WebSocket,
    router: Arc<Router>,
    clients: Arc<ClientRegistry>,
    pool: SharedThreadPool,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    // Forward queued packets to the socket as binary messages.
    tokio::task::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(e) = ws_tx.send(Message::binary(bytes)).await {
                error!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    if !clients.has_capacity().await {
        warn!("server capacity is full.");
        let refusal = Response::new(-1, PacketType::SvrConnect, "server is full");
        let _ = tx.send(refusal.bytes().to_vec());
        return;
    }

    let token = super::next_token();
    let client = clients.add_ws(token, tx).await;
    debug!("new websocket client connected: {}", client.id);

    while let Some(result) = ws_rx.next().await {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                debug!("websocket receive failed for client {}: {}", client.id, e);
                break;
            }
        };

        if message.is_close() {
            break;
        }
        if !message.is_binary() {
            continue;
        }

        let bytes = message.as_bytes();
        let request = match bytes
            .get(4..)
            .ok_or(crate::error::ChatRelayError::FrameTooShort(bytes.len()))
            .and_then(Request::decode)
        {
            Ok(request) => request,
            Err(e) => {
                debug!("client {} sent a malformed frame: {}", client.id, e);
                client.send_packet(&Response::new(-1, PacketType::Error, "malformed request"));
                continue;
            }
        };
        let closing = request.kind == PacketType::SvrDisconnect as u32;

        let response = super::dispatch(&router, &pool, &client, request).await;
        if response.should_send() && !client.send_packet(&response) {
            break;
        }
        if closing {
            break;
        }
    }

    router.disconnect(&client).await;
}

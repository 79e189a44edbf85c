//! Raw TCP acceptor
//!
//! Frames arrive size-prefixed: the 4-byte little-endian size is read
//! first, then that many bytes of body. Each connection is served by a
//! sequential read loop, so a client's next request is never processed
//! before its previous response was built.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::core::client::Client;
use crate::core::client_registry::ClientRegistry;
use crate::core::thread_pool::SharedThreadPool;
use crate::protocol::packet::{PacketType, Request, Response, FRAME_OVERHEAD, MAX_FRAME_SIZE};
use crate::protocol::router::Router;

/// Accept loop. Refuses new connections outright when the registry is at
/// capacity; otherwise registers the client and spawns its connection task.
pub async fn serve(
    listener: TcpListener,
    router: Arc<Router>,
    clients: Arc<ClientRegistry>,
    pool: SharedThreadPool,
) {
    info!("server is now listening");
    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(e) => {
                error!("accept failed: {}", e);
                continue;
            }
        };

        if !clients.has_capacity().await {
            warn!("server capacity is full.");
            reject(stream).await;
            continue;
        }

        let token = super::next_token();
        let (tx, rx) = mpsc::unbounded_channel();
        let client = clients.add_tcp(token, tx).await;
        debug!("new tcp client connected: {} ({})", client.id, addr);

        let router = router.clone();
        let pool = pool.clone();
        tokio::spawn(handle_connection(stream, client, rx, router, pool));
    }
}

async fn reject(mut stream: TcpStream) {
    let refusal = Response::new(-1, PacketType::SvrConnect, "server is full");
    let _ = stream.write_all(refusal.bytes()).await;
}

async fn handle_connection(
    stream: TcpStream,
    client: Arc<Client>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    router: Arc<Router>,
    pool: SharedThreadPool,
) {
    let (mut reader, mut writer) = stream.into_split();

    // Drain the client's outbound queue into the socket. Ends on its own
    // once every sender clone is gone.
    tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if writer.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });

    loop {
        let mut size_buf = [0u8; 4];
        if reader.read_exact(&mut size_buf).await.is_err() {
            break;
        }
        let size = u32::from_le_bytes(size_buf) as usize;
        if !(FRAME_OVERHEAD..=MAX_FRAME_SIZE).contains(&size) {
            warn!("client {} sent an unreadable frame size: {}", client.id, size);
            break;
        }

        let mut body = vec![0u8; size];
        if reader.read_exact(&mut body).await.is_err() {
            break;
        }

        let request = match Request::decode(&body) {
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

    // Covers both orderly close and transport errors; harmless when the
    // router already ran the cascade for SVR_DISCONNECT.
    router.disconnect(&client).await;
}

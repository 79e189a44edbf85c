//! Transport adapters: raw TCP and WebSocket glue around the core.
//!
//! Both adapters speak the same frame grammar and hand `(client, request)`
//! pairs to the router; they differ only in how frames are delimited on
//! the wire.

pub mod tcp;
pub mod websocket;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::error;

use crate::core::client::Client;
use crate::core::thread_pool::SharedThreadPool;
use crate::protocol::packet::{PacketType, Request, Response};
use crate::protocol::router::Router;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Mint a fresh transport token. Tokens identify one accepted connection
/// within its owning adapter and are never reused.
pub(crate) fn next_token() -> u64 {
    NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
}

/// Run one request through the router on the shared pool and wait for its
/// response. Each connection calls this sequentially, which is what keeps
/// per-connection request ordering.
pub(crate) async fn dispatch(
    router: &Arc<Router>,
    pool: &SharedThreadPool,
    client: &Arc<Client>,
    request: Request,
) -> Response {
    let router = router.clone();
    let client = client.clone();
    match pool.execute(async move { router.handle_request(&client, request).await }) {
        Some(handle) => match handle.await {
            Ok(response) => response,
            Err(e) => {
                error!("request task failed: {}", e);
                Response::skip()
            }
        },
        None => Response::new(-1, PacketType::RequestRejected, "server is busy"),
    }
}

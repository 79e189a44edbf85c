use std::env;
use std::process;
use std::sync::Arc;

use log::{debug, error, info};
use tokio::net::TcpListener;

use chat_relay::config::ServerConfig;
use chat_relay::constants::DEFAULT_HOST;
use chat_relay::core::channel_registry::ChannelRegistry;
use chat_relay::core::client_registry::ClientRegistry;
use chat_relay::core::thread_pool::create_thread_pool;
use chat_relay::protocol::router::Router;
use chat_relay::transport::{tcp, websocket};

#[tokio::main]
async fn main() {
    // Load .env before the config reads the admin secret from it
    let _ = dotenv::dotenv();

    let config = ServerConfig::from_args(env::args().skip(1));

    env_logger::Builder::from_default_env()
        .filter_level(if config.debug {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();
    if config.debug {
        debug!("Debug mode ENABLED");
    }

    let pool = match create_thread_pool(&config) {
        Ok(pool) => pool,
        Err(e) => {
            error!("could not create the worker pool: {}", e);
            process::exit(1);
        }
    };

    let clients = Arc::new(ClientRegistry::new(config.max_clients));
    let channels = Arc::new(ChannelRegistry::new(config.max_channels, pool.clone()));
    let router = Arc::new(Router::new(
        clients.clone(),
        channels.clone(),
        pool.clone(),
        config.admin_secret.clone(),
    ));

    info!("server setup complete");
    info!("listening on port {}", config.port);
    info!("thread pool size {}", pool.worker_count());
    info!("max clients allowed {}", config.max_clients);
    info!("max channels allowed {}", config.max_channels);

    let listener = match TcpListener::bind((DEFAULT_HOST, config.port)).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(
                "unable to bind server to given address: {}: {}",
                config.port, e
            );
            process::exit(2);
        }
    };

    // The WebSocket listener rides on the next port up
    let ws_port = config.port.saturating_add(1);
    let ws_routes = websocket::routes(router.clone(), clients.clone(), pool.clone());
    tokio::spawn(warp::serve(ws_routes).run(([127, 0, 0, 1], ws_port)));
    info!("websocket server listening on port {}", ws_port);

    tcp::serve(listener, router, clients, pool).await;
}

use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

use chat_relay::auth::TokenManager;
use chat_relay::cache::build_cache;
use chat_relay::config::ServerConfig;
use chat_relay::core::ServerManager;
use chat_relay::handlers::routes;
use chat_relay::storage::MemoryMessageStore;

#[tokio::main]
async fn main() {
    // Initialize env
    let env_loaded = dotenvy::dotenv();

    // Initialize logging
    env_logger::init();

    match env_loaded {
        Ok(path) => info!("Environment variables loaded from {}", path.display()),
        Err(e) => warn!("Failed to load .env file: {}", e),
    }

    // Load config from the environment; missing required settings are fatal
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    info!("Configuration: host={}, port={}", config.host, config.port);

    // Constructed once, shared by every connection
    let cache = build_cache(&config.cache).await;
    let server = Arc::new(ServerManager::new(
        cache,
        Arc::new(MemoryMessageStore::new()),
        Arc::new(TokenManager::new(&config.jwt_secret)),
        config.rate_limits.clone(),
    ));

    // Build the server address
    let addr: SocketAddr = match format!("{}:{}", config.host, config.port).parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Failed to parse server address: {}", e);
            std::process::exit(1);
        }
    };

    let shutdown_server = server.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutdown signal received");
        shutdown_server.shutdown();
    };

    let (bound, serving) =
        match warp::serve(routes(server, config.idle_timeout)).try_bind_with_graceful_shutdown(addr, shutdown) {
            Ok(bound) => bound,
            Err(e) => {
                error!("Failed to bind {}: {}", addr, e);
                std::process::exit(1);
            }
        };

    info!("Starting chat relay on {}", bound);
    serving.await;
    info!("Server stopped");
}

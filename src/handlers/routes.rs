//! HTTP surface: websocket upgrade and health check

use std::convert::Infallible;
use std::time::Duration;
use warp::ws::Ws;
use warp::{Filter, Rejection, Reply};

use crate::auth::{extract_bearer_token, extract_protocol_token};
use crate::cache::StoreBackend;
use crate::constants::{MAX_TRANSPORT_MESSAGE_SIZE, WS_PATH};
use crate::core::server::SharedServerManager;
use crate::handlers::websocket::handle_ws_client;

// Helper function to include the server manager in a request
pub fn with_server(server: SharedServerManager) -> impl Filter<Extract = (SharedServerManager,), Error = Infallible> + Clone {
    warp::any().map(move || server.clone())
}

/// All routes served by the relay
pub fn routes(
    server: SharedServerManager,
    idle_timeout: Duration,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    ws_route(server.clone(), idle_timeout).or(health_route(server))
}

pub fn ws_route(
    server: SharedServerManager,
    idle_timeout: Duration,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path(WS_PATH)
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::header::optional::<String>("sec-websocket-protocol"))
        .and(with_server(server))
        .map(
            move |ws: Ws, authorization: Option<String>, protocols: Option<String>, server: SharedServerManager| {
                let header_token = authorization.as_deref().and_then(extract_bearer_token);
                let protocol_token = protocols.as_deref().and_then(extract_protocol_token);
                let token = header_token.or_else(|| protocol_token.clone());

                log::debug!("New websocket connection (token presented: {})", token.is_some());
                let reply = ws
                    .max_message_size(MAX_TRANSPORT_MESSAGE_SIZE)
                    .on_upgrade(move |socket| handle_ws_client(socket, server, idle_timeout, token));

                // Clients that offered a subprotocol expect it echoed back
                match protocol_token {
                    Some(token) => warp::reply::with_header(reply, "sec-websocket-protocol", format!("bearer.{}", token))
                        .into_response(),
                    None => reply.into_response(),
                }
            },
        )
}

pub fn health_route(server: SharedServerManager) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_server(server))
        .and_then(health_handler)
}

async fn health_handler(server: SharedServerManager) -> Result<impl Reply, Infallible> {
    let cache = server.cache().get_stats().await;
    let status = if cache.connected && cache.backend == StoreBackend::Redis {
        "ok"
    } else {
        "degraded"
    };

    Ok(warp::reply::json(&serde_json::json!({
        "status": status,
        "connections": server.connection_count(),
        "cache": cache,
    })))
}

use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, error, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use warp::ws::{Message, WebSocket};

use crate::core::connection::Connection;
use crate::core::message_types::ServerMessage;
use crate::core::server::{ServerManager, SharedServerManager};
use crate::error::RelayError;

// Handle a WebSocket connection
pub async fn handle_ws_client(
    ws: WebSocket,
    server: SharedServerManager,
    idle_timeout: Duration,
    token: Option<String>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // Spawn a task to forward frames from our channel to the WebSocket
    tokio::task::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to serialize outbound frame: {}", e);
                    continue;
                }
            };
            if let Err(e) = ws_tx.send(Message::text(text)).await {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let connection = server.connect(tx);
    info!("Client connected: {}", connection.id);
    info!("Current connections: {}", server.connection_count());

    // A token from the upgrade request authenticates before the first frame
    let mut handshake_error = None;
    if let Some(token) = token {
        if let Err(e) = server.authenticate(&connection.id, &token).await {
            warn!("Handshake authentication failed for {}: {}", connection.id, e);
            handshake_error = Some(e);
        }
    }

    connection.send(ServerMessage::Connected {
        connection_id: connection.id.clone(),
        authenticated: handshake_error.is_none() && server.registry().participant_of(&connection.id).is_ok(),
    });
    if let Some(e) = handshake_error {
        connection.send(ServerMessage::error(&e));
    }

    // Handle incoming messages until close, error or idle timeout
    loop {
        let next = match timeout(idle_timeout, ws_rx.next()).await {
            Ok(next) => next,
            Err(_) => {
                info!("Closing idle connection {} after {:?}", connection.id, idle_timeout);
                break;
            }
        };

        match next {
            Some(Ok(msg)) => {
                if msg.is_close() {
                    break;
                }
                // Only process text messages
                if msg.is_text() {
                    process_message(msg, &connection, &server).await;
                }
            }
            Some(Err(e)) => {
                warn!("WebSocket error on {}: {}", connection.id, e);
                break;
            }
            None => break,
        }
    }

    // Client disconnected
    server.disconnect(&connection.id);
    info!(
        "Client disconnected: {} after {:?}",
        connection.id,
        connection.connection_duration()
    );
    info!("Current connections: {}", server.connection_count());
}

// Process an incoming WebSocket message
async fn process_message(msg: Message, connection: &Connection, server: &ServerManager) {
    // Extract the message content
    let raw = match msg.to_str() {
        Ok(s) => s,
        Err(_) => {
            warn!("Failed to extract text from message on {}", connection.id);
            return;
        }
    };

    match server.handle_client_frame(&connection.id, raw).await {
        Ok(Some(reply)) => {
            connection.send(reply);
        }
        Ok(None) => {}
        Err(e) => {
            match &e {
                RelayError::AuthError(_) | RelayError::Unauthorized | RelayError::Forbidden => {
                    warn!("Rejected frame from {}: {}", connection.id, e)
                }
                _ => debug!("Rejected frame from {}: {}", connection.id, e),
            }
            connection.send(ServerMessage::error(&e));
        }
    }
}

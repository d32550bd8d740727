// End-to-end tests against an in-process relay bound to an ephemeral port

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chat_relay::handlers::routes;
use common::{server_manager, token_for};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn start_server(idle_timeout: Duration) -> SocketAddr {
    let server = server_manager();
    let (addr, serving) = warp::serve(routes(server, idle_timeout)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(serving);
    addr
}

async fn connect(addr: SocketAddr, header: Option<(&'static str, String)>) -> Client {
    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    if let Some((name, value)) = header {
        request.headers_mut().insert(name, value.parse().unwrap());
    }
    let (client, _response) = connect_async(request).await.expect("handshake failed");
    client
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let msg = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(client: &mut Client, value: Value) {
    client.send(Message::Text(value.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_message_flow_between_two_clients() {
    let addr = start_server(Duration::from_secs(30));

    let mut alice = connect(addr, Some(("authorization", format!("Bearer {}", token_for("alice"))))).await;
    let connected = next_json(&mut alice).await;
    assert_eq!(connected["type"], "connected");
    assert_eq!(connected["authenticated"], true);

    // Second client authenticates with a frame instead of a header
    let mut bob = connect(addr, None).await;
    assert_eq!(next_json(&mut bob).await["authenticated"], false);
    send_json(&mut bob, json!({"type": "authenticate", "token": token_for("bob")})).await;
    let authed = next_json(&mut bob).await;
    assert_eq!(authed["type"], "authenticated");
    assert_eq!(authed["participant_id"], "bob");

    for client in [&mut alice, &mut bob] {
        send_json(client, json!({"type": "join_conversation", "conversation_id": "c1"})).await;
        assert_eq!(next_json(client).await["type"], "joined");
    }

    send_json(
        &mut alice,
        json!({"type": "send_message", "conversation_id": "c1", "content": "hello bob"}),
    )
    .await;

    let event = next_json(&mut bob).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["conversation_id"], "c1");
    assert_eq!(event["actor_id"], "alice");
    assert_eq!(event["event"]["kind"], "text_sent");
    assert_eq!(event["event"]["content"], "hello bob");
    assert!(event["timestamp"].is_string());

    send_json(&mut alice, json!({"type": "set_typing", "conversation_id": "c1", "is_typing": true})).await;
    let typing = next_json(&mut bob).await;
    assert_eq!(typing["event"]["kind"], "typing_changed");
}

#[tokio::test]
async fn test_errors_go_to_the_sender_only() {
    let addr = start_server(Duration::from_secs(30));

    let mut anon = connect(addr, None).await;
    next_json(&mut anon).await;
    send_json(&mut anon, json!({"type": "join_conversation", "conversation_id": "c1"})).await;
    let err = next_json(&mut anon).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["code"], "UNAUTHORIZED");

    anon.send(Message::Text("definitely not json".to_string())).await.unwrap();
    assert_eq!(next_json(&mut anon).await["code"], "INVALID_FRAME");
}

#[tokio::test]
async fn test_subprotocol_token_authenticates() {
    let addr = start_server(Duration::from_secs(30));

    let protocol = format!("bearer.{}", token_for("dana"));
    let mut client = connect(addr, Some(("sec-websocket-protocol", protocol))).await;
    let connected = next_json(&mut client).await;
    assert_eq!(connected["authenticated"], true);
}

#[tokio::test]
async fn test_bad_handshake_token_keeps_connection_anonymous() {
    let addr = start_server(Duration::from_secs(30));

    let mut client = connect(addr, Some(("authorization", "Bearer nope".to_string()))).await;
    let connected = next_json(&mut client).await;
    assert_eq!(connected["authenticated"], false);
    assert_eq!(next_json(&mut client).await["code"], "AUTH_FAILED");
}

#[tokio::test]
async fn test_idle_connection_is_closed() {
    let addr = start_server(Duration::from_millis(200));
    let mut client = connect(addr, None).await;
    next_json(&mut client).await;

    let closed = timeout(Duration::from_secs(3), async {
        loop {
            match client.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "idle connection was not closed");
}

#[tokio::test]
async fn test_health_reports_connections_and_cache() {
    let addr = start_server(Duration::from_secs(30));
    let mut client = connect(addr, None).await;
    next_json(&mut client).await;

    let body: Value = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["connections"], 1);
    assert_eq!(body["cache"]["connected"], true);
    assert_eq!(body["cache"]["backend"], "memory");
    assert_eq!(body["status"], "degraded");
}

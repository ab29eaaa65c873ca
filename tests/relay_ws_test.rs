use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

use wildpals_relay::client::manager::ConnectionManager;
use wildpals_relay::client::policy::{ConnectionState, ReconnectPolicy};
use wildpals_relay::db::pool::{create_memory_pool, run_migrations};
use wildpals_relay::db::queries::profiles;
use wildpals_relay::relay::event_relay::EventRelay;
use wildpals_relay::web::app_state::AppState;
use wildpals_relay::web::router::build_router;

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a relay server on an ephemeral port. The server runs in the
/// background; returns its address and the database pool.
async fn start_server() -> (SocketAddr, sqlx::SqlitePool) {
    let pool = create_memory_pool().await.expect("create pool");
    run_migrations(&pool).await.expect("run migrations");

    let relay = Arc::new(EventRelay::new(Some(pool.clone())));
    let state = Arc::new(AppState {
        relay,
        db: Some(pool.clone()),
    });
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, pool)
}

async fn connect_ws(addr: SocketAddr) -> WsStream {
    let (stream, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("ws connect");
    stream
}

async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Read the next text frame as JSON, or panic after the timeout.
async fn recv_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for event")
            .expect("stream ended")
            .expect("ws read error");
        if let tungstenite::Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("parse event");
        }
    }
}

/// Assert that no frame arrives within a short window.
async fn assert_silent(ws: &mut WsStream) {
    let result = time::timeout(Duration::from_millis(300), ws.next()).await;
    assert!(result.is_err(), "expected no event, got {:?}", result);
}

/// Identify and wait until the server has processed it. A self-DM round-trip
/// proves every earlier frame on this connection has been handled, since
/// frames are processed to completion in order.
async fn identify_synced(ws: &mut WsStream, user_id: &str) {
    send_json(ws, serde_json::json!({ "type": "join-user-room", "userId": user_id })).await;
    send_json(
        ws,
        serde_json::json!({
            "type": "direct_message",
            "senderId": user_id,
            "receiverId": user_id,
            "message": "sync"
        }),
    )
    .await;
    let event = recv_json(ws).await;
    assert_eq!(event["type"], "new_direct_message");
}

#[tokio::test]
async fn health_endpoint_responds_ok() {
    let (addr, _pool) = start_server().await;
    let resp = reqwest::get(format!("http://{addr}/api/health"))
        .await
        .expect("health request");
    assert!(resp.status().is_success());
}

#[tokio::test]
async fn direct_message_is_persisted_and_delivered_to_both_users() {
    let (addr, pool) = start_server().await;
    profiles::upsert_profile(&pool, "u1", "alice", None)
        .await
        .unwrap();

    let mut alice = connect_ws(addr).await;
    let mut bob = connect_ws(addr).await;
    identify_synced(&mut alice, "u1").await;
    identify_synced(&mut bob, "u2").await;

    send_json(
        &mut alice,
        serde_json::json!({
            "type": "direct_message",
            "senderId": "u1",
            "receiverId": "u2",
            "message": "hi"
        }),
    )
    .await;

    for ws in [&mut alice, &mut bob] {
        let event = recv_json(ws).await;
        assert_eq!(event["type"], "new_direct_message");
        assert_eq!(event["senderId"], "u1");
        assert_eq!(event["receiverId"], "u2");
        assert_eq!(event["message"], "hi");
        assert_eq!(event["senderUsername"], "alice");
    }

    // The row is durable and visible over the REST history surface.
    let resp: serde_json::Value = reqwest::get(format!(
        "http://{addr}/api/messages/direct/u1/u2?limit=10"
    ))
    .await
    .expect("history request")
    .json()
    .await
    .expect("parse history");
    let messages = resp["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["message"], "hi");
}

#[tokio::test]
async fn club_message_is_isolated_to_room_members() {
    let (addr, _pool) = start_server().await;

    let mut member = connect_ws(addr).await;
    let mut bystander = connect_ws(addr).await;

    send_json(
        &mut member,
        serde_json::json!({ "type": "join_club", "clubId": "club42" }),
    )
    .await;
    identify_synced(&mut member, "u3").await;
    identify_synced(&mut bystander, "u4").await;

    send_json(
        &mut member,
        serde_json::json!({
            "type": "club_message",
            "clubId": "club42",
            "userId": "u3",
            "message": "hello club"
        }),
    )
    .await;

    let event = recv_json(&mut member).await;
    assert_eq!(event["type"], "new_club_message");
    assert_eq!(event["clubId"], "club42");
    assert_eq!(event["message"], "hello club");

    assert_silent(&mut bystander).await;
}

#[tokio::test]
async fn invalid_events_error_only_the_originator() {
    let (addr, _pool) = start_server().await;

    let mut alice = connect_ws(addr).await;
    let mut bob = connect_ws(addr).await;
    identify_synced(&mut alice, "u1").await;
    identify_synced(&mut bob, "u2").await;

    // Unknown event type is rejected at the boundary.
    send_json(&mut alice, serde_json::json!({ "type": "make_me_admin" })).await;
    let event = recv_json(&mut alice).await;
    assert_eq!(event["type"], "error");

    // Empty message fails validation; nothing reaches the receiver.
    send_json(
        &mut alice,
        serde_json::json!({
            "type": "direct_message",
            "senderId": "u1",
            "receiverId": "u2",
            "message": "   "
        }),
    )
    .await;
    let event = recv_json(&mut alice).await;
    assert_eq!(event["type"], "error");

    assert_silent(&mut bob).await;
}

#[tokio::test]
async fn follow_notification_reaches_target_room() {
    let (addr, _pool) = start_server().await;

    let mut follower = connect_ws(addr).await;
    let mut followed = connect_ws(addr).await;
    identify_synced(&mut follower, "u1").await;
    identify_synced(&mut followed, "u2").await;

    send_json(
        &mut follower,
        serde_json::json!({
            "type": "user-followed",
            "followedUserId": "u2",
            "followerId": "u1",
            "followerData": { "username": "alice" },
            "timestamp": "2026-08-25T10:00:00Z"
        }),
    )
    .await;

    let event = recv_json(&mut followed).await;
    assert_eq!(event["type"], "new-follower");
    assert_eq!(event["followerId"], "u1");
    assert_eq!(event["followerData"]["username"], "alice");

    let event = recv_json(&mut follower).await;
    assert_eq!(event["type"], "following-updated");
    assert_eq!(event["userId"], "u2");
}

fn fast_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        probe_timeout: Duration::from_secs(1),
        probe_retry_delay: Duration::from_millis(100),
        connect_attempts: 3,
        connect_retry_delay: Duration::from_millis(100),
        reconnect_delay: Duration::from_millis(100),
    }
}

async fn wait_for_connected(state: &mut tokio::sync::watch::Receiver<ConnectionState>) {
    time::timeout(Duration::from_secs(5), async {
        while *state.borrow() != ConnectionState::Connected {
            state.changed().await.unwrap();
        }
    })
    .await
    .expect("manager never connected");
}

/// Bind an address that may still have sockets in TIME_WAIT from a previous
/// listener, retrying briefly while the old one is released.
async fn bind_reusable(addr: SocketAddr) -> tokio::net::TcpListener {
    for _ in 0..50 {
        let socket = tokio::net::TcpSocket::new_v4().expect("create socket");
        socket.set_reuseaddr(true).expect("set reuseaddr");
        if socket.bind(addr).is_ok() {
            if let Ok(listener) = socket.listen(64) {
                return listener;
            }
        }
        time::sleep(Duration::from_millis(50)).await;
    }
    panic!("failed to bind {addr}");
}

/// Forward TCP connections to `upstream`. Aborting the task severs every
/// connection it carries: the JoinSet aborts its forwarding tasks on drop,
/// which closes both ends.
async fn proxy_connections(listener: tokio::net::TcpListener, upstream: SocketAddr) {
    let mut conns = tokio::task::JoinSet::new();
    loop {
        let Ok((mut inbound, _)) = listener.accept().await else {
            break;
        };
        conns.spawn(async move {
            if let Ok(mut outbound) = tokio::net::TcpStream::connect(upstream).await {
                let _ = tokio::io::copy_bidirectional(&mut inbound, &mut outbound).await;
            }
        });
    }
}

#[tokio::test]
async fn connection_manager_identifies_and_receives_events() {
    let (addr, _pool) = start_server().await;

    let manager =
        ConnectionManager::start(format!("http://{addr}"), "u9".into(), fast_policy());
    let mut events = manager.subscribe();

    let mut state = manager.state();
    wait_for_connected(&mut state).await;

    // Give the server a beat to process the identify frame it just received.
    time::sleep(Duration::from_millis(200)).await;

    let mut sender = connect_ws(addr).await;
    identify_synced(&mut sender, "u8").await;
    send_json(
        &mut sender,
        serde_json::json!({
            "type": "direct_message",
            "senderId": "u8",
            "receiverId": "u9",
            "message": "are you there"
        }),
    )
    .await;

    let event = time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timeout waiting for manager event")
        .expect("event channel closed");
    match event {
        wildpals_relay::relay::events::RelayEvent::NewDirectMessage(msg) => {
            assert_eq!(msg.sender_id, "u8");
            assert_eq!(msg.message, "are you there");
        }
        other => panic!("expected NewDirectMessage, got {:?}", other),
    }

    manager.shutdown();
}

#[tokio::test]
async fn connection_manager_keeps_probing_until_server_appears() {
    // Reserve an address, then free it so the first probes fail.
    let placeholder = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = placeholder.local_addr().unwrap();
    drop(placeholder);

    let manager =
        ConnectionManager::start(format!("http://{addr}"), "u9".into(), fast_policy());
    let mut state = manager.state();

    time::sleep(Duration::from_millis(300)).await;
    assert_ne!(*state.borrow(), ConnectionState::Connected);

    // Bring the server up on that exact address; the probe loop finds it.
    let pool = create_memory_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();
    let relay = Arc::new(EventRelay::new(Some(pool.clone())));
    let app_state = Arc::new(AppState {
        relay,
        db: Some(pool),
    });
    let app = build_router(app_state);
    let listener = tokio::net::TcpListener::bind(addr).await.expect("rebind");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    wait_for_connected(&mut state).await;

    // The fresh session re-identified, so the personal room works again.
    time::sleep(Duration::from_millis(200)).await;
    let mut events = manager.subscribe();
    let mut sender = connect_ws(addr).await;
    identify_synced(&mut sender, "u8").await;
    send_json(
        &mut sender,
        serde_json::json!({
            "type": "direct_message",
            "senderId": "u8",
            "receiverId": "u9",
            "message": "welcome back"
        }),
    )
    .await;

    let event = time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timeout waiting for manager event")
        .expect("event channel closed");
    assert!(matches!(
        event,
        wildpals_relay::relay::events::RelayEvent::NewDirectMessage(_)
    ));

    manager.shutdown();
}

#[tokio::test]
async fn connection_manager_reidentifies_after_transport_drop() {
    let (server_addr, _pool) = start_server().await;

    // Front the server with a proxy so the established transport can be
    // severed without touching the server itself.
    let proxy_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = proxy_listener.local_addr().unwrap();
    let proxy = tokio::spawn(proxy_connections(proxy_listener, server_addr));

    let manager =
        ConnectionManager::start(format!("http://{proxy_addr}"), "u9".into(), fast_policy());
    let mut state = manager.state();
    wait_for_connected(&mut state).await;

    // Sever the live connection and stop accepting new ones.
    proxy.abort();
    time::timeout(Duration::from_secs(5), async {
        while *state.borrow() == ConnectionState::Connected {
            state.changed().await.unwrap();
        }
    })
    .await
    .expect("manager never noticed the dropped transport");

    // Restore the path; the probe loop finds it and a fresh session opens.
    let proxy_listener = bind_reusable(proxy_addr).await;
    let _proxy = tokio::spawn(proxy_connections(proxy_listener, server_addr));
    wait_for_connected(&mut state).await;

    // The new session re-identified as u9, so a DM routed through the
    // personal room reaches the manager again.
    time::sleep(Duration::from_millis(200)).await;
    let mut events = manager.subscribe();
    let mut sender = connect_ws(server_addr).await;
    identify_synced(&mut sender, "u8").await;
    send_json(
        &mut sender,
        serde_json::json!({
            "type": "direct_message",
            "senderId": "u8",
            "receiverId": "u9",
            "message": "glad you're back"
        }),
    )
    .await;

    let event = time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timeout waiting for manager event")
        .expect("event channel closed");
    match event {
        wildpals_relay::relay::events::RelayEvent::NewDirectMessage(msg) => {
            assert_eq!(msg.sender_id, "u8");
            assert_eq!(msg.message, "glad you're back");
        }
        other => panic!("expected NewDirectMessage, got {:?}", other),
    }

    manager.shutdown();
}

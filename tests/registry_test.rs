use std::net::SocketAddr;
use std::time::Duration;

use rusty_relay::core::{create_registry, Connection, ConnectionId, ConnectionReader};
use rusty_relay::error::RustyRelayError;
use tokio::io::{duplex, AsyncReadExt, DuplexStream};

// In-memory connection: the registry side, the worker side and the client end
fn open(raw: u64) -> (Connection, ConnectionReader, DuplexStream) {
    let (client, server) = duplex(4096);
    let peer: SocketAddr = format!("127.0.0.1:{}", 50000 + raw).parse().unwrap();
    let (connection, reader) = Connection::from_io(server, peer, ConnectionId::new(raw), 1024);
    (connection, reader, client)
}

async fn read_message(client: &mut DuplexStream, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
        .await
        .expect("timed out waiting for broadcast")
        .expect("read failed");
    buf
}

async fn assert_silent(client: &mut DuplexStream) {
    let mut buf = [0u8; 16];
    let result = tokio::time::timeout(Duration::from_millis(100), client.read(&mut buf)).await;
    assert!(result.is_err(), "expected no data, got {:?}", result);
}

#[tokio::test]
async fn test_insert_rejects_duplicate_id() {
    let registry = create_registry();
    let (first, _r1, _c1) = open(1);
    let (second, _r2, _c2) = open(1);

    registry.insert(first).await.unwrap();
    match registry.insert(second).await {
        Err(RustyRelayError::DuplicateId(id)) => assert_eq!(id, ConnectionId::new(1)),
        other => panic!("expected DuplicateId, got {:?}", other),
    }
    assert_eq!(registry.size().await, 1);
}

#[tokio::test]
async fn test_remove_is_idempotent() {
    let registry = create_registry();
    let (a, _ra, _ca) = open(1);
    let (b, _rb, _cb) = open(2);
    registry.insert(a).await.unwrap();
    registry.insert(b).await.unwrap();

    assert!(registry.remove(ConnectionId::new(1)).await);
    assert_eq!(registry.ids().await, vec![ConnectionId::new(2)]);

    assert!(!registry.remove(ConnectionId::new(1)).await);
    assert_eq!(registry.ids().await, vec![ConnectionId::new(2)]);
}

#[tokio::test]
async fn test_removed_connection_is_closed() {
    let registry = create_registry();
    let (a, _ra, mut client) = open(1);
    registry.insert(a).await.unwrap();

    registry.remove(ConnectionId::new(1)).await;

    let mut buf = Vec::new();
    let n = client.read_to_end(&mut buf).await.unwrap();
    assert_eq!(n, 0);
}

#[tokio::test]
async fn test_broadcast_skips_sender() {
    let registry = create_registry();
    let (a, _ra, mut client_a) = open(1);
    let (b, _rb, mut client_b) = open(2);
    let (c, _rc, mut client_c) = open(3);
    for connection in [a, b, c] {
        registry.insert(connection).await.unwrap();
    }
    assert_eq!(registry.size().await, 3);

    let report = registry.broadcast(ConnectionId::new(1), b"hi").await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.delivered, 2);
    assert!(report.dropped.is_empty());

    assert_eq!(read_message(&mut client_b, 2).await, b"hi");
    assert_eq!(read_message(&mut client_c, 2).await, b"hi");
    assert_silent(&mut client_a).await;
}

#[tokio::test]
async fn test_broadcast_attempts_one_send_per_other_connection() {
    let registry = create_registry();
    let mut clients = Vec::new();
    let mut readers = Vec::new();
    for raw in 1..=6 {
        let (connection, reader, client) = open(raw);
        registry.insert(connection).await.unwrap();
        readers.push(reader);
        clients.push(client);
    }

    let report = registry.broadcast(ConnectionId::new(4), b"x").await;
    assert_eq!(report.attempted, 5);
    assert_eq!(report.delivered, 5);

    // A sender that is not registered reaches everyone
    let report = registry.broadcast(ConnectionId::new(99), b"y").await;
    assert_eq!(report.attempted, 6);
}

#[tokio::test]
async fn test_broadcast_drops_dead_peer_and_keeps_going() {
    let registry = create_registry();
    let (a, _ra, _client_a) = open(1);
    let (b, _rb, mut client_b) = open(2);
    let (c, _rc, client_c) = open(3);
    let (d, _rd, mut client_d) = open(4);
    for connection in [a, b, c, d] {
        registry.insert(connection).await.unwrap();
    }

    drop(client_c);

    let report = registry.broadcast(ConnectionId::new(1), b"ping").await;
    assert_eq!(report.attempted, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.dropped, vec![ConnectionId::new(3)]);

    assert!(!registry.contains(ConnectionId::new(3)).await);
    assert_eq!(registry.size().await, 3);
    assert_eq!(read_message(&mut client_b, 4).await, b"ping");
    assert_eq!(read_message(&mut client_d, 4).await, b"ping");

    // The dead peer's own worker may still try to remove it
    assert!(!registry.remove(ConnectionId::new(3)).await);
}

#[tokio::test]
async fn test_broadcast_with_no_other_peers() {
    let registry = create_registry();
    let (a, _ra, mut client_a) = open(1);
    registry.insert(a).await.unwrap();

    let report = registry.broadcast(ConnectionId::new(1), b"alone").await;
    assert_eq!(report.attempted, 0);
    assert_eq!(report.delivered, 0);
    assert_silent(&mut client_a).await;
}

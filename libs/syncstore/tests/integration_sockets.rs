//! Integration tests for shared sockets
//!
//! Connection sharing, per-kind listeners and opt-in reconnection.

mod common;

use common::FakeConnector;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use syncstore::registry::{SocketEvent, SocketEventKind, SocketRegistry};
use syncstore::{FixedDelay, ReconnectConfig, SyncConfig};

const URL: &str = "ws://feed.local/stream";

fn closed(code: u16) -> SocketEvent {
    SocketEvent::Close {
        code,
        reason: "gone".to_string(),
    }
}

#[test]
fn test_listeners_and_connect_share_one_socket() {
    let (connector, network) = FakeConnector::new();
    let registry = SocketRegistry::new(connector);
    let messages = Arc::new(Mutex::new(Vec::new()));
    let everything = Arc::new(Mutex::new(Vec::new()));

    let m = Arc::clone(&messages);
    let _on_message = registry
        .on(URL, &[], SocketEventKind::Message, move |event| {
            m.lock().push(event.clone())
        })
        .unwrap();
    let e = Arc::clone(&everything);
    let _raw = registry
        .connect(URL, &[], move |event| e.lock().push(event.kind()))
        .unwrap();

    assert_eq!(network.opened(), 1);
    assert_eq!(registry.connections().len(), 1);
    assert_eq!(registry.listeners().len(), 1);

    network.fire(SocketEvent::Open);
    network.fire(SocketEvent::Message("tick".into()));

    assert_eq!(*messages.lock(), vec![SocketEvent::Message("tick".into())]);
    assert_eq!(
        *everything.lock(),
        vec![SocketEventKind::Open, SocketEventKind::Message]
    );

    registry.send(URL, &[], "ping").unwrap();
    assert_eq!(*network.sent.lock(), vec!["ping".to_string()]);
}

#[test]
fn test_no_runtime_means_no_reconnect() {
    let (connector, network) = FakeConnector::new();
    let registry =
        SocketRegistry::new(connector).with_reconnect(|| FixedDelay::new(Duration::from_millis(1), None));

    let _consumer = registry.connect(URL, &[], |_| {}).unwrap();
    network.fire(SocketEvent::Open);
    network.fire(closed(1006));

    assert_eq!(network.opened(), 1);
    assert!(registry.send(URL, &[], "lost").is_err());
}

#[tokio::test]
async fn test_reconnects_while_consumers_remain() {
    verbose_println!("Testing socket reconnection...");

    let (connector, network) = FakeConnector::new();
    let registry =
        SocketRegistry::new(connector).with_reconnect(|| FixedDelay::new(Duration::from_millis(5), None));
    let kinds = Arc::new(Mutex::new(Vec::new()));

    let k = Arc::clone(&kinds);
    let consumer = registry
        .connect(URL, &[], move |event| k.lock().push(event.kind()))
        .unwrap();
    network.fire(SocketEvent::Open);
    network.fire(closed(1006));

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(network.opened(), 2);

    network.fire(SocketEvent::Open);
    network.fire(SocketEvent::Message("back".into()));
    registry.send(URL, &[], "hello again").unwrap();
    assert_eq!(
        *kinds.lock(),
        vec![
            SocketEventKind::Open,
            SocketEventKind::Close,
            SocketEventKind::Open,
            SocketEventKind::Message,
        ]
    );

    consumer.release();
    assert_eq!(network.closed(), 1);

    network.fire(closed(1000));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(network.opened(), 2);
    assert!(registry.connections().is_empty());
}

#[tokio::test]
async fn test_reconnect_gives_up_after_max_attempts() {
    let (connector, network) = FakeConnector::new();
    let registry = SocketRegistry::new(connector)
        .with_reconnect(|| FixedDelay::new(Duration::from_millis(5), Some(1)));

    let _consumer = registry.connect(URL, &[], |_| {}).unwrap();
    network.fire(closed(1006));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(network.opened(), 2);

    // never opened, so the attempt counter was not reset
    network.fire(closed(1006));
    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(network.opened(), 2);
}

#[tokio::test]
async fn test_listener_survives_reconnect() {
    let (connector, network) = FakeConnector::new();
    let registry =
        SocketRegistry::new(connector).with_reconnect(|| FixedDelay::new(Duration::from_millis(5), None));
    let messages = Arc::new(Mutex::new(Vec::new()));

    let m = Arc::clone(&messages);
    let listener = registry
        .on(URL, &[], SocketEventKind::Message, move |event| {
            if let SocketEvent::Message(text) = event {
                m.lock().push(text.clone());
            }
        })
        .unwrap();

    network.fire(SocketEvent::Message("one".into()));
    network.fire(closed(1006));
    tokio::time::sleep(Duration::from_millis(40)).await;
    network.fire(SocketEvent::Message("two".into()));

    assert_eq!(*messages.lock(), vec!["one".to_string(), "two".to_string()]);

    drop(listener);
    assert!(registry.listeners().is_empty());
    assert!(registry.connections().is_empty());
}

#[tokio::test]
async fn test_configured_registry_follows_reconnect_section() {
    let config = SyncConfig {
        reconnect: Some(ReconnectConfig {
            initial_delay_ms: 5,
            max_delay_ms: 20,
            max_attempts: Some(3),
        }),
        ..SyncConfig::default()
    };
    let (connector, network) = FakeConnector::new();
    let registry = config.socket_registry(connector);
    let _consumer = registry.connect(URL, &[], |_| {}).unwrap();
    network.fire(closed(1006));
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(network.opened(), 2);

    let (connector, network) = FakeConnector::new();
    let registry = SyncConfig::default().socket_registry(connector);
    let _consumer = registry.connect(URL, &[], |_| {}).unwrap();
    network.fire(closed(1006));
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(network.opened(), 1);
}

//! Shared socket connections
//!
//! One connection exists per (url, protocols). Listeners for a single event
//! kind are shared again on top of that, so the connection sees one native
//! listener per kind however many consumers ask for it.
//!
//! Reconnection is opt-in through a [`ReconnectionStrategy`]. When the
//! connection closes while it still has consumers, the next attempt is
//! scheduled on the ambient tokio runtime. Without a runtime the socket stays
//! closed and a warning is logged.

use crate::error::{Result, StoreError};
use crate::registry::identity::IdentityKey;
use crate::registry::instances::{Consumer, EventSink, InstanceRegistry};
use crate::traits::{NativeResource, NeverReconnect, ReconnectionStrategy};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Something that happened on a socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    Open,
    Message(String),
    Error(String),
    Close { code: u16, reason: String },
}

impl SocketEvent {
    pub fn kind(&self) -> SocketEventKind {
        match self {
            SocketEvent::Open => SocketEventKind::Open,
            SocketEvent::Message(_) => SocketEventKind::Message,
            SocketEvent::Error(_) => SocketEventKind::Error,
            SocketEvent::Close { .. } => SocketEventKind::Close,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketEventKind {
    Open,
    Message,
    Error,
    Close,
}

/// Handler a connector calls for every event on a connection
pub type SocketEventHandler = Box<dyn Fn(SocketEvent) + Send + Sync>;

/// An open socket
pub trait SocketConnection: Send + Sync {
    fn send(&self, data: &str) -> Result<()>;

    fn close(&self, code: u16, reason: &str);
}

/// Opens sockets
///
/// Implementations must deliver events through `events` only after `connect`
/// has returned.
pub trait SocketConnector: Send + Sync + 'static {
    fn connect(
        &self,
        url: &str,
        protocols: &[String],
        events: SocketEventHandler,
    ) -> Result<Box<dyn SocketConnection>>;
}

type StrategyFactory = Arc<dyn Fn() -> Box<dyn ReconnectionStrategy> + Send + Sync>;

/// Everything needed to (re)open one connection
struct Endpoint<C> {
    connector: Arc<C>,
    url: String,
    protocols: Vec<String>,
    strategy: StrategyFactory,
}

impl<C> Clone for Endpoint<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            url: self.url.clone(),
            protocols: self.protocols.clone(),
            strategy: Arc::clone(&self.strategy),
        }
    }
}

struct ConnectionState<C> {
    endpoint: Endpoint<C>,
    live: Mutex<Option<Box<dyn SocketConnection>>>,
    sink: Mutex<Option<EventSink<SocketEvent>>>,
    strategy: Mutex<Box<dyn ReconnectionStrategy>>,
    attached: AtomicBool,
    attempt: AtomicUsize,
}

impl<C: SocketConnector> ConnectionState<C> {
    fn open(self: &Arc<Self>) -> Result<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let events: SocketEventHandler = Box::new(move |event: SocketEvent| {
            if let Some(state) = weak.upgrade() {
                state.handle(event);
            }
        });
        let connection = self.endpoint.connector.connect(
            &self.endpoint.url,
            &self.endpoint.protocols,
            events,
        )?;

        if !self.attached.load(Ordering::Acquire) {
            connection.close(1000, "");
            return Ok(());
        }
        *self.live.lock() = Some(connection);
        Ok(())
    }

    fn handle(self: &Arc<Self>, event: SocketEvent) {
        match &event {
            SocketEvent::Open => {
                self.attempt.store(0, Ordering::Release);
                self.strategy.lock().reset();
                debug!("[socket] open {}", self.endpoint.url);
            }
            SocketEvent::Close { code, reason } => {
                self.live.lock().take();
                debug!("[socket] closed {} ({} {})", self.endpoint.url, code, reason);
            }
            _ => {}
        }

        let sink = self.sink.lock().clone();
        if let Some(sink) = sink {
            sink.emit(&event);
        }

        if matches!(event, SocketEvent::Close { .. }) && self.attached.load(Ordering::Acquire) {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let attempt = self.attempt.fetch_add(1, Ordering::AcqRel);
        let Some(delay) = self.strategy.lock().next_delay(attempt) else {
            debug!("[socket] not reconnecting {} after attempt {}", self.endpoint.url, attempt);
            return;
        };

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    "[socket] no tokio runtime, {} stays closed",
                    self.endpoint.url
                );
                return;
            }
        };

        info!(
            "[socket] reconnecting {} in {:?} (attempt {})",
            self.endpoint.url,
            delay,
            attempt + 1
        );
        let weak = Arc::downgrade(self);
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(state) = weak.upgrade() else {
                return;
            };
            if !state.attached.load(Ordering::Acquire) {
                return;
            }
            if let Err(e) = state.open() {
                warn!("[socket] reconnect to {} failed: {}", state.endpoint.url, e);
                state.schedule_reconnect();
            }
        });
    }
}

/// One shared connection
pub struct ConnectionResource<C: SocketConnector> {
    state: Arc<ConnectionState<C>>,
}

impl<C: SocketConnector> ConnectionResource<C> {
    fn new(endpoint: Endpoint<C>) -> Self {
        let strategy = (endpoint.strategy)();
        Self {
            state: Arc::new(ConnectionState {
                endpoint,
                live: Mutex::new(None),
                sink: Mutex::new(None),
                strategy: Mutex::new(strategy),
                attached: AtomicBool::new(false),
                attempt: AtomicUsize::new(0),
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.state.endpoint.url
    }

    pub fn is_open(&self) -> bool {
        self.state.live.lock().is_some()
    }

    pub fn send(&self, data: &str) -> Result<()> {
        match self.state.live.lock().as_ref() {
            Some(connection) => connection.send(data),
            None => Err(StoreError::Resource(format!(
                "socket {} is not open",
                self.state.endpoint.url
            ))),
        }
    }
}

impl<C: SocketConnector> NativeResource for ConnectionResource<C> {
    type Event = SocketEvent;

    fn attach(&self, sink: EventSink<SocketEvent>) -> Result<()> {
        *self.state.sink.lock() = Some(sink);
        self.state.attached.store(true, Ordering::Release);
        if let Err(e) = self.state.open() {
            self.state.attached.store(false, Ordering::Release);
            self.state.sink.lock().take();
            return Err(e);
        }
        Ok(())
    }

    fn detach(&self) {
        self.state.attached.store(false, Ordering::Release);
        self.state.sink.lock().take();
        if let Some(connection) = self.state.live.lock().take() {
            connection.close(1000, "");
        }
    }
}

/// One shared listener for a single event kind on a shared connection
pub struct SocketListenerResource<C: SocketConnector> {
    connections: InstanceRegistry<ConnectionResource<C>>,
    connection_key: IdentityKey,
    endpoint: Endpoint<C>,
    kind: SocketEventKind,
    upstream: Mutex<Option<Consumer>>,
}

impl<C: SocketConnector> NativeResource for SocketListenerResource<C> {
    type Event = SocketEvent;

    fn attach(&self, sink: EventSink<SocketEvent>) -> Result<()> {
        let kind = self.kind;
        let endpoint = self.endpoint.clone();
        let consumer = self.connections.subscribe(
            self.connection_key.clone(),
            move || Ok(ConnectionResource::new(endpoint)),
            move |event: &SocketEvent| {
                if event.kind() == kind {
                    sink.emit(event);
                }
            },
        )?;
        *self.upstream.lock() = Some(consumer);
        Ok(())
    }

    fn detach(&self) {
        if let Some(consumer) = self.upstream.lock().take() {
            consumer.release();
        }
    }
}

/// Registry of shared socket connections
pub struct SocketRegistry<C: SocketConnector> {
    connector: Arc<C>,
    strategy: StrategyFactory,
    connections: InstanceRegistry<ConnectionResource<C>>,
    listeners: InstanceRegistry<SocketListenerResource<C>>,
}

impl<C: SocketConnector> Clone for SocketRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            strategy: Arc::clone(&self.strategy),
            connections: self.connections.clone(),
            listeners: self.listeners.clone(),
        }
    }
}

impl<C: SocketConnector> std::fmt::Debug for SocketRegistry<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocketRegistry")
            .field("connections", &self.connections)
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl<C: SocketConnector> SocketRegistry<C> {
    /// Registry whose connections never reconnect
    pub fn new(connector: C) -> Self {
        Self {
            connector: Arc::new(connector),
            strategy: Arc::new(|| Box::new(NeverReconnect) as Box<dyn ReconnectionStrategy>),
            connections: InstanceRegistry::new("socket"),
            listeners: InstanceRegistry::new("socket-listener"),
        }
    }

    /// Reconnect closed connections using a fresh strategy from `factory`
    pub fn with_reconnect<S>(mut self, factory: impl Fn() -> S + Send + Sync + 'static) -> Self
    where
        S: ReconnectionStrategy + 'static,
    {
        self.strategy = Arc::new(move || Box::new(factory()) as Box<dyn ReconnectionStrategy>);
        self
    }

    pub fn connection_key(url: &str, protocols: &[String]) -> Result<IdentityKey> {
        IdentityKey::from_parts(&json!({ "url": url, "protocols": protocols }))
    }

    fn endpoint(&self, url: &str, protocols: &[String]) -> Endpoint<C> {
        Endpoint {
            connector: Arc::clone(&self.connector),
            url: url.to_string(),
            protocols: protocols.to_vec(),
            strategy: Arc::clone(&self.strategy),
        }
    }

    /// Receive every event of the connection for (url, protocols)
    pub fn connect(
        &self,
        url: &str,
        protocols: &[String],
        callback: impl Fn(&SocketEvent) + Send + Sync + 'static,
    ) -> Result<Consumer> {
        let key = Self::connection_key(url, protocols)?;
        let endpoint = self.endpoint(url, protocols);
        self.connections
            .subscribe(key, move || Ok(ConnectionResource::new(endpoint)), callback)
    }

    /// Receive only `kind` events of the connection for (url, protocols)
    pub fn on(
        &self,
        url: &str,
        protocols: &[String],
        kind: SocketEventKind,
        callback: impl Fn(&SocketEvent) + Send + Sync + 'static,
    ) -> Result<Consumer> {
        let connection_key = Self::connection_key(url, protocols)?;
        let key = IdentityKey::from_parts(&json!({
            "url": url,
            "protocols": protocols,
            "kind": kind,
        }))?;
        let connections = self.connections.clone();
        let endpoint = self.endpoint(url, protocols);
        self.listeners.subscribe(
            key,
            move || {
                Ok(SocketListenerResource {
                    connections,
                    connection_key,
                    endpoint,
                    kind,
                    upstream: Mutex::new(None),
                })
            },
            callback,
        )
    }

    /// Send over the shared connection; fails when nobody holds it open
    pub fn send(&self, url: &str, protocols: &[String], data: &str) -> Result<()> {
        let key = Self::connection_key(url, protocols)?;
        let instance = self
            .connections
            .get(&key)
            .ok_or_else(|| StoreError::Resource(format!("no connection to {url}")))?;
        instance.resource().send(data)
    }

    pub fn connections(&self) -> &InstanceRegistry<ConnectionResource<C>> {
        &self.connections
    }

    pub fn listeners(&self) -> &InstanceRegistry<SocketListenerResource<C>> {
        &self.listeners
    }

    pub fn reset(&self) {
        self.listeners.reset();
        self.connections.reset();
    }
}

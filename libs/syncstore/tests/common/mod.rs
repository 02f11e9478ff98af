//! Common test utilities for syncstore integration tests
//!
//! In-process stand-ins for the native side: an event target, an observer
//! backend and a socket connector, each recording what was installed on it.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use syncstore::registry::{
    EventTarget, Identify, IntersectionOptions, ListenerOptions, NativeHandler, NativeListenerId,
    NativeObserver, ObserverBackend, ObserverCallback, SocketConnection, SocketConnector,
    SocketEvent, SocketEventHandler, TargetId,
};
use syncstore::Result;

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

type Installed = (NativeListenerId, String, ListenerOptions, NativeHandler<String>);

/// An event target that dispatches string events
pub struct FakeTarget {
    id: TargetId,
    next_listener: AtomicUsize,
    listeners: Mutex<Vec<Installed>>,
    pub added: AtomicUsize,
    pub removed: AtomicUsize,
}

impl FakeTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: TargetId::fresh(),
            next_listener: AtomicUsize::new(1),
            listeners: Mutex::new(Vec::new()),
            added: AtomicUsize::new(0),
            removed: AtomicUsize::new(0),
        })
    }

    /// Number of native listeners currently installed
    pub fn installed(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Dispatch `event` to every native listener for `kind`
    pub fn dispatch(&self, kind: &str, event: &str) {
        let handlers: Vec<NativeHandler<String>> = self
            .listeners
            .lock()
            .iter()
            .filter(|(_, k, _, _)| k == kind)
            .map(|(_, _, _, handler)| Arc::clone(handler))
            .collect();
        let event = event.to_string();
        for handler in handlers {
            handler(&event);
        }
    }
}

impl Identify for FakeTarget {
    fn target_id(&self) -> TargetId {
        self.id
    }
}

impl EventTarget for FakeTarget {
    type Event = String;

    fn add_event_listener(
        &self,
        kind: &str,
        options: ListenerOptions,
        handler: NativeHandler<String>,
    ) -> Result<NativeListenerId> {
        let id = NativeListenerId(self.next_listener.fetch_add(1, Ordering::SeqCst) as u64);
        self.listeners
            .lock()
            .push((id, kind.to_string(), options, handler));
        self.added.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    fn remove_event_listener(&self, _kind: &str, _options: ListenerOptions, id: NativeListenerId) {
        self.listeners.lock().retain(|(installed, _, _, _)| *installed != id);
        self.removed.fetch_add(1, Ordering::SeqCst);
    }
}

/// An element observers can watch
pub struct FakeElement {
    id: TargetId,
}

impl FakeElement {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            id: TargetId::fresh(),
        })
    }
}

impl Identify for FakeElement {
    fn target_id(&self) -> TargetId {
        self.id
    }
}

/// What the fake observer backend has seen
#[derive(Default)]
pub struct ObserverLog {
    pub created: AtomicUsize,
    pub observed: AtomicUsize,
    pub unobserved: AtomicUsize,
    pub disconnected: AtomicUsize,
    callbacks: Mutex<Vec<Arc<ObserverCallback<f64>>>>,
}

impl ObserverLog {
    /// Deliver `entries` through the most recently created observer
    pub fn fire(&self, entries: &[f64]) {
        let callback = self.callbacks.lock().last().cloned();
        if let Some(callback) = callback {
            (**callback)(entries);
        }
    }
}

struct FakeObserver {
    log: Arc<ObserverLog>,
}

impl NativeObserver<FakeElement> for FakeObserver {
    fn observe(&self, _target: &FakeElement) {
        self.log.observed.fetch_add(1, Ordering::SeqCst);
    }

    fn unobserve(&self, _target: &FakeElement) {
        self.log.unobserved.fetch_add(1, Ordering::SeqCst);
    }

    fn disconnect(&self) {
        self.log.disconnected.fetch_add(1, Ordering::SeqCst);
    }
}

/// Intersection backend reporting visibility ratios
pub struct FakeIntersectionBackend {
    pub log: Arc<ObserverLog>,
}

impl FakeIntersectionBackend {
    pub fn new() -> (Self, Arc<ObserverLog>) {
        let log = Arc::new(ObserverLog::default());
        (
            Self {
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl ObserverBackend for FakeIntersectionBackend {
    type Target = FakeElement;
    type Options = IntersectionOptions;
    type Entry = f64;

    fn kind(&self) -> &'static str {
        "intersection"
    }

    fn create(
        &self,
        _options: &IntersectionOptions,
        callback: ObserverCallback<f64>,
    ) -> Result<Box<dyn NativeObserver<FakeElement>>> {
        self.log.created.fetch_add(1, Ordering::SeqCst);
        self.log.callbacks.lock().push(Arc::new(callback));
        Ok(Box::new(FakeObserver {
            log: Arc::clone(&self.log),
        }))
    }
}

/// Shared state of the fake socket network
#[derive(Default)]
pub struct Network {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub sent: Mutex<Vec<String>>,
    handlers: Mutex<Vec<Arc<SocketEventHandler>>>,
}

impl Network {
    /// Deliver `event` on the most recently opened connection
    pub fn fire(&self, event: SocketEvent) {
        let handler = self.handlers.lock().last().cloned();
        if let Some(handler) = handler {
            (**handler)(event);
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

struct FakeSocket {
    network: Arc<Network>,
}

impl SocketConnection for FakeSocket {
    fn send(&self, data: &str) -> Result<()> {
        self.network.sent.lock().push(data.to_string());
        Ok(())
    }

    fn close(&self, _code: u16, _reason: &str) {
        self.network.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Connector that always succeeds
pub struct FakeConnector {
    network: Arc<Network>,
}

impl FakeConnector {
    pub fn new() -> (Self, Arc<Network>) {
        let network = Arc::new(Network::default());
        (
            Self {
                network: Arc::clone(&network),
            },
            network,
        )
    }
}

impl SocketConnector for FakeConnector {
    fn connect(
        &self,
        _url: &str,
        _protocols: &[String],
        events: SocketEventHandler,
    ) -> Result<Box<dyn SocketConnection>> {
        self.network.opened.fetch_add(1, Ordering::SeqCst);
        self.network.handlers.lock().push(Arc::new(events));
        Ok(Box::new(FakeSocket {
            network: Arc::clone(&self.network),
        }))
    }
}

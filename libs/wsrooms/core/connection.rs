use crate::config::ConnectionOptions;
use crate::connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
use crate::traits::*;
use futures::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tracing::{debug, info, warn};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Internal command messages for the driver task
#[derive(Debug)]
enum ConnectionCommand {
    /// Write a frame to the link
    Send(WsMessage),
    /// Close the link (or abort a pending connect)
    Close,
}

/// Hook run when the link reaches OPEN, before `open` listeners fire
pub type OpenHook = Box<dyn Fn(&Connection) + Send + Sync>;

/// Hook run after `close` listeners fire
pub type CloseHook = Box<dyn Fn(&Connection, CloseInfo) + Send + Sync>;

/// Lifecycle hooks for the owner of a connection
#[derive(Default)]
pub struct ConnectionHooks {
    pub on_open: Option<OpenHook>,
    pub on_close: Option<CloseHook>,
}

struct ConnectionInner {
    id: u64,
    endpoint: String,
    options: ConnectionOptions,
    state: AtomicConnectionState,
    closed_manually: AtomicBool,
    metrics: AtomicMetrics,
    listeners: RwLock<Vec<ListenerRegistration>>,
}

/// One physical bidirectional link
///
/// A `Connection` is a cheap, cloneable handle. The link itself is driven by
/// a background task which:
/// - establishes the link (client side) or adopts an accepted one (server side)
/// - dispatches `open`, `message`, `error` and `close` events to listeners
/// - writes frames queued through [`send`](Connection::send)
///
/// Failures never surface to the caller: a failed connect is reported as an
/// `error` event followed by a `close` event. When every handle is dropped
/// the driver closes the link.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
    command_tx: UnboundedSender<ConnectionCommand>,
}

impl Connection {
    /// Start dialing `endpoint` and return immediately
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(
        connector: Arc<dyn Connector>,
        endpoint: impl Into<String>,
        options: ConnectionOptions,
        hooks: ConnectionHooks,
    ) -> Self {
        let (connection, mut command_rx) = Self::new_handle(endpoint.into(), options);
        let inner = Arc::clone(&connection.inner);
        let weak_tx = connection.command_tx.downgrade();

        tokio::spawn(async move {
            debug!("[conn {}] Connecting to {}", inner.id, inner.endpoint);

            let link = tokio::select! {
                result = connector.connect(&inner.endpoint) => match result {
                    Ok(link) => Some(link),
                    Err(e) => {
                        inner.dispatch(&WsEvent::Error(e.to_string()));
                        None
                    }
                },
                _ = wait_for_close(&mut command_rx) => {
                    debug!("[conn {}] Closed before the link was established", inner.id);
                    None
                }
            };

            match link {
                Some(link) => drive(inner, weak_tx, link, command_rx, hooks).await,
                None => finish(&inner, &weak_tx, &hooks, false),
            }
        });

        connection
    }

    /// Wrap an already established link (e.g. a server-side accepted socket)
    ///
    /// The connection is OPEN as soon as the driver task starts.
    pub fn accept(link: Link, peer: impl Into<String>, options: ConnectionOptions) -> Self {
        Self::accept_with_hooks(link, peer, options, ConnectionHooks::default())
    }

    pub fn accept_with_hooks(
        link: Link,
        peer: impl Into<String>,
        options: ConnectionOptions,
        hooks: ConnectionHooks,
    ) -> Self {
        let (connection, command_rx) = Self::new_handle(peer.into(), options);
        connection.inner.state.set(ConnectionState::Open);
        let inner = Arc::clone(&connection.inner);
        let weak_tx = connection.command_tx.downgrade();

        tokio::spawn(drive(inner, weak_tx, link, command_rx, hooks));

        connection
    }

    fn new_handle(
        endpoint: String,
        options: ConnectionOptions,
    ) -> (Self, UnboundedReceiver<ConnectionCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let inner = Arc::new(ConnectionInner {
            id: NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed),
            endpoint,
            options,
            state: AtomicConnectionState::new(ConnectionState::Connecting),
            closed_manually: AtomicBool::new(false),
            metrics: AtomicMetrics::new(),
            listeners: RwLock::new(Vec::new()),
        });
        (Self { inner, command_tx }, command_rx)
    }

    /// Send a payload through the link
    ///
    /// Structured payloads are serialized first. Fails with
    /// [`WsRoomsError::NotConnected`] unless the link is OPEN; nothing is queued.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        if !self.inner.state.is_open() || self.closed_manually() {
            return Err(WsRoomsError::NotConnected);
        }

        self.command_tx
            .send(ConnectionCommand::Send(payload.into().into_message()))
            .map_err(|e| WsRoomsError::ChannelSend(e.to_string()))
    }

    /// Close the link, or abort the connect if it is still pending
    ///
    /// Idempotent. The `close` event reports `manual: true`.
    pub fn close(&self) {
        if self.inner.closed_manually.swap(true, Ordering::AcqRel) {
            return;
        }
        debug!("[conn {}] Close requested", self.inner.id);
        let _ = self.command_tx.send(ConnectionCommand::Close);
    }

    /// Attach a listener for `kind`
    pub fn add_listener(&self, kind: EventKind, listener: Listener) {
        self.inner
            .listeners
            .write()
            .push(ListenerRegistration { kind, listener });
    }

    /// Detach a listener previously passed to `add_listener`
    ///
    /// Returns false if it was not registered.
    pub fn remove_listener(&self, listener: &Listener) -> bool {
        self.inner.remove_listener(listener)
    }

    /// Closure flavour of [`add_listener`](Connection::add_listener)
    pub fn on<F>(&self, kind: EventKind, f: F)
    where
        F: Fn(&WsEvent) + Send + Sync + 'static,
    {
        self.add_listener(kind, listener(f));
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.inner.state.get()
    }

    #[inline]
    pub fn is_open(&self) -> bool {
        self.inner.state.is_open()
    }

    /// True once `close()` has been called on any handle
    #[inline]
    pub fn closed_manually(&self) -> bool {
        self.inner.closed_manually.load(Ordering::Acquire)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    pub fn messages_sent(&self) -> u64 {
        self.inner.metrics.messages_sent()
    }

    pub fn messages_received(&self) -> u64 {
        self.inner.metrics.messages_received()
    }

    /// Identity comparison: true if both handles drive the same link
    pub fn same_link(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.inner.state.get())
            .field("closed_manually", &self.closed_manually())
            .finish()
    }
}

impl RoomClient for Connection {
    fn send(&self, message: WsMessage) -> Result<()> {
        Connection::send(self, message)
    }

    /// Fires exactly once, immediately if the link is already closed
    fn on_close(&self, callback: CloseCallback) -> DetachCallback {
        let fired = Arc::new(AtomicBool::new(false));
        let callback: Arc<CloseCallback> = Arc::new(callback);

        let close_listener = {
            let fired = Arc::clone(&fired);
            let callback = Arc::clone(&callback);
            listener(move |_| {
                if !fired.swap(true, Ordering::AcqRel) {
                    callback();
                }
            })
        };
        self.add_listener(EventKind::Close, Arc::clone(&close_listener));

        if self.inner.state.is_closed() && !fired.swap(true, Ordering::AcqRel) {
            callback();
        }

        let weak = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.remove_listener(&close_listener);
            }
        })
    }
}

impl ConnectionInner {
    fn remove_listener(&self, listener: &Listener) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|registration| !Arc::ptr_eq(&registration.listener, listener));
        listeners.len() != before
    }

    /// Call every listener registered for the event's kind, in registration order
    fn dispatch(&self, event: &WsEvent) {
        let kind = event.kind();
        self.log_event(event);

        // Snapshot so listeners may register more listeners without deadlocking
        let listeners: Vec<Listener> = self
            .listeners
            .read()
            .iter()
            .filter(|registration| registration.kind == kind)
            .map(|registration| Arc::clone(&registration.listener))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    fn log_event(&self, event: &WsEvent) {
        let verbose = self.options.verbose;
        match event {
            WsEvent::Open if verbose => {
                info!("WS > OPEN");
                info!("Connected successfully to WebSocket server: {}", self.endpoint);
            }
            WsEvent::Close(_) if verbose => info!("WS > CLOSE"),
            WsEvent::Error(e) if verbose => info!("WS > ERROR: {}", e),
            WsEvent::Message(_) => {}
            other => debug!("[conn {}] {} event", self.id, other.kind()),
        }
    }
}

/// Build a temporary handle for hooks, if any owner is still alive
fn handle(
    inner: &Arc<ConnectionInner>,
    weak_tx: &WeakUnboundedSender<ConnectionCommand>,
) -> Option<Connection> {
    weak_tx.upgrade().map(|command_tx| Connection {
        inner: Arc::clone(inner),
        command_tx,
    })
}

async fn wait_for_close(command_rx: &mut UnboundedReceiver<ConnectionCommand>) {
    loop {
        match command_rx.recv().await {
            Some(ConnectionCommand::Close) | None => return,
            Some(ConnectionCommand::Send(_)) => {
                warn!("Dropping frame queued before the link opened");
            }
        }
    }
}

/// Run an established link until it closes
async fn drive(
    inner: Arc<ConnectionInner>,
    weak_tx: WeakUnboundedSender<ConnectionCommand>,
    mut link: Link,
    mut command_rx: UnboundedReceiver<ConnectionCommand>,
    hooks: ConnectionHooks,
) {
    if inner.closed_manually.load(Ordering::Acquire) {
        let _ = link.sink.close().await;
        finish(&inner, &weak_tx, &hooks, false);
        return;
    }

    inner.state.set(ConnectionState::Open);

    if let Some(on_open) = &hooks.on_open {
        if let Some(connection) = handle(&inner, &weak_tx) {
            on_open(&connection);
        }
    }
    inner.dispatch(&WsEvent::Open);

    if let Err(e) = message_loop(&inner, &mut link, &mut command_rx).await {
        warn!("[conn {}] Link error: {}", inner.id, e);
        inner.dispatch(&WsEvent::Error(e.to_string()));
    }

    finish(&inner, &weak_tx, &hooks, true);
}

async fn message_loop(
    inner: &ConnectionInner,
    link: &mut Link,
    command_rx: &mut UnboundedReceiver<ConnectionCommand>,
) -> Result<()> {
    loop {
        tokio::select! {
            frame = link.stream.next() => {
                match frame {
                    Some(Ok(message)) => {
                        inner.metrics.increment_received();
                        inner.dispatch(&WsEvent::Message(message));
                    }
                    Some(Err(e)) => return Err(e),
                    None => {
                        debug!("[conn {}] Stream ended by peer", inner.id);
                        return Ok(());
                    }
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Send(message)) => {
                        link.sink.send(message).await?;
                        inner.metrics.increment_sent();
                    }
                    Some(ConnectionCommand::Close) => {
                        let _ = link.sink.close().await;
                        return Ok(());
                    }
                    None => {
                        debug!("[conn {}] All handles dropped, closing link", inner.id);
                        let _ = link.sink.close().await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn finish(
    inner: &Arc<ConnectionInner>,
    weak_tx: &WeakUnboundedSender<ConnectionCommand>,
    hooks: &ConnectionHooks,
    was_open: bool,
) {
    inner.state.set(ConnectionState::Closed);

    let info = CloseInfo {
        manual: inner.closed_manually.load(Ordering::Acquire),
        was_open,
    };
    inner.dispatch(&WsEvent::Close(info));

    if let Some(on_close) = &hooks.on_close {
        match handle(inner, weak_tx) {
            Some(connection) => on_close(&connection, info),
            None => debug!("[conn {}] Closed with no owner left", inner.id),
        }
    }
}

use crate::core::{
    AtomicManagerState, CloseHook, Connection, ConnectionHooks, ManagerConfig, ManagerState,
    OpenHook,
};
use crate::manager::builder::ManagerBuilder;
use crate::traits::*;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Manager metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerMetrics {
    /// Physical connections created
    pub connect_attempts: u64,
    /// Physical connections that reached OPEN
    pub successful_opens: u64,
    /// Reconnects scheduled after an unexpected close
    pub reconnects_scheduled: u64,
    pub state: ManagerState,
}

/// Supervisor for one logical connection
///
/// Owns at most one physical [`Connection`] at a time and replaces it after
/// every close that was not requested through [`close`](ConnectionManager::close).
/// Listeners registered with [`on`](ConnectionManager::on) survive physical
/// churn: they are replayed onto each new connection before its `open`
/// listeners fire.
///
/// State machine:
///
/// ```text
/// DISCONNECTED --connect()--> CONNECTING --open--> CONNECTED
///                                 ^                    |
///                                 +--retry_delay-- unexpected close
///
/// any state --close()--> DISCONNECTED
/// ```
///
/// The handle is cheap to clone; all clones drive the same logical connection.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

pub(crate) struct ManagerInner {
    endpoint: String,
    config: ManagerConfig,
    connector: Arc<dyn Connector>,
    strategy: Box<dyn ReconnectionStrategy>,
    state: AtomicManagerState,
    /// Suppresses auto-reconnect; reset by `connect()`
    closed_manually: AtomicBool,
    /// Bumped by `connect()` and `close()` so stale timers and hooks are ignored
    generation: AtomicU64,
    /// Consecutive failed attempts since the last successful open
    failed_attempts: AtomicUsize,
    /// Connection being dialed or currently open
    current: RwLock<Option<Connection>>,
    listeners: RwLock<Vec<ListenerRegistration>>,
    reconnect_task: Mutex<Option<JoinHandle<()>>>,
    connect_attempts: AtomicU64,
    successful_opens: AtomicU64,
    reconnects_scheduled: AtomicU64,
}

impl ConnectionManager {
    /// Create a manager for `endpoint` using the default tungstenite connector
    pub fn new(endpoint: impl Into<String>, config: ManagerConfig) -> Result<Self> {
        Self::builder(endpoint).config(config).build()
    }

    /// Start building a manager
    pub fn builder(endpoint: impl Into<String>) -> ManagerBuilder {
        ManagerBuilder::new(endpoint)
    }

    pub(crate) fn from_parts(
        endpoint: String,
        config: ManagerConfig,
        connector: Arc<dyn Connector>,
        strategy: Box<dyn ReconnectionStrategy>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                endpoint,
                config,
                connector,
                strategy,
                state: AtomicManagerState::new(ManagerState::Disconnected),
                closed_manually: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                failed_attempts: AtomicUsize::new(0),
                current: RwLock::new(None),
                listeners: RwLock::new(Vec::new()),
                reconnect_task: Mutex::new(None),
                connect_attempts: AtomicU64::new(0),
                successful_opens: AtomicU64::new(0),
                reconnects_scheduled: AtomicU64::new(0),
            }),
        }
    }

    /// Start the logical connection
    ///
    /// DISCONNECTED -> CONNECTING. A no-op while already CONNECTING or
    /// CONNECTED. Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let inner = &self.inner;
        let mut current = inner.current.write();

        if !inner
            .state
            .transition(ManagerState::Disconnected, ManagerState::Connecting)
        {
            debug!("connect() ignored, manager is {}", inner.state.get());
            return;
        }

        inner.closed_manually.store(false, Ordering::SeqCst);
        inner.failed_attempts.store(0, Ordering::SeqCst);
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;

        inner.log_transition(format_args!("Connecting to {}", inner.endpoint));
        inner.spawn_connection(&mut current, generation);
    }

    /// Close the logical connection and stop reconnecting
    ///
    /// Cancels any scheduled reconnect and closes the physical connection if
    /// one exists. Idempotent. The manager stays DISCONNECTED until
    /// `connect()` is called again.
    pub fn close(&self) {
        let inner = &self.inner;

        // Every state write happens under this lock after a staleness check
        let taken = {
            let mut current = inner.current.write();
            inner.closed_manually.store(true, Ordering::SeqCst);
            inner.generation.fetch_add(1, Ordering::SeqCst);

            if let Some(task) = inner.reconnect_task.lock().take() {
                task.abort();
            }

            let previous = inner.state.get();
            inner.state.set(ManagerState::Disconnected);
            current.take().map(|connection| (connection, previous))
        };

        match taken {
            Some((connection, previous)) => {
                inner.log_transition(format_args!(
                    "Closing connection to {} (was {})",
                    inner.endpoint, previous
                ));
                connection.close();
            }
            None => debug!("close() with no physical connection"),
        }
    }

    /// Register a listener for `kind`
    ///
    /// The registration is kept for the manager's lifetime and replayed onto
    /// every future physical connection. If a connection is open right now the
    /// listener is attached to it immediately as well.
    pub fn add_listener(&self, kind: EventKind, listener: Listener) {
        let inner = &self.inner;
        // Lock order: `current` before `listeners`, as in handle_open
        let current = inner.current.read();
        let mut listeners = inner.listeners.write();
        listeners.push(ListenerRegistration {
            kind,
            listener: Arc::clone(&listener),
        });

        if inner.state.get() == ManagerState::Connected {
            if let Some(connection) = current.as_ref() {
                connection.add_listener(kind, listener);
            }
        }
    }

    /// Closure flavour of [`add_listener`](ConnectionManager::add_listener)
    pub fn on<F>(&self, kind: EventKind, f: F)
    where
        F: Fn(&WsEvent) + Send + Sync + 'static,
    {
        self.add_listener(kind, listener(f));
    }

    /// Send through the active physical connection
    ///
    /// Fails with [`WsRoomsError::NotConnected`] while DISCONNECTED or
    /// CONNECTING; nothing is queued.
    pub fn send(&self, payload: impl Into<Payload>) -> Result<()> {
        let current = self.inner.current.read();
        match current.as_ref() {
            Some(connection) => connection.send(payload),
            None => Err(WsRoomsError::NotConnected),
        }
    }

    /// Serialize `value` to JSON and send it
    ///
    /// Serialization faults are returned before connectivity is checked.
    pub fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        let payload = Payload::json(value)?;
        self.send(payload)
    }

    /// True while the manager holds an opened physical connection
    ///
    /// Set when a connection opens and cleared when its close event is
    /// processed. There is a short window after the socket drops and before
    /// the close event lands where this still reports true; `send` will fail
    /// during that window.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.state.get() == ManagerState::Connected
    }

    #[inline]
    pub fn state(&self) -> ManagerState {
        self.inner.state.get()
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    /// The physical connection currently being dialed or open
    pub fn current_connection(&self) -> Option<Connection> {
        self.inner.current.read().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }

    pub fn metrics(&self) -> ManagerMetrics {
        let inner = &self.inner;
        ManagerMetrics {
            connect_attempts: inner.connect_attempts.load(Ordering::Relaxed),
            successful_opens: inner.successful_opens.load(Ordering::Relaxed),
            reconnects_scheduled: inner.reconnects_scheduled.load(Ordering::Relaxed),
            state: inner.state.get(),
        }
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.inner.state.get())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl ManagerInner {
    fn log_transition(&self, message: fmt::Arguments<'_>) {
        if self.config.verbose {
            info!("{}", message);
        } else {
            debug!("{}", message);
        }
    }

    fn is_stale(&self, generation: u64) -> bool {
        self.closed_manually.load(Ordering::SeqCst)
            || self.generation.load(Ordering::SeqCst) != generation
    }

    /// Create the next physical connection for `generation`
    ///
    /// Takes the `current` guard so hooks always observe the new connection
    /// as current.
    fn spawn_connection(self: &Arc<Self>, current: &mut Option<Connection>, generation: u64) {
        if self.is_stale(generation) {
            debug!("Skipping connection for stale generation {}", generation);
            return;
        }

        let on_open: OpenHook = {
            let weak = Arc::downgrade(self);
            Box::new(move |connection: &Connection| {
                if let Some(inner) = weak.upgrade() {
                    inner.handle_open(connection, generation);
                }
            })
        };
        let on_close: CloseHook = {
            let weak: Weak<ManagerInner> = Arc::downgrade(self);
            Box::new(move |connection: &Connection, info: CloseInfo| {
                if let Some(inner) = weak.upgrade() {
                    ManagerInner::handle_close(&inner, connection, info, generation);
                }
            })
        };

        self.connect_attempts.fetch_add(1, Ordering::Relaxed);
        let connection = Connection::open(
            Arc::clone(&self.connector),
            self.endpoint.clone(),
            self.config.connection_options(),
            ConnectionHooks {
                on_open: Some(on_open),
                on_close: Some(on_close),
            },
        );
        debug!("Created connection {} to {}", connection.id(), self.endpoint);
        *current = Some(connection);
    }

    /// Replay every registration onto the new link, then mark CONNECTED
    ///
    /// Runs before the connection dispatches its own `open` event, so replayed
    /// `open` listeners fire exactly once for this cycle.
    fn handle_open(&self, connection: &Connection, generation: u64) {
        // Held until CONNECTED is written so close() cannot interleave
        let current = self.current.write();
        let is_current = current
            .as_ref()
            .map_or(false, |active| active.same_link(connection));

        if self.is_stale(generation) || !is_current {
            drop(current);
            debug!("Connection {} opened after being replaced, closing it", connection.id());
            connection.close();
            return;
        }

        self.failed_attempts.store(0, Ordering::SeqCst);
        self.successful_opens.fetch_add(1, Ordering::Relaxed);

        // Holding the registry lock keeps concurrent on() calls from being missed or doubled
        let listeners = self.listeners.read();
        for registration in listeners.iter() {
            connection.add_listener(registration.kind, Arc::clone(&registration.listener));
        }
        self.state.set(ManagerState::Connected);
        drop(listeners);
        drop(current);

        self.log_transition(format_args!(
            "Connected to {} (connection {})",
            self.endpoint,
            connection.id()
        ));
    }

    fn handle_close(self: &Arc<Self>, connection: &Connection, info: CloseInfo, generation: u64) {
        // Held through the state write and the timer hand-off
        let mut current = self.current.write();
        match current.as_ref() {
            Some(active) if active.same_link(connection) => *current = None,
            _ => {
                debug!("Ignoring close of replaced connection {}", connection.id());
                return;
            }
        }

        if info.manual || self.is_stale(generation) {
            self.state.set(ManagerState::Disconnected);
            self.log_transition(format_args!("Disconnected from {}", self.endpoint));
            return;
        }

        self.schedule_reconnect(generation);
    }

    /// Caller holds the `current` write lock
    fn schedule_reconnect(self: &Arc<Self>, generation: u64) {
        let attempt = self.failed_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = match self.strategy.next_delay(attempt) {
            Some(delay) => delay,
            None => {
                warn!(
                    "Reconnection strategy exhausted after {} attempts, giving up on {}",
                    attempt, self.endpoint
                );
                self.state.set(ManagerState::Disconnected);
                return;
            }
        };

        self.state.set(ManagerState::Connecting);
        self.reconnects_scheduled.fetch_add(1, Ordering::Relaxed);
        self.log_transition(format_args!(
            "Connection to {} lost, reconnecting in {:?} (attempt {})",
            self.endpoint,
            delay,
            attempt + 1
        ));

        let weak = Arc::downgrade(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut current = inner.current.write();
            if inner.is_stale(generation) {
                debug!("Reconnect cancelled by close()");
                return;
            }
            inner.reconnect_task.lock().take();
            inner.spawn_connection(&mut current, generation);
        });

        *self.reconnect_task.lock() = Some(task);
    }
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.closed_manually.store(true, Ordering::SeqCst);
        if let Some(task) = self.reconnect_task.get_mut().take() {
            task.abort();
        }
        if let Some(connection) = self.current.get_mut().take() {
            connection.close();
        }
    }
}

//! Common test utilities for wsrooms integration tests
//!
//! - [`MockConnector`]: in-memory links driven from the test body
//! - [`MockWsServer`]: a real loopback WebSocket echo server

#![allow(dead_code)]

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::SinkExt;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::time::Instant;
use wsrooms::{Connector, Link, Result, WsMessage, WsRoomsError};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// Let spawned tasks run until everything is idle again
///
/// On a paused clock this advances time by one millisecond at most.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Server end of one in-memory link
#[derive(Clone)]
pub struct MockPeer {
    to_client: mpsc::UnboundedSender<Result<WsMessage>>,
    from_client: Arc<Mutex<mpsc::UnboundedReceiver<WsMessage>>>,
}

impl MockPeer {
    /// Deliver a text frame to the client
    pub fn push(&self, text: &str) {
        let _ = self
            .to_client
            .unbounded_send(Ok(WsMessage::Text(text.to_string())));
    }

    /// Fail the client's read side
    pub fn fail(&self, reason: &str) {
        let _ = self
            .to_client
            .unbounded_send(Err(WsRoomsError::WebSocket(reason.to_string())));
    }

    /// Drop the link from the server side
    pub fn disconnect(&self) {
        self.to_client.close_channel();
    }

    /// Frames the client has written so far
    pub fn received(&self) -> Vec<WsMessage> {
        let mut rx = self.from_client.lock();
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = rx.try_next() {
            frames.push(frame);
        }
        frames
    }
}

#[derive(Default)]
struct MockState {
    attempts: Vec<Instant>,
    peers: Vec<MockPeer>,
    refuse: bool,
    dial_delay: Option<Duration>,
}

/// In-memory [`Connector`] recording every dial
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dial fails immediately
    pub fn refusing() -> Self {
        let connector = Self::new();
        connector.set_refuse(true);
        connector
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Dials take `delay` before they resolve
    pub fn set_dial_delay(&self, delay: Duration) {
        self.state.lock().dial_delay = Some(delay);
    }

    /// Number of dials so far
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts.len()
    }

    /// When each dial started
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.state.lock().attempts.clone()
    }

    /// Server end of the `index`-th successful link
    pub fn peer(&self, index: usize) -> MockPeer {
        self.state.lock().peers[index].clone()
    }

    pub fn peer_count(&self) -> usize {
        self.state.lock().peers.len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link> {
        let (refuse, dial_delay) = {
            let mut state = self.state.lock();
            state.attempts.push(Instant::now());
            (state.refuse, state.dial_delay)
        };

        if let Some(delay) = dial_delay {
            tokio::time::sleep(delay).await;
        }

        if refuse {
            return Err(WsRoomsError::WebSocket(format!(
                "connection refused: {}",
                endpoint
            )));
        }

        let (link, peer) = mock_link();
        self.state.lock().peers.push(peer);
        Ok(link)
    }
}

/// An in-memory link and the peer controlling its far end
pub fn mock_link() -> (Link, MockPeer) {
    let (to_client, client_rx) = mpsc::unbounded();
    let (client_tx, from_client) = mpsc::unbounded();

    let peer = MockPeer {
        to_client,
        from_client: Arc::new(Mutex::new(from_client)),
    };

    let sink = client_tx.sink_map_err(|e| WsRoomsError::WebSocket(e.to_string()));
    (Link::new(Box::pin(sink), Box::pin(client_rx)), peer)
}

/// A simple WebSocket echo server for testing
pub struct MockWsServer {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
}

impl MockWsServer {
    /// Create and start a new echo server on an ephemeral port
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let shutdown = shutdown_clone.clone();
                                tokio::spawn(async move {
                                    Self::handle_connection(stream, shutdown).await;
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self { addr, shutdown }
    }

    async fn handle_connection(stream: tokio::net::TcpStream, shutdown: Arc<Notify>) {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::accept_async;

        let ws_stream = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };

        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(msg)) => {
                            if msg.is_text() || msg.is_binary() {
                                if write.send(msg).await.is_err() {
                                    break;
                                }
                            } else if msg.is_close() {
                                break;
                            }
                        }
                        Some(Err(_)) | None => break,
                    }
                }
                _ = shutdown.notified() => {
                    break;
                }
            }
        }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockWsServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

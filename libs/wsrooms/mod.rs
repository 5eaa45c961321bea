//! # wsrooms
//!
//! Resilient publish/subscribe messaging over WebSockets.
//!
//! ## Features
//!
//! - **Self-healing connections**: [`ConnectionManager`] replaces its physical
//!   link after every unexpected close, with a constant retry delay
//! - **Listener replay**: callbacks registered once keep firing across reconnects
//! - **Rooms**: [`RoomBroker`] groups connected clients under names and fans
//!   broadcasts out to every member
//! - **Pluggable transport**: anything implementing [`Connector`] can carry frames
//!
//! ## Example
//!
//! ```rust,ignore
//! use wsrooms::{ConnectionManager, EventKind, ManagerConfig, WsEvent};
//!
//! let manager = ConnectionManager::new("ws://127.0.0.1:9000/lobby", ManagerConfig::default())?;
//! manager.on(EventKind::Message, |event| {
//!     if let WsEvent::Message(message) = event {
//!         println!("{:?}", message);
//!     }
//! });
//! manager.connect();
//! ```

pub mod traits;
pub mod core;
pub mod manager;
pub mod rooms;

// Re-export all traits
pub use traits::*;

// Re-export core functionality
pub use self::core::{
    config, connection, connection_state, connector, receiver,
    config::{ConnectionOptions, ManagerConfig, DEFAULT_RETRY_DELAY},
    connection::{Connection, ConnectionHooks},
    connection_state::{ConnectionState, ManagerState},
    connector::{accept_link, link_from_stream, TungsteniteConnector},
    receiver::{EventGiver, EventReceiver},
};

pub use manager::{ConnectionManager, ManagerBuilder, ManagerMetrics};
pub use rooms::{Membership, RoomBroker};

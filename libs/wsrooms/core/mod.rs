//! # wsrooms core
//!
//! Physical connections and the pieces they are built from:
//!
//! - [`Connection`]: one link plus its listener registry, driven by a tokio task
//! - [`TungsteniteConnector`]: dials WebSocket endpoints; [`accept_link`] does the server side
//! - [`ManagerConfig`]: retry delay and verbosity
//! - [`EventReceiver`]: await "N events or timeout"

pub mod config;
pub mod connection;
pub mod connection_state;
pub mod connector;
pub mod receiver;

pub use config::{ConnectionOptions, ManagerConfig, DEFAULT_RETRY_DELAY};
pub use connection::{CloseHook, Connection, ConnectionHooks, OpenHook};
pub use connection_state::{
    AtomicConnectionState, AtomicManagerState, AtomicMetrics, ConnectionState, ManagerState,
};
pub use connector::{accept_link, link_from_stream, TungsteniteConnector};
pub use receiver::{EventGiver, EventReceiver};

pub use crate::traits::*;

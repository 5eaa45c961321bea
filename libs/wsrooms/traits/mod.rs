//! # wsrooms traits
//!
//! Shared vocabulary and seams used across the crate:
//!
//! - **WsMessage / Payload**: frames and the values that become frames
//! - **WsEvent / Listener**: events connections emit and their callbacks
//! - **ReconnectionStrategy**: how long to wait after an unexpected close
//! - **Connector**: how physical links are opened
//! - **RoomClient**: what the room broker needs from a member

pub mod client;
pub mod error;
pub mod event;
pub mod message;
pub mod reconnect;
pub mod transport;

pub use client::{CloseCallback, DetachCallback, RoomClient};
pub use error::{Result, WsRoomsError};
pub use event::{listener, CloseInfo, EventKind, Listener, ListenerRegistration, WsEvent};
pub use message::{Payload, WsMessage};
pub use reconnect::{FixedDelay, ReconnectionStrategy};
pub use transport::{Connector, Link, LinkSink, LinkStream};

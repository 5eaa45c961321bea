//! # wsrooms rooms
//!
//! Server-side room registry: join, leave (explicit or on close) and
//! broadcast to every member of a named group.

pub mod broker;

pub use broker::{Membership, RoomBroker};

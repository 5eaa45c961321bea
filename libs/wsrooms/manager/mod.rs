//! # wsrooms manager
//!
//! Supervision of a logical connection: reconnect after unexpected closes,
//! replay listeners onto every new physical link.

pub mod builder;
pub mod manager;

pub use builder::ManagerBuilder;
pub use manager::{ConnectionManager, ManagerMetrics};

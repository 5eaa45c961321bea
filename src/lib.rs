//! wsrooms application crate
//!
//! Hosts the `room_server` and `room_client` binaries on top of the
//! [`wsrooms`] library.
//!
//! ## Architecture
//!
//! - **bin_common**: shared binary plumbing (config, logging, shutdown)
//! - **wsrooms**: connections, manager and room broker (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```ignore
//! use wsrooms_app::bin_common::{load_config_from_env, AppConfig, ConfigType};
//! use wsrooms_app::wsrooms::ConnectionManager;
//! ```

// Re-export workspace libraries for convenience
pub use wsrooms;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod config;
    pub mod logging;
    pub mod shutdown;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use config::{AppConfig, ConfigError, ENDPOINT_ENV, BIND_ADDR_ENV};
    pub use logging::init_tracing_with_level;
    pub use shutdown::ShutdownManager;
}

use crate::traits::{Result, WsRoomsError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default delay between reconnection attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(2000);

/// Options for a single physical connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Log open/close/error transitions at info level
    pub verbose: bool,
}

/// Configuration for a [`ConnectionManager`](crate::manager::ConnectionManager)
///
/// Only two tunables exist: the constant retry delay and verbose logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Delay applied after every unexpected close
    #[serde(rename = "retry_delay_ms", with = "duration_ms", default = "default_retry_delay")]
    pub retry_delay: Duration,

    /// Log transitions for operators
    #[serde(default)]
    pub verbose: bool,
}

fn default_retry_delay() -> Duration {
    DEFAULT_RETRY_DELAY
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            verbose: false,
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Options handed to each physical connection
    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            verbose: self.verbose,
        }
    }

    /// Reject a zero retry delay (it would spin on a dead endpoint)
    pub fn validate(&self) -> Result<()> {
        if self.retry_delay.is_zero() {
            return Err(WsRoomsError::Configuration(
                "retry_delay must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

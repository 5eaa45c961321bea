use crate::core::{ManagerConfig, TungsteniteConnector};
use crate::manager::ConnectionManager;
use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// Builder for [`ConnectionManager`]
///
/// ```ignore
/// let manager = ConnectionManager::builder("ws://127.0.0.1:9000/lobby")
///     .retry_delay(Duration::from_millis(500))
///     .verbose(true)
///     .build()?;
/// manager.on(EventKind::Message, |event| println!("{:?}", event));
/// manager.connect();
/// ```
pub struct ManagerBuilder {
    endpoint: String,
    config: ManagerConfig,
    connector: Option<Arc<dyn Connector>>,
    strategy: Option<Box<dyn ReconnectionStrategy>>,
}

impl ManagerBuilder {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            config: ManagerConfig::default(),
            connector: None,
            strategy: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        self
    }

    /// Use a custom transport instead of tungstenite
    pub fn connector<C: Connector>(mut self, connector: C) -> Self {
        self.connector = Some(Arc::new(connector));
        self
    }

    pub fn shared_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Override the retry policy
    ///
    /// Defaults to [`FixedDelay`] with the configured `retry_delay` and no
    /// attempt limit.
    pub fn reconnect_strategy<S: ReconnectionStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    pub fn build(self) -> Result<ConnectionManager> {
        if self.endpoint.trim().is_empty() {
            return Err(WsRoomsError::Configuration(
                "endpoint cannot be empty".to_string(),
            ));
        }
        self.config.validate()?;

        let connector = self
            .connector
            .unwrap_or_else(|| Arc::new(TungsteniteConnector));
        let strategy = self
            .strategy
            .unwrap_or_else(|| Box::new(FixedDelay::unbounded(self.config.retry_delay)));

        Ok(ConnectionManager::from_parts(
            self.endpoint,
            self.config,
            connector,
            strategy,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ManagerState;

    #[test]
    fn test_empty_endpoint_rejected() {
        let result = ManagerBuilder::new("  ").build();
        assert!(matches!(result, Err(WsRoomsError::Configuration(_))));
    }

    #[test]
    fn test_zero_retry_delay_rejected() {
        let result = ManagerBuilder::new("ws://localhost:1")
            .retry_delay(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(WsRoomsError::Configuration(_))));
    }

    #[test]
    fn test_builds_disconnected() {
        let manager = ManagerBuilder::new("ws://localhost:1")
            .retry_delay(Duration::from_millis(100))
            .verbose(true)
            .build()
            .unwrap();
        assert_eq!(manager.state(), ManagerState::Disconnected);
        assert!(!manager.is_connected());
        assert_eq!(manager.config().retry_delay, Duration::from_millis(100));
        assert!(manager.config().verbose);
    }

    #[test]
    fn test_send_while_disconnected_fails() {
        let manager = ManagerBuilder::new("ws://localhost:1").build().unwrap();
        assert!(matches!(manager.send("hi"), Err(WsRoomsError::NotConnected)));
    }
}

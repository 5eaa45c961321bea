use crate::error::Result;
use crate::message::WsMessage;
use async_trait::async_trait;
use futures::{Sink, Stream};
use std::pin::Pin;

use crate::error::WsRoomsError;

/// Outbound half of a physical link
pub type LinkSink = Pin<Box<dyn Sink<WsMessage, Error = WsRoomsError> + Send>>;

/// Inbound half of a physical link
///
/// The stream ending means the peer closed the link.
pub type LinkStream = Pin<Box<dyn Stream<Item = Result<WsMessage>> + Send>>;

/// An established bidirectional link, already split into halves
pub struct Link {
    pub sink: LinkSink,
    pub stream: LinkStream,
}

impl Link {
    pub fn new(sink: LinkSink, stream: LinkStream) -> Self {
        Self { sink, stream }
    }
}

/// Trait for establishing physical links
///
/// The default implementation dials WebSocket endpoints with tungstenite.
/// Swap it out to run connections over any other transport.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new link to `endpoint`
    async fn connect(&self, endpoint: &str) -> Result<Link>;
}

//! tungstenite-backed links
//!
//! Both the client dialer and the server accept path end up as a [`Link`],
//! so the same [`Connection`](crate::core::Connection) type drives either side.

use crate::traits::{Connector, Link, Result, WsMessage, WsRoomsError};
use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};
use tracing::debug;

/// Dials `ws://` / `wss://` endpoints
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, endpoint: &str) -> Result<Link> {
        let (ws_stream, response) = connect_async(endpoint)
            .await
            .map_err(|e| WsRoomsError::WebSocket(e.to_string()))?;
        debug!("Handshake with {} completed ({})", endpoint, response.status());
        Ok(link_from_stream(ws_stream))
    }
}

/// Complete the server side handshake on an accepted TCP stream
pub async fn accept_link(stream: TcpStream) -> Result<Link> {
    let ws_stream = accept_async(stream)
        .await
        .map_err(|e| WsRoomsError::WebSocket(e.to_string()))?;
    Ok(link_from_stream(ws_stream))
}

/// Split a tungstenite stream into a [`Link`]
///
/// Control frames are consumed here; only text and binary frames reach the link.
pub fn link_from_stream<S>(ws_stream: WebSocketStream<S>) -> Link
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (write, read) = ws_stream.split();

    let sink = write
        .sink_map_err(|e| WsRoomsError::WebSocket(e.to_string()))
        .with(|message: WsMessage| {
            future::ready(Ok::<_, WsRoomsError>(ws_message_to_tungstenite(message)))
        });

    let stream = read.filter_map(|frame| {
        future::ready(match frame {
            Ok(message) => tungstenite_to_ws_message(message).map(Ok),
            Err(e) => Some(Err(WsRoomsError::WebSocket(e.to_string()))),
        })
    });

    Link::new(Box::pin(sink), Box::pin(stream))
}

/// Convert WsMessage to tungstenite Message
pub(crate) fn ws_message_to_tungstenite(message: WsMessage) -> Message {
    match message {
        WsMessage::Text(text) => Message::Text(text),
        WsMessage::Binary(data) => Message::Binary(data),
    }
}

/// Convert tungstenite Message to WsMessage
pub(crate) fn tungstenite_to_ws_message(message: Message) -> Option<WsMessage> {
    match message {
        Message::Text(text) => Some(WsMessage::Text(text)),
        Message::Binary(data) => Some(WsMessage::Binary(data)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}

use crate::error::Result;
use serde::Serialize;
use serde_json::Value;

/// A single WebSocket data frame
/// Can be Text or Binary data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    /// Get the message as text, if it is text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(s) => Some(s),
            WsMessage::Binary(_) => None,
        }
    }

    /// Get the message as binary, if it is binary
    pub fn as_binary(&self) -> Option<&[u8]> {
        match self {
            WsMessage::Text(_) => None,
            WsMessage::Binary(b) => Some(b),
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, WsMessage::Text(_))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, WsMessage::Binary(_))
    }
}

/// Anything that can be handed to `send` or a room broadcast
///
/// Raw frames pass through untouched. Structured values are rendered to
/// JSON text on the way out, except bare strings which are sent as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Raw transport frame
    Message(WsMessage),
    /// Structured value, serialized before transmission
    Json(Value),
}

impl Payload {
    /// Build a structured payload from any `Serialize` value
    ///
    /// Fails synchronously if the value cannot be represented as JSON
    /// (for example a map with non-string keys).
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Payload::Json(serde_json::to_value(value)?))
    }

    /// Convert into the frame that goes on the wire
    pub fn into_message(self) -> WsMessage {
        match self {
            Payload::Message(message) => message,
            Payload::Json(Value::String(text)) => WsMessage::Text(text),
            Payload::Json(value) => WsMessage::Text(value.to_string()),
        }
    }
}

impl From<WsMessage> for Payload {
    fn from(message: WsMessage) -> Self {
        Payload::Message(message)
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Message(WsMessage::Text(text))
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Message(WsMessage::Text(text.to_string()))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(data: Vec<u8>) -> Self {
        Payload::Message(WsMessage::Binary(data))
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Json(value)
    }
}

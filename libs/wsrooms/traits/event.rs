use crate::message::WsMessage;
use std::fmt;
use std::sync::Arc;

/// Kinds of events a connection emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Error,
    Message,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Open => "open",
            EventKind::Close => "close",
            EventKind::Error => "error",
            EventKind::Message => "message",
        };
        f.write_str(name)
    }
}

/// Details attached to a close event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseInfo {
    /// True when the close was requested through `close()`
    pub manual: bool,
    /// True when the link reached OPEN before closing
    pub was_open: bool,
}

/// Event delivered to listeners
#[derive(Debug, Clone, PartialEq)]
pub enum WsEvent {
    Open,
    Close(CloseInfo),
    Error(String),
    Message(WsMessage),
}

impl WsEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            WsEvent::Open => EventKind::Open,
            WsEvent::Close(_) => EventKind::Close,
            WsEvent::Error(_) => EventKind::Error,
            WsEvent::Message(_) => EventKind::Message,
        }
    }
}

/// Event callback
///
/// Listeners are shared so the same registration can be attached to every
/// physical connection a manager creates.
pub type Listener = Arc<dyn Fn(&WsEvent) + Send + Sync>;

/// Wrap a closure into a [`Listener`]
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&WsEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// An `(event kind, callback)` pair
#[derive(Clone)]
pub struct ListenerRegistration {
    pub kind: EventKind,
    pub listener: Listener,
}

impl fmt::Debug for ListenerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistration")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

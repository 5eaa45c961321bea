use crate::error::Result;
use crate::message::WsMessage;

/// Callback run once when a client's link closes
pub type CloseCallback = Box<dyn Fn() + Send + Sync>;

/// Unregisters a close callback; a no-op once the link is gone
pub type DetachCallback = Box<dyn FnOnce() + Send + Sync>;

/// What the room broker needs from a member
pub trait RoomClient: Send + Sync + 'static {
    fn send(&self, message: WsMessage) -> Result<()>;

    /// Run `callback` once when the link closes
    ///
    /// Calling the returned detach removes the registration.
    fn on_close(&self, callback: CloseCallback) -> DetachCallback;
}

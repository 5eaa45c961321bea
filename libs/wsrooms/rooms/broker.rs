use crate::core::Connection;
use crate::traits::*;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// In-process registry of named broadcast groups
///
/// Rooms are created on first join and deleted as soon as their last member
/// leaves. Every operation is total: missing rooms or members degrade to
/// no-ops instead of errors.
///
/// Joining the same client twice adds two entries, and each entry has to be
/// removed on its own (by `leave` or by the client's close event). This is
/// kept as-is rather than deduplicated.
///
/// # Type Parameters
/// - `C`: member type, anything implementing [`RoomClient`]
pub struct RoomBroker<C: RoomClient + ?Sized = Connection> {
    inner: Arc<BrokerInner<C>>,
}

struct BrokerInner<C: ?Sized> {
    rooms: Mutex<HashMap<String, Vec<Member<C>>>>,
}

/// One room entry and the handle that unregisters its close callback
struct Member<C: ?Sized> {
    client: Arc<C>,
    detach: Option<DetachCallback>,
}

impl<C: ?Sized> Member<C> {
    fn detach(self) {
        if let Some(detach) = self.detach {
            detach();
        }
    }
}

/// Handle scoped to one `join_room` call
pub struct Membership<C: RoomClient + ?Sized = Connection> {
    broker: RoomBroker<C>,
    room: String,
    client: Arc<C>,
}

/// Compare members by identity, ignoring vtable metadata
fn same_client<C: ?Sized>(a: &Arc<C>, b: &Arc<C>) -> bool {
    Arc::as_ptr(a).cast::<()>() == Arc::as_ptr(b).cast::<()>()
}

impl<C: RoomClient + ?Sized> RoomBroker<C> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                rooms: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Add `client` to `room`, creating the room if needed
    ///
    /// The membership is dropped automatically when the client closes.
    pub fn join_room(&self, room: impl Into<String>, client: Arc<C>) -> Membership<C> {
        let room = room.into();

        {
            let mut rooms = self.inner.rooms.lock();
            let members = rooms.entry(room.clone()).or_insert_with(|| {
                debug!("Creating room '{}'", room);
                Vec::new()
            });
            members.push(Member {
                client: Arc::clone(&client),
                detach: None,
            });
            debug!("Client joined room '{}' ({} members)", room, members.len());
        }

        // Registered outside the lock: the callback may run right away
        let weak_broker = Arc::downgrade(&self.inner);
        let weak_client = Arc::downgrade(&client);
        let closed_room = room.clone();
        let detach = client.on_close(Box::new(move || {
            if let (Some(inner), Some(client)) = (weak_broker.upgrade(), weak_client.upgrade()) {
                if let Some(member) = inner.take_member(&closed_room, &client) {
                    debug!("Client left room '{}' on close", closed_room);
                    member.detach();
                }
            }
        }));
        self.inner.attach_detach(&room, &client, detach);

        Membership {
            broker: self.clone(),
            room,
            client,
        }
    }

    /// Send `payload` to every member of `room`, in membership order
    ///
    /// Structured payloads are serialized once. Returns how many sends were
    /// accepted; failures are logged and skipped. A missing room yields 0.
    pub fn emit_on_room(&self, room: &str, payload: impl Into<Payload>) -> usize {
        let members = match self.inner.rooms.lock().get(room) {
            Some(members) => members
                .iter()
                .map(|member| Arc::clone(&member.client))
                .collect::<Vec<_>>(),
            None => {
                debug!("Emit on missing room '{}' ignored", room);
                return 0;
            }
        };

        let message = payload.into().into_message();
        let mut delivered = 0;

        for member in members {
            match member.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => warn!("Failed to deliver to a member of room '{}': {}", room, e),
            }
        }

        delivered
    }

    /// Serialize `value` to JSON and broadcast it
    ///
    /// Serialization faults are returned to the caller.
    pub fn emit_json<T: Serialize + ?Sized>(&self, room: &str, value: &T) -> Result<usize> {
        let payload = Payload::json(value)?;
        Ok(self.emit_on_room(room, payload))
    }

    /// Remove the first entry for `client` from `room`
    ///
    /// Deletes the room once empty and unregisters the entry's close
    /// callback. Returns false if nothing was removed.
    pub fn leave_room(&self, room: &str, client: &Arc<C>) -> bool {
        match self.inner.take_member(room, client) {
            Some(member) => {
                member.detach();
                true
            }
            None => false,
        }
    }

    pub fn has_room(&self, room: &str) -> bool {
        self.inner.rooms.lock().contains_key(room)
    }

    /// Names of all non-empty rooms, sorted
    pub fn room_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.rooms.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn room_count(&self) -> usize {
        self.inner.rooms.lock().len()
    }

    /// Number of entries in `room` (duplicate joins count twice)
    pub fn member_count(&self, room: &str) -> usize {
        self.inner
            .rooms
            .lock()
            .get(room)
            .map_or(0, |members| members.len())
    }
}

impl<C: ?Sized> BrokerInner<C> {
    /// Unlink the first entry for `client`; the caller detaches it unlocked
    fn take_member(&self, room: &str, client: &Arc<C>) -> Option<Member<C>> {
        let mut rooms = self.rooms.lock();

        let members = rooms.get_mut(room)?;
        let index = members
            .iter()
            .position(|member| same_client(&member.client, client))?;

        let member = members.remove(index);
        if members.is_empty() {
            rooms.remove(room);
            debug!("Room '{}' is empty, deleted", room);
        }
        Some(member)
    }

    /// Hand `detach` to an entry of `client` that has none yet
    ///
    /// If the entry is already gone (the client closed during the join) the
    /// registration is removed on the spot.
    fn attach_detach(&self, room: &str, client: &Arc<C>, detach: DetachCallback) {
        let orphan = {
            let mut rooms = self.rooms.lock();
            let slot = rooms.get_mut(room).and_then(|members| {
                members
                    .iter_mut()
                    .find(|member| member.detach.is_none() && same_client(&member.client, client))
            });
            match slot {
                Some(member) => {
                    member.detach = Some(detach);
                    None
                }
                None => Some(detach),
            }
        };

        if let Some(detach) = orphan {
            detach();
        }
    }
}

impl<C: RoomClient + ?Sized> Clone for RoomBroker<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: RoomClient + ?Sized> Default for RoomBroker<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: RoomClient + ?Sized> fmt::Debug for RoomBroker<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomBroker")
            .field("rooms", &self.room_names())
            .finish()
    }
}

impl<C: RoomClient + ?Sized> Membership<C> {
    /// Leave the room this membership was created for
    pub fn leave(&self) -> bool {
        self.broker.leave_room(&self.room, &self.client)
    }

    /// Broadcast to the room this membership was created for
    pub fn emit(&self, payload: impl Into<Payload>) -> usize {
        self.broker.emit_on_room(&self.room, payload)
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }
}

impl<C: RoomClient + ?Sized> fmt::Debug for Membership<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Membership").field("room", &self.room).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    type Callbacks = Arc<Mutex<Vec<(u64, CloseCallback)>>>;

    #[derive(Default)]
    struct MockClient {
        sent: Mutex<Vec<WsMessage>>,
        close_callbacks: Callbacks,
        next_callback: std::sync::atomic::AtomicU64,
        failing: bool,
    }

    impl MockClient {
        fn failing() -> Self {
            Self {
                failing: true,
                ..Self::default()
            }
        }

        fn sent(&self) -> Vec<WsMessage> {
            self.sent.lock().clone()
        }

        fn fire_close(&self) {
            let callbacks = std::mem::take(&mut *self.close_callbacks.lock());
            for (_, callback) in callbacks {
                callback();
            }
        }

        fn close_callback_count(&self) -> usize {
            self.close_callbacks.lock().len()
        }
    }

    impl RoomClient for MockClient {
        fn send(&self, message: WsMessage) -> Result<()> {
            if self.failing {
                return Err(WsRoomsError::NotConnected);
            }
            self.sent.lock().push(message);
            Ok(())
        }

        fn on_close(&self, callback: CloseCallback) -> DetachCallback {
            let id = self
                .next_callback
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            self.close_callbacks.lock().push((id, callback));

            let callbacks = Arc::downgrade(&self.close_callbacks);
            Box::new(move || {
                if let Some(callbacks) = callbacks.upgrade() {
                    callbacks.lock().retain(|(registered, _)| *registered != id);
                }
            })
        }
    }

    #[test]
    fn test_fan_out_serializes_once_per_member() {
        let broker = RoomBroker::new();
        let clients: Vec<Arc<MockClient>> = (0..3).map(|_| Arc::new(MockClient::default())).collect();
        for client in &clients {
            broker.join_room("r", Arc::clone(client));
        }

        let delivered = broker.emit_on_room("r", json!({"x": 1}));
        assert_eq!(delivered, 3);

        for client in &clients {
            assert_eq!(client.sent(), vec![WsMessage::Text(r#"{"x":1}"#.to_string())]);
        }
    }

    #[test]
    fn test_leave_deletes_empty_room() {
        let broker = RoomBroker::new();
        let a = Arc::new(MockClient::default());

        broker.join_room("r", Arc::clone(&a));
        assert!(broker.has_room("r"));

        assert!(broker.leave_room("r", &a));
        assert!(!broker.has_room("r"));
        assert_eq!(broker.emit_on_room("r", "hello"), 0);
        assert!(a.sent().is_empty());
    }

    #[test]
    fn test_leave_is_idempotent() {
        let broker = RoomBroker::new();
        let a = Arc::new(MockClient::default());
        let b = Arc::new(MockClient::default());
        broker.join_room("r", Arc::clone(&a));
        broker.join_room("r", Arc::clone(&b));

        assert!(broker.leave_room("r", &a));
        assert!(!broker.leave_room("r", &a));
        assert_eq!(broker.member_count("r"), 1);

        assert!(!broker.leave_room("missing", &a));
        assert_eq!(broker.room_names(), vec!["r".to_string()]);
    }

    #[test]
    fn test_close_leaves_every_room() {
        let broker = RoomBroker::new();
        let a = Arc::new(MockClient::default());
        let b = Arc::new(MockClient::default());
        broker.join_room("one", Arc::clone(&a));
        broker.join_room("two", Arc::clone(&a));
        broker.join_room("two", Arc::clone(&b));

        a.fire_close();

        assert!(!broker.has_room("one"));
        assert_eq!(broker.member_count("two"), 1);
        assert_eq!(broker.emit_on_room("two", "still here"), 1);
        assert!(a.sent().is_empty());
    }

    #[test]
    fn test_explicit_leave_then_close_does_not_remove_others() {
        let broker = RoomBroker::new();
        let a = Arc::new(MockClient::default());
        let b = Arc::new(MockClient::default());
        let membership = broker.join_room("r", Arc::clone(&a));
        broker.join_room("r", Arc::clone(&b));

        assert!(membership.leave());
        a.fire_close();

        assert_eq!(broker.member_count("r"), 1);
    }

    #[test]
    fn test_duplicate_joins_create_duplicate_entries() {
        let broker = RoomBroker::new();
        let a = Arc::new(MockClient::default());
        broker.join_room("r", Arc::clone(&a));
        broker.join_room("r", Arc::clone(&a));

        assert_eq!(broker.member_count("r"), 2);
        assert_eq!(broker.emit_on_room("r", "twice"), 2);
        assert_eq!(a.sent().len(), 2);

        // One leave removes one entry
        broker.leave_room("r", &a);
        assert_eq!(broker.member_count("r"), 1);

        // The remaining entry goes with the close
        a.fire_close();
        assert!(!broker.has_room("r"));
    }

    #[test]
    fn test_leave_unregisters_close_callback() {
        let broker = RoomBroker::new();
        let a = Arc::new(MockClient::default());

        for _ in 0..100 {
            let membership = broker.join_room("r", Arc::clone(&a));
            assert_eq!(a.close_callback_count(), 1);
            assert!(membership.leave());
        }
        assert_eq!(a.close_callback_count(), 0);

        broker.join_room("one", Arc::clone(&a));
        broker.join_room("two", Arc::clone(&a));
        broker.join_room("two", Arc::clone(&a));
        assert_eq!(a.close_callback_count(), 3);

        broker.leave_room("two", &a);
        assert_eq!(a.close_callback_count(), 2);
        broker.leave_room("two", &a);
        broker.leave_room("one", &a);
        assert_eq!(a.close_callback_count(), 0);
        assert_eq!(broker.room_count(), 0);
    }

    #[test]
    fn test_membership_emit_targets_its_room() {
        let broker = RoomBroker::new();
        let a = Arc::new(MockClient::default());
        let b = Arc::new(MockClient::default());
        let membership = broker.join_room("lobby", Arc::clone(&a));
        broker.join_room("other", Arc::clone(&b));

        assert_eq!(membership.room(), "lobby");
        assert_eq!(membership.emit("hi"), 1);
        assert_eq!(a.sent(), vec![WsMessage::Text("hi".to_string())]);
        assert!(b.sent().is_empty());
    }

    #[test]
    fn test_failed_member_send_is_skipped() {
        let broker = RoomBroker::new();
        let ok = Arc::new(MockClient::default());
        broker.join_room("r", Arc::new(MockClient::failing()));
        broker.join_room("r", Arc::clone(&ok));

        assert_eq!(broker.emit_on_room("r", "x"), 1);
        assert_eq!(ok.sent().len(), 1);
    }

    #[test]
    fn test_emit_json_reports_serialization_fault() {
        let broker: RoomBroker<MockClient> = RoomBroker::new();
        let mut bad = HashMap::new();
        bad.insert((1, 2), 3);

        assert!(matches!(
            broker.emit_json("r", &bad),
            Err(WsRoomsError::Serialization(_))
        ));
        assert_eq!(broker.emit_json("missing", &json!({"ok": true})).unwrap(), 0);
    }

    #[test]
    fn test_trait_object_members() {
        let broker: RoomBroker<dyn RoomClient> = RoomBroker::new();
        let a: Arc<dyn RoomClient> = Arc::new(MockClient::default());
        broker.join_room("r", Arc::clone(&a));

        assert_eq!(broker.emit_on_room("r", "dyn"), 1);
        assert!(broker.leave_room("r", &a));
        assert_eq!(broker.room_count(), 0);
    }
}

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use uuid::Uuid;

use crate::event::ChatEvent;

/// Outbound queue depth per session. A client that falls this far behind is
/// pruned rather than allowed to stall the room.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Result of offering an event to a session's outbound queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Enqueue {
    Delivered,
    /// Queue full or session already dead; the caller should drop the session.
    Dropped,
}

/// The shareable half of a connection session: identity plus the sending end
/// of its bounded outbound queue. The receiving end stays with the session's
/// writer loop, so the wire framing has a single writer.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    nickname: String,
    outbound: mpsc::Sender<ChatEvent>,
    shutdown: watch::Sender<bool>,
}

impl SessionHandle {
    pub fn new(nickname: impl Into<String>) -> (Self, mpsc::Receiver<ChatEvent>) {
        Self::with_capacity(nickname, OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(
        nickname: impl Into<String>,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<ChatEvent>) {
        let (outbound, rx) = mpsc::channel(capacity);
        let (shutdown, _) = watch::channel(false);
        (
            Self {
                id: Uuid::now_v7(),
                nickname: nickname.into(),
                outbound,
                shutdown,
            },
            rx,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Marks the session dead and wakes anything waiting on [`closed`].
    /// Queue saturation is terminal for the whole connection, not just the
    /// registry entry, so the session's loops watch for this.
    ///
    /// [`closed`]: SessionHandle::closed
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Teardown signal for the session's own loops. Subscribe before the
    /// handle is shared, or a close racing the subscription can be missed.
    pub fn closed(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Non-blocking offer. A dead session counts as `Dropped` too: once the
    /// session is marked dead its queue never accepts another write.
    pub fn enqueue(&self, event: ChatEvent) -> Enqueue {
        if self.is_closed() {
            return Enqueue::Dropped;
        }
        match self.outbound.try_send(event) {
            Ok(()) => Enqueue::Delivered,
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => Enqueue::Dropped,
        }
    }
}

/// Which sessions are currently in which room. The only broadly shared
/// mutable structure in the core; guarded by a single lock that is never
/// held across an await.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, HashMap<Uuid, SessionHandle>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a session to a room, creating the membership set on first use.
    pub fn join(&self, room: &str, session: SessionHandle) {
        self.rooms
            .lock()
            .entry(room.to_owned())
            .or_default()
            .insert(session.id(), session);
    }

    /// Removes a session from a room. Returns false if it was already gone,
    /// which makes late removals after a drop harmless no-ops.
    pub fn leave(&self, room: &str, session_id: Uuid) -> bool {
        let mut rooms = self.rooms.lock();
        rooms
            .get_mut(room)
            .is_some_and(|members| members.remove(&session_id).is_some())
    }

    /// Point-in-time snapshot of a room's membership. Fan-out iterates the
    /// copy, never the live map.
    pub fn members_of(&self, room: &str) -> Vec<SessionHandle> {
        self.rooms
            .lock()
            .get(room)
            .map(|members| members.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

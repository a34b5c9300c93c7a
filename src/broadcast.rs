use std::sync::Arc;

use tokio::sync::mpsc;

use crate::event::ChatEvent;
use crate::history::HistoryStore;
use crate::registry::{Enqueue, RoomRegistry};

struct Submission {
    room: String,
    event: ChatEvent,
}

/// Single intake point for chat events. Exactly one consumer task drains the
/// intake queue, so persist-then-fanout runs whole per event and submissions
/// keep their order relative to each other.
#[derive(Clone)]
pub struct BroadcastRouter {
    intake: mpsc::UnboundedSender<Submission>,
}

impl BroadcastRouter {
    /// Spawns the consumer task and returns the intake handle.
    pub fn spawn(history: HistoryStore, registry: Arc<RoomRegistry>) -> Self {
        let (intake, mut rx) = mpsc::unbounded_channel::<Submission>();

        tokio::spawn(async move {
            while let Some(Submission { room, event }) = rx.recv().await {
                // Best-effort durability: a failed append must not cost the
                // room its live delivery.
                if let Err(err) = history.append(&room, &event).await {
                    tracing::warn!(%room, %err, "failed to persist message; delivering anyway");
                }

                for member in registry.members_of(&room) {
                    if let Enqueue::Dropped = member.enqueue(event.clone()) {
                        // Terminal for the whole session: mark it dead so its
                        // loops shut down and its connection is released, then
                        // forget it.
                        member.close();
                        registry.leave(&room, member.id());
                        tracing::warn!(
                            %room,
                            nickname = member.nickname(),
                            "outbound queue saturated; pruning session"
                        );
                    }
                }
            }
        });

        Self { intake }
    }

    /// Hands an event to the consumer. Never blocks; a send after shutdown
    /// is silently discarded.
    pub fn submit(&self, room: impl Into<String>, event: ChatEvent) {
        let _ = self.intake.send(Submission {
            room: room.into(),
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;
    use crate::registry::SessionHandle;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::time::Duration;
    use tokio::time::timeout;

    async fn test_core() -> (BroadcastRouter, Arc<RoomRegistry>, HistoryStore) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_schema(&pool).await.unwrap();
        let history = HistoryStore::new(pool);
        let registry = Arc::new(RoomRegistry::new());
        let router = BroadcastRouter::spawn(history.clone(), registry.clone());
        (router, registry, history)
    }

    fn event(content: &str) -> ChatEvent {
        ChatEvent::new("Bob", EventKind::Text, content, "")
    }

    async fn recv(rx: &mut tokio::sync::mpsc::Receiver<ChatEvent>) -> ChatEvent {
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for fan-out")
            .expect("queue closed")
    }

    #[tokio::test]
    async fn fans_out_to_room_members_only() {
        let (router, registry, _history) = test_core().await;

        let (alice, mut alice_rx) = SessionHandle::new("Alice");
        let (bob, mut bob_rx) = SessionHandle::new("Bob");
        let (carol, mut carol_rx) = SessionHandle::new("Carol");
        registry.join("general", alice);
        registry.join("general", bob);
        registry.join("random", carol);

        router.submit("general", event("hi"));

        assert_eq!(recv(&mut alice_rx).await.content, "hi");
        assert_eq!(recv(&mut bob_rx).await.content, "hi");
        // Fan-out for "general" is done by now (both members saw it), and
        // the single consumer processes events sequentially.
        assert!(carol_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn preserves_submission_order_per_session() {
        let (router, registry, _history) = test_core().await;

        let (alice, mut alice_rx) = SessionHandle::new("Alice");
        registry.join("general", alice);

        for i in 0..10 {
            router.submit("general", event(&format!("msg-{i}")));
        }
        for i in 0..10 {
            assert_eq!(recv(&mut alice_rx).await.content, format!("msg-{i}"));
        }
    }

    #[tokio::test]
    async fn persists_before_fanning_out() {
        let (router, registry, history) = test_core().await;

        let (alice, mut alice_rx) = SessionHandle::new("Alice");
        registry.join("general", alice);

        router.submit("general", event("durable"));
        let _ = recv(&mut alice_rx).await;

        // Fan-out happens after append, so the message is visible by now.
        let backlog = history.fetch_history("general").await.unwrap();
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].content, "durable");
    }

    #[tokio::test]
    async fn saturated_consumer_is_pruned_without_blocking_others() {
        let (router, registry, _history) = test_core().await;

        let (fast, mut fast_rx) = SessionHandle::new("fast");
        let (slow, _slow_rx) = SessionHandle::with_capacity("slow", 1);
        let slow_id = slow.id();
        registry.join("general", fast);
        registry.join("general", slow.clone());

        // First event fills the slow queue; the second saturates it.
        router.submit("general", event("one"));
        router.submit("general", event("two"));
        router.submit("general", event("three"));

        assert_eq!(recv(&mut fast_rx).await.content, "one");
        assert_eq!(recv(&mut fast_rx).await.content, "two");
        assert_eq!(recv(&mut fast_rx).await.content, "three");

        let members = registry.members_of("general");
        assert_eq!(members.len(), 1);
        assert_ne!(members[0].id(), slow_id);

        // Pruning is terminal: the session is marked dead so its loops tear
        // the connection down, not just evicted from the registry.
        assert!(slow.is_closed());
    }

    #[tokio::test]
    async fn persistence_failure_does_not_stop_delivery() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_schema(&pool).await.unwrap();
        let history = HistoryStore::new(pool.clone());
        let registry = Arc::new(RoomRegistry::new());
        let router = BroadcastRouter::spawn(history, registry.clone());

        // Kill the store out from under the router.
        pool.close().await;

        let (alice, mut alice_rx) = SessionHandle::new("Alice");
        registry.join("general", alice);

        router.submit("general", event("still delivered"));
        assert_eq!(recv(&mut alice_rx).await.content, "still delivered");
    }
}

use sqlx::SqlitePool;

use crate::event::{ChatEvent, EventKind};

/// Narrow persistence boundary over the relational store: append one message,
/// fetch a room's ordered backlog, resolve room names to ids.
#[derive(Clone)]
pub struct HistoryStore {
    pool: SqlitePool,
}

impl HistoryStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates the room row if absent and returns its id. Concurrent callers
    /// racing on the same name converge on a single row: the insert tolerates
    /// the unique-name conflict and the lookup reads whichever won.
    pub async fn ensure_room(&self, name: &str) -> sqlx::Result<i64> {
        sqlx::query("INSERT INTO rooms (name) VALUES (?) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&self.pool)
            .await?;
        let (id,): (i64,) = sqlx::query_as("SELECT id FROM rooms WHERE name=?")
            .bind(name)
            .fetch_one(&self.pool)
            .await?;
        Ok(id)
    }

    pub async fn append(&self, room: &str, event: &ChatEvent) -> sqlx::Result<()> {
        let room_id = self.ensure_room(room).await?;
        sqlx::query(
            "INSERT INTO messages (room_id, nickname, type, content, media_url, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(room_id)
        .bind(&event.nickname)
        .bind(event.kind.as_str())
        .bind(&event.content)
        .bind(&event.media_url)
        .bind(&event.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Full backlog for a room, oldest first. The rowid tiebreak keeps
    /// messages appended within the same second in append order.
    pub async fn fetch_history(&self, room: &str) -> sqlx::Result<Vec<ChatEvent>> {
        let rows: Vec<(String, String, String, String, String)> = sqlx::query_as(
            "SELECT m.nickname, m.type, m.content, m.media_url, m.created_at
             FROM messages m
             JOIN rooms r ON m.room_id = r.id
             WHERE r.name = ?
             ORDER BY m.created_at ASC, m.id ASC",
        )
        .bind(room)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(nickname, kind, content, media_url, created_at)| ChatEvent {
                nickname,
                kind: EventKind::parse(&kind),
                content,
                media_url,
                created_at,
            })
            .collect())
    }

    pub async fn room_names(&self) -> sqlx::Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM rooms ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_store() -> HistoryStore {
        // One connection so every pooled handle sees the same in-memory db.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::init_schema(&pool).await.unwrap();
        HistoryStore::new(pool)
    }

    #[tokio::test]
    async fn append_then_fetch_preserves_order() {
        let store = memory_store().await;
        for i in 0..5 {
            let event = ChatEvent::new("Bob", EventKind::Text, format!("msg-{i}"), "");
            store.append("general", &event).await.unwrap();
        }

        let history = store.fetch_history("general").await.unwrap();
        assert_eq!(history.len(), 5);
        for (i, event) in history.iter().enumerate() {
            assert_eq!(event.content, format!("msg-{i}"));
            assert_eq!(event.nickname, "Bob");
            assert_eq!(event.kind, EventKind::Text);
            assert!(!event.created_at.is_empty());
        }
    }

    #[tokio::test]
    async fn history_is_scoped_per_room() {
        let store = memory_store().await;
        store
            .append("general", &ChatEvent::new("Bob", EventKind::Text, "hi", ""))
            .await
            .unwrap();

        assert_eq!(store.fetch_history("general").await.unwrap().len(), 1);
        assert!(store.fetch_history("random").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ensure_room_is_idempotent() {
        let store = memory_store().await;
        let first = store.ensure_room("general").await.unwrap();
        let second = store.ensure_room("general").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.room_names().await.unwrap(), vec!["general"]);
    }

    #[tokio::test]
    async fn concurrent_ensure_room_yields_single_row() {
        let store = memory_store().await;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.ensure_room("x").await.unwrap()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.room_names().await.unwrap(), vec!["x"]);
    }

    #[tokio::test]
    async fn media_events_round_trip_kind_and_reference() {
        let store = memory_store().await;
        let event = ChatEvent::new("System", EventKind::System, "file: cat.png", "/uploads/abc.png");
        store.append("pics", &event).await.unwrap();

        let history = store.fetch_history("pics").await.unwrap();
        assert_eq!(history[0].kind, EventKind::System);
        assert_eq!(history[0].media_url, "/uploads/abc.png");
    }
}

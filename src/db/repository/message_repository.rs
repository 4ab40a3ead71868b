//! Message repository (spec §4.6 step 3): upsert keyed by external id.

use sqlx::SqlitePool;

use crate::db::models::Message;

pub struct MessageRepository;

impl MessageRepository {
    /// Inserts the message, or is a silent no-op if `id` already exists
    /// (spec §3: messages are deduplicated by external identifier).
    pub async fn upsert(
        pool: &SqlitePool,
        id: &str,
        chat_id: &str,
        sender: &str,
        content: &str,
        timestamp: i64,
        ingested_at: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO messages (id, chat_id, sender, content, timestamp, ingested_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(id)
        .bind(chat_id)
        .bind(sender)
        .bind(content)
        .bind(timestamp)
        .bind(ingested_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn exists(pool: &SqlitePool, id: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM messages WHERE id = ?1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    pub async fn recent_in_chat(
        pool: &SqlitePool,
        chat_id: &str,
        limit: i64,
    ) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            "SELECT id, chat_id, sender, content, timestamp, ingested_at FROM messages \
             WHERE chat_id = ?1 ORDER BY timestamp DESC LIMIT ?2",
        )
        .bind(chat_id)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    pub async fn export_all(pool: &SqlitePool) -> Result<Vec<Message>, sqlx::Error> {
        sqlx::query_as::<_, Message>(
            "SELECT id, chat_id, sender, content, timestamp, ingested_at FROM messages ORDER BY timestamp ASC",
        )
        .fetch_all(pool)
        .await
    }

    pub async fn count(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM messages")
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}

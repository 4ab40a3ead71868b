//! Trigger repository (spec §3, §4.8): triggers are immutable once fired.

use sqlx::SqlitePool;

use crate::db::models::Trigger;

pub struct TriggerRepository;

const TRIGGER_COLUMNS: &str = "id, event_id, trigger_type, trigger_value, is_fired, fire_count";

impl TriggerRepository {
    pub async fn max_id(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        let (max,): (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM triggers")
            .fetch_one(pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    pub async fn insert(
        pool: &SqlitePool,
        id: i64,
        event_id: i64,
        trigger_type: &str,
        trigger_value: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO triggers (id, event_id, trigger_type, trigger_value, is_fired, fire_count) \
             VALUES (?1, ?2, ?3, ?4, 0, 0)",
        )
        .bind(id)
        .bind(event_id)
        .bind(trigger_type)
        .bind(trigger_value)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Unfired triggers of the given kinds whose `trigger_value` (an
    /// ISO-8601 timestamp) is due within `lookahead_sec` (spec §4.8, scan
    /// re-fetches each period so a missed tick only delays firing).
    pub async fn list_unfired_due(
        pool: &SqlitePool,
        kinds: &[&str],
        due_before: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Trigger>, sqlx::Error> {
        let placeholders: Vec<String> = (0..kinds.len()).map(|i| format!("?{}", i + 2)).collect();
        let sql = format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers WHERE is_fired = 0 AND trigger_type IN ({}) \
             AND trigger_value <= ?1 ORDER BY trigger_value ASC",
            placeholders.join(",")
        );
        let mut q = sqlx::query_as::<_, Trigger>(&sql).bind(due_before.to_rfc3339());
        for kind in kinds {
            q = q.bind(*kind);
        }
        q.fetch_all(pool).await
    }

    /// Atomically claims and marks a trigger fired: only the first caller to
    /// observe `is_fired = 0` wins, preventing the same trigger firing twice
    /// under concurrent scheduler ticks (spec §5).
    pub async fn mark_fired(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE triggers SET is_fired = 1, fire_count = fire_count + 1 \
             WHERE id = ?1 AND is_fired = 0",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn for_event(pool: &SqlitePool, event_id: i64) -> Result<Vec<Trigger>, sqlx::Error> {
        sqlx::query_as::<_, Trigger>(&format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers WHERE event_id = ?1"
        ))
        .bind(event_id)
        .fetch_all(pool)
        .await
    }

    pub async fn export_all(pool: &SqlitePool) -> Result<Vec<Trigger>, sqlx::Error> {
        sqlx::query_as::<_, Trigger>(&format!("SELECT {TRIGGER_COLUMNS} FROM triggers ORDER BY id ASC"))
            .fetch_all(pool)
            .await
    }
}

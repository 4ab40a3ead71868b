//! Context Dismissal repository (spec §3): suppresses a context reminder for
//! 30 minutes per (event, url-pattern) pair.

use sqlx::SqlitePool;

use crate::db::models::ContextDismissal;

pub struct ContextDismissalRepository;

impl ContextDismissalRepository {
    pub async fn upsert(
        pool: &SqlitePool,
        event_id: i64,
        url_pattern: &str,
        dismissed_until: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO context_dismissals (event_id, url_pattern, dismissed_until) VALUES (?1, ?2, ?3) \
             ON CONFLICT(event_id, url_pattern) DO UPDATE SET dismissed_until = excluded.dismissed_until",
        )
        .bind(event_id)
        .bind(url_pattern)
        .bind(dismissed_until)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn is_dismissed(
        pool: &SqlitePool,
        event_id: i64,
        url_pattern: &str,
        now: i64,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT dismissed_until FROM context_dismissals \
             WHERE event_id = ?1 AND url_pattern = ?2 AND dismissed_until > ?3",
        )
        .bind(event_id)
        .bind(url_pattern)
        .bind(now)
        .fetch_optional(pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn export_all(pool: &SqlitePool) -> Result<Vec<ContextDismissal>, sqlx::Error> {
        sqlx::query_as::<_, ContextDismissal>(
            "SELECT event_id, url_pattern, dismissed_until FROM context_dismissals",
        )
        .fetch_all(pool)
        .await
    }
}

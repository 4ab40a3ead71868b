//! Event repository (spec §3, §4.5): raw SQL against the `events` table and
//! its FTS5 shadow `events_fts` (kept in sync by triggers in
//! `migrations/0001_init.sql`, not by this repository).

use sqlx::SqlitePool;

use crate::db::models::Event;

pub struct EventRepository;

const EVENT_COLUMNS: &str = "id, message_id, event_type, title, description, location, keywords, \
     participants, event_time, reminder_time, embedding, context_url, status, dismiss_count, \
     sender_name, confidence, created_at";

/// Sparse patch for `EventRepository::update_fields`. Each `Some` field is
/// written; `None` fields are left untouched. `event_time: Some(None)` clears
/// the scheduled time rather than leaving it alone.
#[derive(Debug, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub keywords: Option<String>,
    pub event_time: Option<Option<i64>>,
}

impl EventRepository {
    pub async fn max_id(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
        let (max,): (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM events")
            .fetch_one(pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert(pool: &SqlitePool, event: &Event) -> Result<(), sqlx::Error> {
        sqlx::query(&format!(
            "INSERT INTO events ({EVENT_COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17)"
        ))
        .bind(event.id)
        .bind(&event.message_id)
        .bind(&event.event_type)
        .bind(&event.title)
        .bind(&event.description)
        .bind(&event.location)
        .bind(&event.keywords)
        .bind(&event.participants)
        .bind(event.event_time)
        .bind(event.reminder_time)
        .bind(&event.embedding)
        .bind(&event.context_url)
        .bind(&event.status)
        .bind(event.dismiss_count)
        .bind(&event.sender_name)
        .bind(event.confidence)
        .bind(event.created_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn get(pool: &SqlitePool, id: i64) -> Result<Option<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"))
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn set_status(pool: &SqlitePool, id: i64, status: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE events SET status = ?1 WHERE id = ?2")
            .bind(status)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_reminder_time(
        pool: &SqlitePool,
        id: i64,
        reminder_time: Option<i64>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE events SET reminder_time = ?1 WHERE id = ?2")
            .bind(reminder_time)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn snooze(pool: &SqlitePool, id: i64, reminder_time: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE events SET status = 'snoozed', reminder_time = ?1 WHERE id = ?2")
            .bind(reminder_time)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn increment_dismiss_count(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE events SET dismiss_count = dismiss_count + 1 WHERE id = ?1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_context_url(pool: &SqlitePool, id: i64, context_url: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE events SET context_url = ?1 WHERE id = ?2")
            .bind(context_url)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_embedding(pool: &SqlitePool, id: i64, embedding: &[u8]) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE events SET embedding = ?1 WHERE id = ?2")
            .bind(embedding)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Partial update for `PATCH /api/events/:id`: only the descriptive fields
    /// are editable this way (lifecycle fields go through the dedicated
    /// action endpoints instead).
    pub async fn update_fields(pool: &SqlitePool, id: i64, patch: &EventPatch) -> Result<bool, sqlx::Error> {
        let mut set_clauses = Vec::new();
        if patch.title.is_some() {
            set_clauses.push("title = ?");
        }
        if patch.description.is_some() {
            set_clauses.push("description = ?");
        }
        if patch.location.is_some() {
            set_clauses.push("location = ?");
        }
        if patch.keywords.is_some() {
            set_clauses.push("keywords = ?");
        }
        if patch.event_time.is_some() {
            set_clauses.push("event_time = ?");
        }
        if set_clauses.is_empty() {
            return Ok(true);
        }

        let placeholders: Vec<String> = set_clauses
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{} ?{}", col, i + 1))
            .collect();
        let sql = format!(
            "UPDATE events SET {} WHERE id = ?{}",
            placeholders.join(", "),
            set_clauses.len() + 1
        );

        let mut query = sqlx::query(&sql);
        if let Some(ref v) = patch.title {
            query = query.bind(v);
        }
        if let Some(ref v) = patch.description {
            query = query.bind(v);
        }
        if let Some(ref v) = patch.location {
            query = query.bind(v);
        }
        if let Some(ref v) = patch.keywords {
            query = query.bind(v);
        }
        if let Some(v) = patch.event_time {
            query = query.bind(v);
        }
        query = query.bind(id);

        let result = query.execute(pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM events WHERE id = ?1").bind(id).execute(pool).await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn list_by_status(
        pool: &SqlitePool,
        status: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE status = ?1 ORDER BY created_at DESC LIMIT ?2 OFFSET ?3"
        ))
        .bind(status)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn list_all(pool: &SqlitePool, limit: i64, offset: i64) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at DESC LIMIT ?1 OFFSET ?2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await
    }

    pub async fn list_for_day(pool: &SqlitePool, day_start: i64, day_end: i64) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE event_time >= ?1 AND event_time < ?2 ORDER BY event_time ASC"
        ))
        .bind(day_start)
        .bind(day_end)
        .fetch_all(pool)
        .await
    }

    pub async fn export_all(pool: &SqlitePool) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY id ASC"))
            .fetch_all(pool)
            .await
    }

    /// Active events created within the hot window, candidates for duplicate
    /// detection and for the BM25 keyword prefilter (spec §3, §4.5).
    pub async fn list_active_since(pool: &SqlitePool, since: i64) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE status IN ('pending','scheduled','discovered') AND created_at >= ?1 \
             ORDER BY created_at DESC"
        ))
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Non-terminal events created since `since`, for duplicate detection (spec
    /// §3: the duplicate-detection active set is broader than the hybrid-search
    /// one — it also includes `snoozed` and `reminded`).
    pub async fn list_not_terminal_since(pool: &SqlitePool, since: i64) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE status NOT IN ('completed','expired','ignored') AND created_at >= ?1 \
             ORDER BY created_at DESC"
        ))
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Events of `status` whose `reminder_time` has passed, for the
    /// due-reminders / snooze-expiry scheduler scans (spec §4.8).
    pub async fn list_due_by_status(
        pool: &SqlitePool,
        status: &str,
        due_before: i64,
    ) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE status = ?1 AND reminder_time IS NOT NULL AND reminder_time <= ?2 \
             ORDER BY reminder_time ASC"
        ))
        .bind(status)
        .bind(due_before)
        .fetch_all(pool)
        .await
    }

    /// Active events with a non-null embedding, for the k-NN branch of hybrid search.
    pub async fn list_active_with_embedding_since(pool: &SqlitePool, since: i64) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE status IN ('pending','scheduled','discovered') AND created_at >= ?1 \
             AND embedding IS NOT NULL"
        ))
        .bind(since)
        .fetch_all(pool)
        .await
    }

    pub async fn list_missing_embedding(pool: &SqlitePool, limit: i64) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE embedding IS NULL ORDER BY created_at ASC LIMIT ?1"
        ))
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// BM25 ranked ids via the FTS5 shadow table (lower rank is more relevant
    /// in SQLite FTS5's `bm25()` convention).
    pub async fn fts_search(pool: &SqlitePool, query: &str, limit: i64) -> Result<Vec<(i64, f64)>, sqlx::Error> {
        let escaped = escape_fts_query(query);
        if escaped.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, (i64, f64)>(
            "SELECT e.id, bm25(events_fts, 3.0, 2.0, 1.0, 1.0) AS rank \
             FROM events_fts JOIN events e ON e.id = events_fts.rowid \
             WHERE events_fts MATCH ?1 AND e.status IN ('pending','scheduled','discovered') \
             ORDER BY rank LIMIT ?2",
        )
        .bind(escaped)
        .bind(limit)
        .fetch_all(pool)
        .await
    }

    /// Candidate events for action-detection/extraction (spec §4.6 step 5):
    /// keyword-matched against the message, capped at 20.
    pub async fn candidates_for_message(pool: &SqlitePool, message: &str, since: i64) -> Result<Vec<Event>, sqlx::Error> {
        let escaped = escape_fts_query(message);
        if escaped.is_empty() {
            return Self::list_active_since(pool, since).await.map(|mut v| {
                v.truncate(20);
                v
            });
        }
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events e \
             JOIN (SELECT rowid FROM events_fts WHERE events_fts MATCH ?1 LIMIT 20) m ON m.rowid = e.id \
             WHERE e.status IN ('pending','scheduled','discovered') AND e.created_at >= ?2"
        ))
        .bind(escaped)
        .bind(since)
        .fetch_all(pool)
        .await
    }

    /// Conflict check (spec §4.5): events within +/-60 minutes of `target_time`,
    /// excluding completed/expired.
    pub async fn conflicts_near(pool: &SqlitePool, target_time: i64, exclude_id: i64) -> Result<Vec<Event>, sqlx::Error> {
        let window = 60 * 60;
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE event_time IS NOT NULL AND ABS(event_time - ?1) <= ?2 \
             AND status NOT IN ('completed','expired') AND id != ?3"
        ))
        .bind(target_time)
        .bind(window)
        .bind(exclude_id)
        .fetch_all(pool)
        .await
    }

    pub async fn count_by_status(pool: &SqlitePool) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as::<_, (String, i64)>("SELECT status, COUNT(*) FROM events GROUP BY status")
            .fetch_all(pool)
            .await
    }

    /// Context URL match (spec §4.5): scheduled events whose `context_url` (or,
    /// if empty, `location`) is a case-folded substring of `url`.
    pub async fn context_url_matches(pool: &SqlitePool, url_lower: &str) -> Result<Vec<Event>, sqlx::Error> {
        sqlx::query_as::<_, Event>(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE status IN ('scheduled','discovered','pending') AND ( \
                (context_url IS NOT NULL AND context_url != '' AND instr(?1, context_url) > 0) \
                OR ((context_url IS NULL OR context_url = '') AND location IS NOT NULL AND location != '' \
                    AND instr(?1, lower(location)) > 0) \
             )"
        ))
        .bind(url_lower)
        .fetch_all(pool)
        .await
    }
}

/// Escapes a free-text string for safe use as an FTS5 MATCH query: strips
/// characters with special meaning and quotes each token.
fn escape_fts_query(input: &str) -> String {
    input
        .split_whitespace()
        .map(|tok| {
            let cleaned: String = tok.chars().filter(|c| c.is_alphanumeric()).collect();
            cleaned
        })
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{t}\""))
        .collect::<Vec<_>>()
        .join(" OR ")
}

//! Document Store Adapter (spec §4.5): six logical collections backed by
//! SQLite, monotone process-local id counters, write-safety via the Error
//! Envelope's `safe_call` with dead-lettering, and hybrid keyword+vector
//! search.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::db::models::event::{cosine_similarity, decode_embedding, encode_embedding};
use crate::db::{
    ContactRepository, ContextDismissalRepository, Event, EventRepository, MessageRepository,
    PushSubscriptionRepository, Trigger, TriggerRepository,
};
use crate::envelope::{safe_call, DeadLetterLog};

/// Sentinel returned by ID-returning writes on failure (spec §4.5).
pub const WRITE_FAILED_ID: i64 = -1;

pub struct DocumentStore {
    pool: SqlitePool,
    dead_letter: Arc<DeadLetterLog>,
    debug_errors: bool,
    next_event_id: AtomicI64,
    next_trigger_id: AtomicI64,
}

impl DocumentStore {
    /// Seeds the id counters from `MAX(id)` on each collection (spec §4.5,
    /// invariant in spec §8.4: every returned id is strictly greater than any
    /// previously returned one within the process lifetime).
    pub async fn new(
        pool: SqlitePool,
        dead_letter: Arc<DeadLetterLog>,
        debug_errors: bool,
    ) -> Result<Self, sqlx::Error> {
        let max_event = EventRepository::max_id(&pool).await?;
        let max_trigger = TriggerRepository::max_id(&pool).await?;
        Ok(Self {
            pool,
            dead_letter,
            debug_errors,
            next_event_id: AtomicI64::new(max_event + 1),
            next_trigger_id: AtomicI64::new(max_trigger + 1),
        })
    }

    /// Reseeds the counters after a restore-from-backup (spec §3 invariant).
    pub async fn reseed_counters(&self) -> Result<(), sqlx::Error> {
        let max_event = EventRepository::max_id(&self.pool).await?;
        let max_trigger = TriggerRepository::max_id(&self.pool).await?;
        self.next_event_id.store(max_event + 1, Ordering::SeqCst);
        self.next_trigger_id.store(max_trigger + 1, Ordering::SeqCst);
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn next_event_id(&self) -> i64 {
        self.next_event_id.fetch_add(1, Ordering::SeqCst)
    }

    fn next_trigger_id(&self) -> i64 {
        self.next_trigger_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Runs a store write through the envelope's catch-and-fallback, logging
    /// any failure to the dead-letter queue with `payload` as context (spec
    /// §4.5 write-safety). The inner success value is collapsed to `true`;
    /// callers that need the underlying "row existed" signal instead of a
    /// bare success/failure flag should not route through this helper.
    async fn write_safe<F, Fut, T>(&self, operation: &str, payload: serde_json::Value, fut: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        safe_call(
            operation,
            false,
            Some((self.dead_letter.as_ref(), &payload)),
            self.debug_errors,
            || async { fut().await.map(|_| true) },
        )
        .await
        .unwrap_or(false)
    }

    /// Inserts a message + upserts the originating contact (spec §4.6 step 3).
    pub async fn save_message(
        &self,
        id: &str,
        chat_id: &str,
        sender: &str,
        sender_name: Option<&str>,
        content: &str,
        timestamp: i64,
    ) -> bool {
        let now = Utc::now().timestamp();
        let payload = serde_json::json!({"id": id, "chat_id": chat_id, "content": content});
        let ok = self
            .write_safe("store.message.upsert", payload, || {
                MessageRepository::upsert(&self.pool, id, chat_id, sender, content, timestamp, now)
            })
            .await;
        if ok {
            let _ = ContactRepository::upsert(&self.pool, sender, sender_name, now).await;
        }
        ok
    }

    pub async fn message_exists(&self, id: &str) -> bool {
        MessageRepository::exists(&self.pool, id).await.unwrap_or(false)
    }

    pub async fn recent_messages(&self, chat_id: &str, limit: i64) -> Vec<crate::db::Message> {
        MessageRepository::recent_in_chat(&self.pool, chat_id, limit)
            .await
            .unwrap_or_default()
    }

    /// Looked up by the form-check route to compare a remembered display name
    /// against a freshly-entered form field.
    pub async fn get_contact(&self, jid: &str) -> Option<crate::db::Contact> {
        ContactRepository::get(&self.pool, jid).await.ok().flatten()
    }

    /// Inserts an event with an adapter-assigned id. Returns `WRITE_FAILED_ID`
    /// on failure (spec §4.5 write-safety).
    pub async fn insert_event(&self, mut event: Event) -> i64 {
        let id = self.next_event_id();
        event.id = id;
        let payload = event.to_backup_json();
        let ok = self
            .write_safe("store.event.insert", payload, || {
                EventRepository::insert(&self.pool, &event)
            })
            .await;
        if ok {
            id
        } else {
            WRITE_FAILED_ID
        }
    }

    pub async fn get_event(&self, id: i64) -> Option<Event> {
        EventRepository::get(&self.pool, id).await.ok().flatten()
    }

    pub async fn set_event_status(&self, id: i64, status: &str) -> bool {
        self.write_safe(
            "store.event.set_status",
            serde_json::json!({"id": id, "status": status}),
            || EventRepository::set_status(&self.pool, id, status),
        )
        .await
    }

    pub async fn snooze_event(&self, id: i64, reminder_time: i64) -> bool {
        self.write_safe(
            "store.event.snooze",
            serde_json::json!({"id": id, "reminder_time": reminder_time}),
            || EventRepository::snooze(&self.pool, id, reminder_time),
        )
        .await
    }

    pub async fn set_reminder_time(&self, id: i64, reminder_time: Option<i64>) -> bool {
        self.write_safe(
            "store.event.set_reminder_time",
            serde_json::json!({"id": id, "reminder_time": reminder_time}),
            || EventRepository::set_reminder_time(&self.pool, id, reminder_time),
        )
        .await
    }

    pub async fn increment_dismiss_count(&self, id: i64) -> bool {
        self.write_safe(
            "store.event.dismiss",
            serde_json::json!({"id": id}),
            || EventRepository::increment_dismiss_count(&self.pool, id),
        )
        .await
    }

    pub async fn set_context_url(&self, id: i64, context_url: &str) -> bool {
        self.write_safe(
            "store.event.set_context_url",
            serde_json::json!({"id": id, "context_url": context_url}),
            || EventRepository::set_context_url(&self.pool, id, context_url),
        )
        .await
    }

    pub async fn update_event(&self, id: i64, patch: &crate::db::EventPatch) -> bool {
        self.write_safe(
            "store.event.update_fields",
            serde_json::json!({"id": id}),
            || EventRepository::update_fields(&self.pool, id, patch),
        )
        .await
    }

    pub async fn set_embedding(&self, id: i64, embedding: &[f32]) -> bool {
        let blob = encode_embedding(embedding);
        self.write_safe(
            "store.event.set_embedding",
            serde_json::json!({"id": id}),
            || async { EventRepository::set_embedding(&self.pool, id, &blob).await },
        )
        .await
    }

    pub async fn delete_event(&self, id: i64) -> bool {
        self.write_safe("store.event.delete", serde_json::json!({"id": id}), || {
            EventRepository::delete(&self.pool, id)
        })
        .await
    }

    pub async fn list_by_status(&self, status: &str, limit: i64, offset: i64) -> Vec<Event> {
        EventRepository::list_by_status(&self.pool, status, limit, offset)
            .await
            .unwrap_or_default()
    }

    pub async fn list_all(&self, limit: i64, offset: i64) -> Vec<Event> {
        EventRepository::list_all(&self.pool, limit, offset).await.unwrap_or_default()
    }

    pub async fn list_for_day(&self, day_start: i64, day_end: i64) -> Vec<Event> {
        EventRepository::list_for_day(&self.pool, day_start, day_end)
            .await
            .unwrap_or_default()
    }

    pub async fn list_missing_embedding(&self, limit: i64) -> Vec<Event> {
        EventRepository::list_missing_embedding(&self.pool, limit)
            .await
            .unwrap_or_default()
    }

    /// Events of `status` whose `reminder_time` has passed (spec §4.8
    /// due-reminders / snooze-expiry scans).
    pub async fn due_by_status(&self, status: &str, due_before: i64) -> Vec<Event> {
        EventRepository::list_due_by_status(&self.pool, status, due_before)
            .await
            .unwrap_or_default()
    }

    /// Active events created since `since`, for the BM25 keyword prefilter (spec §4.5).
    pub async fn active_events_since(&self, since: i64) -> Vec<Event> {
        EventRepository::list_active_since(&self.pool, since).await.unwrap_or_default()
    }

    /// Non-terminal events created since `since`, for duplicate detection (spec §3).
    pub async fn duplicate_candidates_since(&self, since: i64) -> Vec<Event> {
        EventRepository::list_not_terminal_since(&self.pool, since).await.unwrap_or_default()
    }

    pub async fn candidates_for_message(&self, message: &str, hot_window_days: i64) -> Vec<Event> {
        let since = (Utc::now() - chrono::Duration::days(hot_window_days)).timestamp();
        let mut candidates = EventRepository::candidates_for_message(&self.pool, message, since)
            .await
            .unwrap_or_default();
        candidates.truncate(20);
        candidates
    }

    /// Conflict check (spec §4.5): events within +/-60 min of `target_time`.
    pub async fn conflicts_near(&self, target_time: i64, exclude_id: i64) -> Vec<Event> {
        EventRepository::conflicts_near(&self.pool, target_time, exclude_id)
            .await
            .unwrap_or_default()
    }

    pub async fn context_url_matches(&self, url_lower: &str) -> Vec<Event> {
        EventRepository::context_url_matches(&self.pool, url_lower)
            .await
            .unwrap_or_default()
    }

    pub async fn count_by_status(&self) -> Vec<(String, i64)> {
        EventRepository::count_by_status(&self.pool).await.unwrap_or_default()
    }

    /// Hybrid search (spec §4.5): BM25 branch always runs; the k-NN branch
    /// runs only when `query_vector` is supplied, scored by in-process cosine
    /// similarity (no external vector engine is in scope). Results are merged
    /// by reciprocal-rank fusion and truncated to `limit`.
    pub async fn hybrid_search_events(
        &self,
        query: &str,
        query_vector: Option<&[f32]>,
        hot_window_days: i64,
        limit: i64,
    ) -> Vec<Event> {
        let since = (Utc::now() - chrono::Duration::days(hot_window_days)).timestamp();

        let bm25_hits = EventRepository::fts_search(&self.pool, query, limit.max(20))
            .await
            .unwrap_or_default();
        let mut fused: std::collections::HashMap<i64, f64> = std::collections::HashMap::new();
        for (rank, (id, _score)) in bm25_hits.iter().enumerate() {
            fused.insert(*id, rrf_score(rank));
        }

        if let Some(vector) = query_vector {
            let pool_candidates = EventRepository::list_active_with_embedding_since(&self.pool, since)
                .await
                .unwrap_or_default();
            let mut scored: Vec<(i64, f32)> = pool_candidates
                .iter()
                .filter_map(|e| e.embedding.as_deref().map(|blob| (e.id, cosine_similarity(vector, &decode_embedding(blob)))))
                .collect();
            scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
            scored.truncate(50);
            for (rank, (id, _sim)) in scored.iter().enumerate() {
                *fused.entry(*id).or_insert(0.0) += rrf_score(rank);
            }
        }

        let mut ranked: Vec<(i64, f64)> = fused.into_iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit.max(0) as usize);

        let mut events = Vec::with_capacity(ranked.len());
        for (id, _) in ranked {
            if let Some(event) = self.get_event(id).await {
                if event.status_enum().is_active_searchable() && event.created_at >= since {
                    events.push(event);
                }
            }
        }
        events
    }

    /// Inserts a trigger with an adapter-assigned id.
    pub async fn insert_trigger(&self, event_id: i64, trigger_type: &str, trigger_value: &str) -> i64 {
        let id = self.next_trigger_id();
        let ok = self
            .write_safe(
                "store.trigger.insert",
                serde_json::json!({"id": id, "event_id": event_id, "trigger_type": trigger_type}),
                || TriggerRepository::insert(&self.pool, id, event_id, trigger_type, trigger_value),
            )
            .await;
        if ok {
            id
        } else {
            WRITE_FAILED_ID
        }
    }

    pub async fn unfired_triggers_due(&self, kinds: &[&str], due_before: chrono::DateTime<Utc>) -> Vec<Trigger> {
        TriggerRepository::list_unfired_due(&self.pool, kinds, due_before)
            .await
            .unwrap_or_default()
    }

    pub async fn mark_trigger_fired(&self, id: i64) -> bool {
        TriggerRepository::mark_fired(&self.pool, id).await.unwrap_or(false)
    }

    pub async fn triggers_for_event(&self, event_id: i64) -> Vec<Trigger> {
        TriggerRepository::for_event(&self.pool, event_id).await.unwrap_or_default()
    }

    pub async fn context_dismissal_active(&self, event_id: i64, url_pattern: &str) -> bool {
        ContextDismissalRepository::is_dismissed(&self.pool, event_id, url_pattern, Utc::now().timestamp())
            .await
            .unwrap_or(false)
    }

    pub async fn dismiss_context(&self, event_id: i64, url_pattern: &str, dismissed_until: i64) -> bool {
        self.write_safe(
            "store.context_dismissal.upsert",
            serde_json::json!({"event_id": event_id, "url_pattern": url_pattern}),
            || ContextDismissalRepository::upsert(&self.pool, event_id, url_pattern, dismissed_until),
        )
        .await
    }

    pub async fn save_push_subscription(&self, id: &str, token: &str) -> bool {
        self.write_safe(
            "store.push_subscription.insert",
            serde_json::json!({"id": id}),
            || PushSubscriptionRepository::insert(&self.pool, id, token, Utc::now().timestamp()),
        )
        .await
    }

    pub async fn stats(&self) -> serde_json::Value {
        let counts = self.count_by_status().await;
        let map: serde_json::Map<String, serde_json::Value> = counts
            .into_iter()
            .map(|(status, count)| (status, serde_json::Value::from(count)))
            .collect();
        serde_json::Value::Object(map)
    }
}

fn rrf_score(rank: usize) -> f64 {
    1.0 / (60.0 + rank as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_store() -> DocumentStore {
        let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        let dead_letter = Arc::new(DeadLetterLog::new(std::env::temp_dir().join(format!(
            "argus-store-test-{}.jsonl",
            uuid::Uuid::new_v4()
        ))));
        DocumentStore::new(pool, dead_letter, false).await.unwrap()
    }

    #[tokio::test]
    async fn event_ids_are_strictly_monotone() {
        let store = test_store().await;
        let event = Event {
            id: 0,
            message_id: None,
            event_type: "other".to_string(),
            title: "Test".to_string(),
            description: None,
            location: None,
            keywords: String::new(),
            participants: None,
            event_time: None,
            reminder_time: None,
            embedding: None,
            context_url: None,
            status: "discovered".to_string(),
            dismiss_count: 0,
            sender_name: None,
            confidence: 0.5,
            created_at: Utc::now().timestamp(),
        };
        let id1 = store.insert_event(event.clone()).await;
        let id2 = store.insert_event(event).await;
        assert!(id2 > id1);
    }

    #[tokio::test]
    async fn reseed_counters_after_restore_prevents_collision() {
        let store = test_store().await;
        let event = Event {
            id: 0,
            message_id: None,
            event_type: "other".to_string(),
            title: "Restored".to_string(),
            description: None,
            location: None,
            keywords: String::new(),
            participants: None,
            event_time: None,
            reminder_time: None,
            embedding: None,
            context_url: None,
            status: "discovered".to_string(),
            dismiss_count: 0,
            sender_name: None,
            confidence: 0.5,
            created_at: Utc::now().timestamp(),
        };
        let id1 = store.insert_event(event.clone()).await;
        // Simulate a manually-restored row with a much higher id.
        EventRepository::insert(store.pool(), &Event { id: id1 + 100, ..event }).await.unwrap();
        store.reseed_counters().await.unwrap();

        let next = store.next_event_id();
        assert!(next > id1 + 100);
    }
}
